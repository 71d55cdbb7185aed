//! # Consistent Hash Ring
//!
//! A pure function from a key and a member set to an owning address. `Ring`
//! carries no behavior beyond construction and lookup: membership churn,
//! locking, and publication all live one layer up in the Router/Membership
//! controller.
//!
//! The hash function must be stable across process restarts and agree
//! between independently-built Rings on different nodes, so it cannot use a
//! per-process random seed. `xxh3` fits: deterministic, fast, and seedless
//! by default.

use xxhash_rust::xxh3::xxh3_64;

/// An immutable placement of member addresses on a 64-bit ring.
///
/// Built once per membership change and swapped into place; never mutated
/// in place.
#[derive(Debug)]
pub struct Ring {
    /// Sorted `(position, address)` pairs, deduplicated by position.
    positions: Vec<(u64, String)>,
}

impl Ring {
    /// Builds a Ring by placing `virtual_nodes` positions per member.
    ///
    /// `members` may contain duplicates; the resulting Ring treats them as
    /// one address. An empty member set produces a Ring whose `get` always
    /// returns `None`.
    pub fn new(members: &[String], virtual_nodes: usize) -> Self {
        let mut positions: Vec<(u64, String)> =
            Vec::with_capacity(members.len() * virtual_nodes.max(1));
        for addr in members {
            for i in 0..virtual_nodes {
                let label = format!("{addr}#{i}");
                positions.push((hash_bytes(label.as_bytes()), addr.clone()));
            }
        }
        positions.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        positions.dedup_by(|a, b| a.0 == b.0);
        Ring { positions }
    }

    /// Returns the owning address for `key`, or `None` if the Ring has no
    /// members.
    ///
    /// Finds the smallest position `>=` the key's hash, wrapping to
    /// position 0 when the hash falls past the last entry.
    pub fn get(&self, key: &[u8]) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }
        let hash = hash_bytes(key);
        let idx = match self.positions.binary_search_by(|(pos, _)| pos.cmp(&hash)) {
            Ok(idx) => idx,
            Err(idx) => idx % self.positions.len(),
        };
        Some(self.positions[idx].1.as_str())
    }

    /// Number of distinct virtual-node positions on the Ring.
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn hash_bytes(data: &[u8]) -> u64 {
    xxh3_64(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(addrs: &[&str]) -> Vec<String> {
        addrs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_ring_has_no_owner() {
        let ring = Ring::new(&[], 128);
        assert_eq!(ring.get(b"foo"), None);
    }

    #[test]
    fn determinism_across_independent_builds() {
        let m = members(&["a:1", "b:2", "c:3"]);
        let ring_a = Ring::new(&m, 128);
        let ring_b = Ring::new(&m, 128);

        for key in [b"foo".as_slice(), b"bar", b"baz", b"quux", b"k"] {
            assert_eq!(ring_a.get(key), ring_b.get(key));
        }
    }

    #[test]
    fn routing_locality_every_key_maps_into_membership() {
        let m = members(&["a:1", "b:2"]);
        let ring = Ring::new(&m, 128);
        for i in 0..1000 {
            let key = format!("key-{i}");
            let owner = ring.get(key.as_bytes()).expect("non-empty ring has an owner");
            assert!(m.iter().any(|addr| addr == owner));
        }
    }

    #[test]
    fn single_member_owns_every_key() {
        let m = members(&["only:1"]);
        let ring = Ring::new(&m, 128);
        for i in 0..100 {
            let key = format!("k{i}");
            assert_eq!(ring.get(key.as_bytes()), Some("only:1"));
        }
    }

    #[test]
    fn adding_a_member_moves_only_a_minority_of_keys() {
        let before = Ring::new(&members(&["a:1", "b:2", "c:3"]), 128);
        let after = Ring::new(&members(&["a:1", "b:2", "c:3", "d:4"]), 128);

        let total = 2000;
        let mut moved = 0;
        for i in 0..total {
            let key = format!("key-{i}");
            if before.get(key.as_bytes()) != after.get(key.as_bytes()) {
                moved += 1;
            }
        }
        // With 4 members after the add, an ideal hash would move ~1/4 of keys.
        // Generous bound to avoid flakiness while still catching a naive
        // rebuild that reshuffles everything.
        assert!(
            (moved as f64) < (total as f64) * 0.5,
            "moved {moved} of {total} keys, expected well under half"
        );
    }

    #[test]
    fn duplicate_members_are_deduplicated() {
        let ring = Ring::new(&members(&["a:1", "a:1", "b:2"]), 64);
        // Two distinct addresses times 64 virtual nodes, minus any hash
        // collisions across them (negligible at this volume).
        assert!(ring.position_count() <= 128);
        assert!(ring.position_count() > 64);
    }

    #[test]
    fn virtual_nodes_zero_yields_empty_ring() {
        let ring = Ring::new(&members(&["a:1"]), 0);
        assert!(ring.is_empty());
    }
}
