//! # Membership Controller
//!
//! Owns the set of known peer addresses (including self) and the Ring built
//! from it. Mutations go through an exclusive lock; reads of the published
//! Ring never take that lock, so a Router forwarding a request cannot block
//! on a concurrent membership edit.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use hkv_ring::Ring;

pub struct Membership {
    self_addr: String,
    virtual_nodes: usize,
    members: Mutex<HashSet<String>>,
    ring: ArcSwap<Ring>,
}

impl Membership {
    pub fn new(self_addr: impl Into<String>, initial_peers: &[String], virtual_nodes: usize) -> Self {
        let self_addr = self_addr.into();
        let mut members = HashSet::new();
        members.insert(self_addr.clone());
        members.extend(initial_peers.iter().cloned());

        let ring = build_ring(&members, virtual_nodes);
        Membership {
            self_addr,
            virtual_nodes,
            members: Mutex::new(members),
            ring: ArcSwap::from_pointee(ring),
        }
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Returns the currently published Ring. Lock-free relative to
    /// `add_server`/`drop_server`.
    pub fn ring(&self) -> Arc<Ring> {
        self.ring.load_full()
    }

    /// Inserts `addr` and republishes the Ring. Idempotent.
    pub fn add_server(&self, addr: String) {
        let mut members = self.members.lock();
        members.insert(addr);
        self.rebuild(&members);
    }

    /// Removes `addr` and republishes the Ring. Idempotent. A self-drop is
    /// a no-op: a node never evicts itself from its own membership view.
    pub fn drop_server(&self, addr: &str) {
        if addr == self.self_addr {
            return;
        }
        let mut members = self.members.lock();
        if members.remove(addr) {
            self.rebuild(&members);
        }
    }

    pub fn members_snapshot(&self) -> Vec<String> {
        self.members.lock().iter().cloned().collect()
    }

    fn rebuild(&self, members: &HashSet<String>) {
        self.ring.store(Arc::new(build_ring(members, self.virtual_nodes)));
    }
}

fn build_ring(members: &HashSet<String>, virtual_nodes: usize) -> Ring {
    let list: Vec<String> = members.iter().cloned().collect();
    Ring::new(&list, virtual_nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_publishes_a_ring_covering_self_and_peers() {
        let membership = Membership::new("a:1", &["b:2".to_string()], 32);
        let ring = membership.ring();
        // Every key must resolve to one of the two known members.
        for i in 0..50 {
            let key = format!("k{i}");
            let owner = ring.get(key.as_bytes()).unwrap();
            assert!(owner == "a:1" || owner == "b:2");
        }
    }

    #[test]
    fn add_server_expands_membership() {
        let membership = Membership::new("a:1", &[], 32);
        membership.add_server("b:2".to_string());
        assert_eq!(
            membership.members_snapshot().len(),
            2,
            "self and new peer should both be present"
        );
    }

    #[test]
    fn drop_server_shrinks_membership() {
        let membership = Membership::new("a:1", &["b:2".to_string()], 32);
        membership.drop_server("b:2");
        assert_eq!(membership.members_snapshot(), vec!["a:1".to_string()]);
    }

    #[test]
    fn self_drop_is_a_no_op() {
        let membership = Membership::new("a:1", &["b:2".to_string()], 32);
        membership.drop_server("a:1");
        let members = membership.members_snapshot();
        assert!(members.contains(&"a:1".to_string()));
    }

    #[test]
    fn drop_then_lookup_never_returns_dropped_peer() {
        let membership = Membership::new("a:1", &["b:2".to_string()], 128);
        membership.drop_server("b:2");
        let ring = membership.ring();
        for i in 0..200 {
            let key = format!("k{i}");
            assert_eq!(ring.get(key.as_bytes()), Some("a:1"));
        }
    }
}
