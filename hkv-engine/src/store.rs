//! # Bounded LRU Store
//!
//! The single-lock, byte-budgeted, expiration-aware key/value table that
//! backs one node. Every operation takes the same exclusive lock, including
//! reads, so the recency order stays a simple total order instead of a
//! per-shard approximation.
//!
//! ## Structure
//!
//! ```text
//! LruStore
//!   └── inner: Mutex<Inner>
//!         ├── map: HashMap<Arc<[u8]>, usize>
//!         ├── nodes: Vec<Option<Node>>
//!         ├── free: Vec<usize>
//!         └── head/tail: recency list indices
//!               └── Node { key, value, expiration_ns, size, prev, next }
//! ```
//!
//! `head` is the most recently used entry, `tail` the least recently used;
//! eviction always removes from the tail.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::Mutex;

use hkv_common::{varint, HkvError, HkvResult};

/// Fixed per-entry bookkeeping cost, added to `len(key) + len(value)` for
/// accounting and admission. Chosen to approximate the node/arena overhead
/// rather than `size_of::<Node>()`, so accounting doesn't drift across
/// platforms.
const PER_ENTRY_OVERHEAD: usize = 48;

/// Returns the current wall-clock time as epoch nanoseconds, matching the
/// `expiration_ns` convention used on the wire.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[derive(Debug)]
struct Node {
    key: Arc<[u8]>,
    value: Arc<[u8]>,
    expiration_ns: i64,
    size: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Node {
    fn is_live(&self, now: i64) -> bool {
        self.expiration_ns > now
    }
}

#[derive(Debug)]
struct Inner {
    map: HashMap<Arc<[u8]>, usize, RandomState>,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    used_bytes: usize,
}

impl Inner {
    fn new() -> Self {
        Inner {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            used_bytes: 0,
        }
    }

    fn lru_remove(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().expect("node exists");
            (node.prev, node.next)
        };

        match prev {
            Some(prev_idx) => self.nodes[prev_idx].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(next_idx) => self.nodes[next_idx].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }

        let node = self.nodes[idx].as_mut().unwrap();
        node.prev = None;
        node.next = None;
    }

    fn lru_push_front(&mut self, idx: usize) {
        let head = self.head;
        {
            let node = self.nodes[idx].as_mut().unwrap();
            node.prev = None;
            node.next = head;
        }
        match head {
            Some(head_idx) => self.nodes[head_idx].as_mut().unwrap().prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.lru_remove(idx);
        self.lru_push_front(idx);
    }

    fn insert_new(&mut self, key: Arc<[u8]>, value: Arc<[u8]>, expiration_ns: i64, size: usize) -> usize {
        let idx = self.free.pop().unwrap_or_else(|| {
            self.nodes.push(None);
            self.nodes.len() - 1
        });
        self.nodes[idx] = Some(Node {
            key: Arc::clone(&key),
            value,
            expiration_ns,
            size,
            prev: None,
            next: None,
        });
        self.lru_push_front(idx);
        self.map.insert(key, idx);
        self.used_bytes += size;
        idx
    }

    fn remove_idx(&mut self, idx: usize) {
        let node = self.nodes[idx].as_ref().expect("node exists");
        let key = Arc::clone(&node.key);
        let size = node.size;
        self.lru_remove(idx);
        self.nodes[idx] = None;
        self.map.remove(key.as_ref());
        self.free.push(idx);
        self.used_bytes -= size;
    }

    /// Removes `key` from the table if its entry has expired by `now`.
    /// Returns whether an entry existed (live or not) before this call.
    fn reap_if_expired(&mut self, key: &[u8], now: i64) -> Option<bool> {
        let &idx = self.map.get(key)?;
        let live = self.nodes[idx].as_ref().unwrap().is_live(now);
        if !live {
            self.remove_idx(idx);
        }
        Some(live)
    }

    fn sweep_expired(&mut self, now: i64) {
        let expired: Vec<usize> = self
            .map
            .values()
            .copied()
            .filter(|&idx| !self.nodes[idx].as_ref().unwrap().is_live(now))
            .collect();
        for idx in expired {
            self.remove_idx(idx);
        }
    }

    fn make_room(&mut self, needed: usize, max_bytes: usize, now: i64) {
        if self.used_bytes + needed <= max_bytes {
            return;
        }
        self.sweep_expired(now);
        while self.used_bytes + needed > max_bytes {
            match self.tail {
                Some(idx) => self.remove_idx(idx),
                None => break,
            }
        }
    }
}

fn entry_size(key_len: usize, value_len: usize) -> usize {
    PER_ENTRY_OVERHEAD + key_len + value_len
}

/// Public contract implemented by [`LruStore`].
///
/// Every operation is keyed by an opaque byte string; values are opaque
/// bytes. `expiration_ns` is an absolute epoch-nanosecond timestamp, not a
/// duration.
pub trait Store: Send + Sync {
    fn add(&self, key: &[u8], value: &[u8], expiration_ns: i64) -> HkvResult<()>;
    fn set(&self, key: &[u8], value: &[u8], expiration_ns: i64) -> HkvResult<()>;
    fn get(&self, key: &[u8]) -> HkvResult<(Arc<[u8]>, i64)>;
    fn delete(&self, key: &[u8]) -> HkvResult<()>;
    fn delete_all(&self);
    /// Returns the updated value and the entry's unchanged expiration.
    fn increment(&self, key: &[u8], delta: i64) -> HkvResult<(i64, i64)>;
    fn decrement(&self, key: &[u8], delta: i64) -> HkvResult<(i64, i64)>;
    fn touch(&self, key: &[u8], expiration_ns: i64) -> HkvResult<()>;
    fn replace(&self, key: &[u8], value: &[u8], expiration_ns: i64) -> HkvResult<()>;
    fn size_bytes(&self) -> usize;

    /// Removes every expired entry, returning the number removed. Intended
    /// for a periodic background sweep; lazy expiration on `get` makes this
    /// an optimization rather than a correctness requirement.
    fn purge_expired(&self) -> usize;
}

/// Single-lock bounded LRU implementation of [`Store`].
#[derive(Debug)]
pub struct LruStore {
    inner: Mutex<Inner>,
    max_bytes: usize,
}

impl LruStore {
    pub fn new(max_bytes: usize) -> Self {
        LruStore {
            inner: Mutex::new(Inner::new()),
            max_bytes,
        }
    }

    fn insert_or_replace(&self, key: &[u8], value: &[u8], expiration_ns: i64) -> HkvResult<()> {
        let new_size = entry_size(key.len(), value.len());
        if new_size > self.max_bytes {
            return Err(HkvError::TooLarge);
        }

        let now = now_ns();
        let mut inner = self.inner.lock();
        inner.reap_if_expired(key, now);

        if let Some(&idx) = inner.map.get(key) {
            let old_size = inner.nodes[idx].as_ref().unwrap().size;
            inner.used_bytes -= old_size;
            inner.make_room(new_size, self.max_bytes, now);
            let node = inner.nodes[idx].as_mut().unwrap();
            node.value = Arc::from(value);
            node.expiration_ns = expiration_ns;
            node.size = new_size;
            inner.used_bytes += new_size;
            inner.touch(idx);
        } else {
            inner.make_room(new_size, self.max_bytes, now);
            inner.insert_new(Arc::from(key), Arc::from(value), expiration_ns, new_size);
        }
        Ok(())
    }
}

impl Store for LruStore {
    fn add(&self, key: &[u8], value: &[u8], expiration_ns: i64) -> HkvResult<()> {
        let now = now_ns();
        {
            let mut inner = self.inner.lock();
            if let Some(live) = inner.reap_if_expired(key, now) {
                if live {
                    return Err(HkvError::AlreadyExists);
                }
            }
        }
        self.insert_or_replace(key, value, expiration_ns)
    }

    fn set(&self, key: &[u8], value: &[u8], expiration_ns: i64) -> HkvResult<()> {
        self.insert_or_replace(key, value, expiration_ns)
    }

    fn get(&self, key: &[u8]) -> HkvResult<(Arc<[u8]>, i64)> {
        let now = now_ns();
        let mut inner = self.inner.lock();
        let idx = match inner.map.get(key) {
            Some(&idx) => idx,
            None => return Err(HkvError::NotFound),
        };
        if !inner.nodes[idx].as_ref().unwrap().is_live(now) {
            inner.remove_idx(idx);
            return Err(HkvError::NotFound);
        }
        inner.touch(idx);
        let node = inner.nodes[idx].as_ref().unwrap();
        Ok((Arc::clone(&node.value), node.expiration_ns))
    }

    fn delete(&self, key: &[u8]) -> HkvResult<()> {
        let now = now_ns();
        let mut inner = self.inner.lock();
        let idx = match inner.map.get(key) {
            Some(&idx) => idx,
            None => return Err(HkvError::NotFound),
        };
        let live = inner.nodes[idx].as_ref().unwrap().is_live(now);
        inner.remove_idx(idx);
        if live {
            Ok(())
        } else {
            Err(HkvError::NotFound)
        }
    }

    fn delete_all(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.nodes.clear();
        inner.free.clear();
        inner.head = None;
        inner.tail = None;
        inner.used_bytes = 0;
    }

    fn increment(&self, key: &[u8], delta: i64) -> HkvResult<(i64, i64)> {
        apply_delta(self, key, delta)
    }

    fn decrement(&self, key: &[u8], delta: i64) -> HkvResult<(i64, i64)> {
        apply_delta(self, key, delta.wrapping_neg())
    }

    fn touch(&self, key: &[u8], expiration_ns: i64) -> HkvResult<()> {
        let now = now_ns();
        let mut inner = self.inner.lock();
        let idx = match inner.map.get(key) {
            Some(&idx) => idx,
            None => return Err(HkvError::NotFound),
        };
        if !inner.nodes[idx].as_ref().unwrap().is_live(now) {
            inner.remove_idx(idx);
            return Err(HkvError::NotFound);
        }
        inner.nodes[idx].as_mut().unwrap().expiration_ns = expiration_ns;
        Ok(())
    }

    fn replace(&self, key: &[u8], value: &[u8], expiration_ns: i64) -> HkvResult<()> {
        let now = now_ns();
        {
            let mut inner = self.inner.lock();
            match inner.reap_if_expired(key, now) {
                Some(true) => {}
                _ => return Err(HkvError::NotFound),
            }
        }
        self.insert_or_replace(key, value, expiration_ns)
    }

    fn size_bytes(&self) -> usize {
        self.inner.lock().used_bytes
    }

    fn purge_expired(&self) -> usize {
        let now = now_ns();
        let mut inner = self.inner.lock();
        let before = inner.map.len();
        inner.sweep_expired(now);
        before - inner.map.len()
    }
}

/// Shared body of `Increment`/`Decrement`: decode, add, re-encode in place,
/// promote recency like a successful `Get`.
fn apply_delta(store: &LruStore, key: &[u8], delta: i64) -> HkvResult<(i64, i64)> {
    let now = now_ns();
    let mut inner = store.inner.lock();
    let idx = match inner.map.get(key) {
        Some(&idx) => idx,
        None => return Err(HkvError::NotFound),
    };
    if !inner.nodes[idx].as_ref().unwrap().is_live(now) {
        inner.remove_idx(idx);
        return Err(HkvError::NotFound);
    }

    let current = varint::decode_i64(&inner.nodes[idx].as_ref().unwrap().value)?;
    let updated = current.wrapping_add(delta);
    let encoded = varint::encode_i64_vec(updated);
    let new_size = entry_size(inner.nodes[idx].as_ref().unwrap().key.len(), encoded.len());

    let old_size = inner.nodes[idx].as_ref().unwrap().size;
    inner.used_bytes = inner.used_bytes - old_size + new_size;
    let node = inner.nodes[idx].as_mut().unwrap();
    node.value = Arc::from(encoded);
    node.size = new_size;
    let expiration_ns = node.expiration_ns;
    inner.touch(idx);

    Ok((updated, expiration_ns))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn far_future() -> i64 {
        now_ns() + 3_600_000_000_000
    }

    #[test]
    fn set_then_get_roundtrips() {
        let store = LruStore::new(1024);
        store.set(b"foo", b"bar", far_future()).unwrap();
        let (value, _) = store.get(b"foo").unwrap();
        assert_eq!(&*value, b"bar");
    }

    #[test]
    fn add_then_add_fails_with_already_exists() {
        let store = LruStore::new(1024);
        store.add(b"k", b"v1", far_future()).unwrap();
        assert_eq!(store.add(b"k", b"v2", far_future()), Err(HkvError::AlreadyExists));
    }

    #[test]
    fn add_after_expiry_succeeds() {
        let store = LruStore::new(1024);
        store.add(b"k", b"v1", now_ns() + 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.add(b"k", b"v2", far_future()).unwrap();
        let (value, _) = store.get(b"k").unwrap();
        assert_eq!(&*value, b"v2");
    }

    #[test]
    fn delete_then_delete_is_not_found() {
        let store = LruStore::new(1024);
        store.set(b"k", b"v", far_future()).unwrap();
        store.delete(b"k").unwrap();
        assert_eq!(store.delete(b"k"), Err(HkvError::NotFound));
    }

    #[test]
    fn increment_roundtrip_matches_encoded_sum() {
        let store = LruStore::new(1024);
        let expiration = far_future();
        store.set(b"n", &varint::encode_i64_vec(10), expiration).unwrap();
        let (updated, returned_expiration) = store.increment(b"n", 5).unwrap();
        assert_eq!(updated, 15);
        assert_eq!(returned_expiration, expiration);
        let (value, _) = store.get(b"n").unwrap();
        assert_eq!(varint::decode_i64(&value).unwrap(), 15);
    }

    #[test]
    fn decrement_subtracts() {
        let store = LruStore::new(1024);
        store.set(b"n", &varint::encode_i64_vec(10), far_future()).unwrap();
        let (updated, _) = store.decrement(b"n", 3).unwrap();
        assert_eq!(updated, 7);
    }

    #[test]
    fn increment_on_non_numeric_value_fails() {
        let store = LruStore::new(1024);
        store.set(b"s", b"not-a-number", far_future()).unwrap();
        assert_eq!(store.increment(b"s", 1), Err(HkvError::NotNumeric));
    }

    #[test]
    fn touch_rewrites_expiration_without_reordering() {
        // Each entry costs 48 + 1 + 1 = 50 bytes; budget fits exactly two.
        let store = LruStore::new(50 * 2);
        store.set(b"a", b"1", far_future()).unwrap();
        store.set(b"b", b"1", far_future()).unwrap();
        // `a` is least recently used; Touch must not promote it to head.
        store.touch(b"a", far_future()).unwrap();
        store.set(b"c", b"1", far_future()).unwrap(); // must evict `a`, not `b`

        assert_eq!(store.get(b"a"), Err(HkvError::NotFound));
        assert!(store.get(b"b").is_ok());
        assert!(store.get(b"c").is_ok());
    }

    #[test]
    fn replace_on_absent_key_is_not_found() {
        let store = LruStore::new(1024);
        assert_eq!(store.replace(b"missing", b"v", far_future()), Err(HkvError::NotFound));
    }

    #[test]
    fn replace_on_live_key_updates_value() {
        let store = LruStore::new(1024);
        store.set(b"k", b"v1", far_future()).unwrap();
        store.replace(b"k", b"v2", far_future()).unwrap();
        let (value, _) = store.get(b"k").unwrap();
        assert_eq!(&*value, b"v2");
    }

    #[test]
    fn entry_larger_than_capacity_is_too_large() {
        let store = LruStore::new(8);
        assert_eq!(
            store.set(b"key", b"value-too-big-to-fit", far_future()),
            Err(HkvError::TooLarge)
        );
    }

    #[test]
    fn eviction_respects_byte_budget_and_recency() {
        // Each entry costs 48 (overhead) + 1 (key) + 4 (value) = 53 bytes.
        let store = LruStore::new(53 * 2);
        store.set(b"a", b"1234", far_future()).unwrap();
        store.set(b"b", b"1234", far_future()).unwrap();
        store.get(b"a").unwrap(); // promote a to head
        store.set(b"c", b"1234", far_future()).unwrap(); // evicts b (tail)

        assert_eq!(store.get(b"b"), Err(HkvError::NotFound));
        assert!(store.get(b"a").is_ok());
        assert!(store.get(b"c").is_ok());
        assert!(store.size_bytes() <= 53 * 2);
    }

    #[test]
    fn delete_all_clears_everything() {
        let store = LruStore::new(1024);
        store.set(b"a", b"1", far_future()).unwrap();
        store.set(b"b", b"1", far_future()).unwrap();
        store.delete_all();
        assert_eq!(store.size_bytes(), 0);
        assert_eq!(store.get(b"a"), Err(HkvError::NotFound));
    }

    #[test]
    fn purge_expired_removes_stale_entries() {
        let store = LruStore::new(1024);
        store.set(b"a", b"1", now_ns() + 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.size_bytes(), 0);
    }

    #[test]
    fn get_missing_expired_counts_both_are_not_found() {
        let store = LruStore::new(1024);
        assert_eq!(store.get(b"missing"), Err(HkvError::NotFound));
        store.add(b"k", b"v", now_ns() + 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(store.get(b"k"), Err(HkvError::NotFound));
    }
}
