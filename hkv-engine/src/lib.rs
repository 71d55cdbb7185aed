// hkv-engine - Bounded, expiration-aware LRU Store
//
// A single-lock key/value table with byte-budgeted eviction, backing one
// node's share of the keyspace. See `store` for the `Store` trait and its
// `LruStore` implementation.

pub mod store;

pub use store::{now_ns, LruStore, Store};
