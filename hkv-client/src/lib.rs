//! # HybridKV Peer Transport
//!
//! The async client a node's Router uses to forward a request to whichever
//! peer owns a key, over the binary wire frame defined in
//! `hkv_common::wire`.

mod client;
mod pool;

pub use client::{ClientError, ClientResult, PeerClient};
pub use pool::PeerPool;
