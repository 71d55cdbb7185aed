//! # Node Configuration
//!
//! The handful of settings a node needs at startup: its own address, its
//! initial peer set, the Store's byte budget, and the Ring's virtual node
//! count. Parsing argv/env into this struct is left to `hkv-server`'s binary
//! entrypoint; this type only carries the already-validated values.

/// Startup configuration for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address this node listens on and advertises to peers.
    pub self_addr: String,

    /// Addresses of peers known at startup. Does not include `self_addr`.
    pub peers: Vec<String>,

    /// Total byte budget for the Store (keys + values + per-entry overhead).
    pub max_bytes: usize,

    /// Virtual nodes placed per physical address on the Ring.
    pub virtual_nodes: usize,
}

impl NodeConfig {
    pub fn new(self_addr: impl Into<String>, max_bytes: usize, virtual_nodes: usize) -> Self {
        NodeConfig {
            self_addr: self_addr.into(),
            peers: Vec::new(),
            max_bytes,
            virtual_nodes,
        }
    }

    pub fn with_peers(mut self, peers: Vec<String>) -> Self {
        self.peers = peers;
        self
    }

    /// All addresses this node must place on the Ring, self included.
    pub fn ring_members(&self) -> Vec<String> {
        let mut members = Vec::with_capacity(self.peers.len() + 1);
        members.push(self.self_addr.clone());
        members.extend(self.peers.iter().cloned());
        members
    }
}
