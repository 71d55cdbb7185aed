//! # Peer Client Pool
//!
//! Purpose: hand out one long-lived [`PeerClient`] per peer address,
//! owned by the node's Router rather than a process-wide global.
//!
//! Unlike a bounded idle/total connection pool, there is no capacity limit
//! and no RAII return-on-drop: a `PeerClient` is addressed by peer, not
//! leased and returned, because the Router only ever talks to a fixed,
//! known set of peers for the node's lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::client::PeerClient;

/// Cache of one [`PeerClient`] per peer address.
#[derive(Default)]
pub struct PeerPool {
    clients: Mutex<HashMap<String, Arc<PeerClient>>>,
}

impl PeerPool {
    pub fn new() -> Self {
        PeerPool {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the client for `addr`, creating one on first use.
    pub fn client(&self, addr: &str) -> Arc<PeerClient> {
        let mut clients = self.clients.lock().expect("pool mutex poisoned");
        clients
            .entry(addr.to_string())
            .or_insert_with(|| Arc::new(PeerClient::new(addr)))
            .clone()
    }

    /// Drops the cached client for `addr`, if any.
    ///
    /// Called by Membership when a peer is removed from the cluster, so a
    /// stale connection is not kept around for an address that no longer
    /// owns any keys.
    pub fn drop_client(&self, addr: &str) {
        self.clients.lock().expect("pool mutex poisoned").remove(addr);
    }
}
