//! # Router
//!
//! Dispatches an inbound request either to the local Store or to whichever
//! peer currently owns the key, per the published Ring. This is the direct
//! implementation of the one real routing decision in the system this
//! workspace is descended from: check consistent hashing, serve locally if
//! the key belongs to you, otherwise forward it.

use std::sync::Arc;

use hkv_client::{PeerClient, PeerPool};
use hkv_common::wire::{Item, Reply, Request};
use hkv_common::HkvError;
use hkv_engine::Store;

use crate::membership::Membership;

pub struct Router {
    store: Arc<dyn Store>,
    membership: Arc<Membership>,
    peers: PeerPool,
}

impl Router {
    pub fn new(store: Arc<dyn Store>, membership: Arc<Membership>) -> Self {
        Router {
            store,
            membership,
            peers: PeerPool::new(),
        }
    }

    pub async fn dispatch(&self, request: Request) -> Result<Reply, HkvError> {
        match request.routing_key() {
            None => self.dispatch_keyless(request).await,
            Some(key) => {
                let key = key.to_vec();
                self.dispatch_keyed(&key, request).await
            }
        }
    }

    async fn dispatch_keyless(&self, request: Request) -> Result<Reply, HkvError> {
        match request {
            Request::DeleteAll => {
                self.store.delete_all();
                Ok(Reply::ok())
            }
            Request::AddServer { addr } => {
                tracing::debug!(peer = %addr, "membership: add_server");
                self.membership.add_server(addr);
                Ok(Reply::ok())
            }
            Request::DropServer { addr } => {
                tracing::debug!(peer = %addr, "membership: drop_server");
                self.membership.drop_server(&addr);
                self.peers.drop_client(&addr);
                Ok(Reply::ok())
            }
            Request::CheckConnection => Ok(Reply::ok()),
            other => {
                tracing::error!("keyless dispatch reached with a keyed request");
                unreachable!("routing_key() classified {other:?} as keyless")
            }
        }
    }

    async fn dispatch_keyed(&self, key: &[u8], request: Request) -> Result<Reply, HkvError> {
        let owner = self.resolve_owner(key)?;

        if owner == self.membership.self_addr() {
            tracing::debug!(%owner, "dispatch: local");
            return self.dispatch_local(&request);
        }

        tracing::debug!(%owner, "dispatch: forward");
        match self.forward(&owner, &request).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(peer = %owner, error = %err, "forward failed, dropping peer");
                self.membership.drop_server(&owner);
                self.peers.drop_client(&owner);
                self.gossip_drop(&owner);

                let retry_owner = self.resolve_owner(key)?;
                if retry_owner == self.membership.self_addr() {
                    return self.dispatch_local(&request);
                }
                match self.forward(&retry_owner, &request).await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::warn!(peer = %retry_owner, error = %err, "retry forward failed");
                        Err(HkvError::Unavailable)
                    }
                }
            }
        }
    }

    fn resolve_owner(&self, key: &[u8]) -> Result<String, HkvError> {
        self.membership
            .ring()
            .get(key)
            .map(str::to_string)
            .ok_or(HkvError::Unavailable)
    }

    fn dispatch_local(&self, request: &Request) -> Result<Reply, HkvError> {
        match request {
            Request::Add { key, value, expiration_ns } => {
                self.store.add(key, value, *expiration_ns)?;
                Ok(Reply::ok())
            }
            Request::Set { key, value, expiration_ns } => {
                self.store.set(key, value, *expiration_ns)?;
                Ok(Reply::ok())
            }
            Request::Get { key } => {
                let (value, expiration_ns) = self.store.get(key)?;
                Ok(Reply::ok_item(Item {
                    key: key.clone(),
                    value: value.to_vec(),
                    expiration_ns,
                }))
            }
            Request::Delete { key } => {
                self.store.delete(key)?;
                Ok(Reply::ok())
            }
            Request::Increment { key, delta } => {
                let (value, expiration_ns) = self.store.increment(key, *delta)?;
                Ok(Reply::ok_item(Item {
                    key: key.clone(),
                    value: hkv_common::varint::encode_i64_vec(value),
                    expiration_ns,
                }))
            }
            Request::Decrement { key, delta } => {
                let (value, expiration_ns) = self.store.decrement(key, *delta)?;
                Ok(Reply::ok_item(Item {
                    key: key.clone(),
                    value: hkv_common::varint::encode_i64_vec(value),
                    expiration_ns,
                }))
            }
            Request::Touch { key, expiration_ns } => {
                self.store.touch(key, *expiration_ns)?;
                Ok(Reply::ok())
            }
            Request::Replace { key, value, expiration_ns } => {
                self.store.replace(key, value, *expiration_ns)?;
                Ok(Reply::ok())
            }
            Request::CompareAndSwap { .. } => Err(HkvError::Unimplemented),
            Request::DeleteAll
            | Request::AddServer { .. }
            | Request::DropServer { .. }
            | Request::CheckConnection => {
                unreachable!("keyless request reached dispatch_local")
            }
        }
    }

    async fn forward(&self, owner: &str, request: &Request) -> Result<Result<Reply, HkvError>, hkv_client::ClientError> {
        let client: Arc<PeerClient> = self.peers.client(owner);
        client.send(request).await
    }

    /// Best-effort fan-out of a peer drop to every other known peer.
    /// Delivery is not awaited; duplicate notifications are harmless
    /// because `drop_server` is idempotent.
    fn gossip_drop(&self, dropped: &str) {
        let self_addr = self.membership.self_addr().to_string();
        let dropped = dropped.to_string();
        for peer in self.membership.members_snapshot() {
            if peer == self_addr || peer == dropped {
                continue;
            }
            let client = self.peers.client(&peer);
            let request = Request::DropServer { addr: dropped.clone() };
            tokio::spawn(async move {
                if let Err(err) = client.send(&request).await {
                    tracing::debug!(peer = %client.addr(), error = %err, "gossip drop_server delivery failed");
                }
            });
        }
    }
}
