// hkv-server - TCP server, routing, membership, and metrics for a HybridKV node.

pub mod membership;
pub mod metrics;
pub mod router;
pub mod server;

pub use membership::Membership;
pub use metrics::{Metrics, MetricsSnapshot};
pub use router::Router;
