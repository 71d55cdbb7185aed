//! # TCP Server
//!
//! Accept connections, parse the length-prefixed wire frame, and dispatch
//! each request through the Router. One task per connection; requests on a
//! connection are handled sequentially, but distinct connections run fully
//! concurrently.

use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use hkv_common::wire::{self, FrameReader};

use crate::metrics::Metrics;
use crate::router::Router;

/// Handles a single TCP client connection until it closes or a frame fails
/// to parse.
pub async fn handle_connection(
    mut stream: TcpStream,
    router: Arc<Router>,
    metrics: Arc<Metrics>,
) -> std::io::Result<()> {
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut reader = FrameReader;

    loop {
        let bytes = stream.read_buf(&mut buffer).await?;
        if bytes == 0 {
            return Ok(());
        }

        loop {
            match reader.parse(&mut buffer) {
                Ok(Some(payload)) => {
                    let response = handle_frame(&payload, router.as_ref(), metrics.as_ref()).await;
                    stream.write_all(&response).await?;
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(%err, "malformed frame, closing connection");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_frame(payload: &[u8], router: &Router, metrics: &Metrics) -> Vec<u8> {
    metrics.record_request_start();
    let started = Instant::now();
    let result = match wire::Request::decode(payload) {
        Ok(request) => router.dispatch(request).await,
        Err(err) => Err(err),
    };

    if result.is_err() {
        metrics.record_error();
    }
    metrics.record_request_end(started.elapsed());

    let mut out = Vec::new();
    let mut encoded = Vec::new();
    wire::encode_result(&result, &mut encoded);
    wire::frame(&encoded, &mut out);
    out
}
