//! Generic accept loop shared by the MDS, MS and CIS binaries, modeled on
//! `wormhole/src/bin/server/main.rs`'s `WormholeServer::listen`:
//! bind, loop-accept, `tokio::spawn` a handler per connection, log and
//! continue past per-connection errors rather than tearing down the
//! listener.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::framing::{read_frame, write_frame};

/// Runs `handler` against a single request and produces a response. Each
/// service implements this once over its own `Request`/`Response` enum.
#[async_trait]
pub trait RequestHandler<Req, Resp>: Send + Sync + 'static {
    async fn handle(&self, request: Req) -> Resp;
}

pub async fn serve<S, Req, Resp>(addr: &str, service: Arc<S>) -> anyhow::Result<()>
where
    S: RequestHandler<Req, Resp>,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = ?e, "accept failed");
                continue;
            }
        };
        let service = service.clone();
        tokio::spawn(async move {
            loop {
                let request: Req = match read_frame(&mut stream).await {
                    Ok(r) => r,
                    Err(_) => {
                        debug!(?peer, "connection closed");
                        return;
                    }
                };
                let response = service.handle(request).await;
                if write_frame(&mut stream, &response).await.is_err() {
                    debug!(?peer, "failed to write response, dropping connection");
                    return;
                }
            }
        });
    }
}
