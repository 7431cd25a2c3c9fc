//! A minimal blocking-per-call RPC client: connect, send one framed request,
//! read one framed response, drop the connection. Simple enough to be
//! correct under concurrent callers (each call gets its own socket), which
//! matches the CIS's statelessness requirement (SPEC_FULL.md §4.3).

use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpStream;

use crate::framing::{read_frame, write_frame, FramingError};

#[derive(Debug, thiserror::Error)]
pub enum RpcClientError {
    #[error("connect failed to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
}

pub async fn call<Req, Resp>(addr: &str, request: &Req) -> Result<Resp, RpcClientError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut stream =
        TcpStream::connect(addr)
            .await
            .map_err(|source| RpcClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
    write_frame(&mut stream, request).await?;
    let resp = read_frame(&mut stream).await?;
    Ok(resp)
}
