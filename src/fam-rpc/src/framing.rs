//! Length-prefixed message framing, generalized from `wormhole/src/rpc.rs`'s
//! `read_bytes`/`RpcServerMessage::write` helpers (4-byte big-endian length
//! prefix, then the encoded payload) to any `bincode`-serializable message
//! over any `AsyncRead`/`AsyncWrite` stream.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),
}

/// Frames larger than this are rejected rather than causing an unbounded
/// allocation on a malformed or hostile peer.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

pub async fn write_frame<W, T>(stream: &mut W, message: &T) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FramingError::TooLarge(payload.len()));
    }
    let len_bytes = (payload.len() as u32).to_be_bytes();
    stream.write_all(&len_bytes).await?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_frame<R, T>(stream: &mut R) -> Result<T, FramingError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FramingError::TooLarge(len));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(bincode::deserialize(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping(u32, String);

    #[tokio::test]
    async fn round_trips_over_a_duplex_stream() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let msg = Ping(7, "hello".to_string());
        write_frame(&mut a, &msg).await.unwrap();
        let got: Ping = read_frame(&mut b).await.unwrap();
        assert_eq!(got, msg);
    }
}
