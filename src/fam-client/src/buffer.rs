//! The client side of the one-sided data path (spec.md §1's "client-side
//! data-path library", specified here only through the wire contract it
//! needs): a registered buffer the memory service can read from or write
//! into directly, and the PE identity used to label requests.

use async_trait::async_trait;
use fam_common::{FamError, FamResult};
use fam_ms::FabricTarget;
use parking_lot::RwLock;

/// Identifies a Processing Element for logging/tracing only — the original
/// `fam_options.h` carries `PE_ID`/`PE_COUNT` globals; this has no effect on
/// server-side semantics (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeIdentity {
    pub pe_id: u32,
    pub pe_count: u32,
}

/// A fixed-size local buffer a PE registers with the fabric so a memory
/// service can perform the "reverse" one-sided operations spec.md §4.4
/// describes for bulk atomic get/put: the MS is the initiator, this buffer
/// is the target.
pub struct ClientBuffer {
    bytes: RwLock<Vec<u8>>,
}

impl ClientBuffer {
    pub fn new(size: usize) -> Self {
        ClientBuffer {
            bytes: RwLock::new(vec![0u8; size]),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read_local(&self, offset: usize, len: usize) -> FamResult<Vec<u8>> {
        let buf = self.bytes.read();
        buf.get(offset..offset + len)
            .map(|s| s.to_vec())
            .ok_or_else(|| FamError::OutOfRange(format!("buffer read {offset}+{len}")))
    }

    pub fn write_local(&self, offset: usize, data: &[u8]) -> FamResult<()> {
        let mut buf = self.bytes.write();
        let end = offset + data.len();
        if end > buf.len() {
            return Err(FamError::OutOfRange(format!("buffer write {offset}+{}", data.len())));
        }
        buf[offset..end].copy_from_slice(data);
        Ok(())
    }
}

#[async_trait]
impl FabricTarget for ClientBuffer {
    async fn fabric_read(&self, _key: u64, offset: u64, len: u64) -> FamResult<Vec<u8>> {
        self.read_local(offset as usize, len as usize)
    }

    async fn fabric_write(&self, _key: u64, offset: u64, data: &[u8]) -> FamResult<()> {
        self.write_local(offset as usize, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_write_then_fabric_read_round_trips() {
        let buf = ClientBuffer::new(128);
        buf.write_local(8, b"hello").unwrap();
        let back = FabricTarget::fabric_read(&buf, 0, 8, 5).await.unwrap();
        assert_eq!(back, b"hello");
    }

    #[test]
    fn out_of_range_write_is_rejected() {
        let buf = ClientBuffer::new(4);
        assert!(matches!(
            buf.write_local(2, &[1, 2, 3]),
            Err(FamError::OutOfRange(_))
        ));
    }
}
