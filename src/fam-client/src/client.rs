//! Thin PE-side stub (SPEC_FULL.md's `fam-client`): wire contracts to the
//! CIS for metadata-plane composite operations, plus direct `FabricProvider`
//! calls to a memory service for the data plane and for server-executed
//! atomics — both bypass the CIS entirely, per spec.md §2's "data-plane
//! reads/writes bypass CIS and MDS entirely" and §4.4's "forwards the
//! request to the owning MS via the control plane".

use std::sync::Arc;

use fam_common::model::PermissionLevel;
use fam_common::{FamError, FamResult};
use fam_ms::FabricProvider;
use fam_rpc::messages::{
    AccessTypeWire, AtomicOp, CisRequest, CisResponse, DataItemDescriptor, MsRequest, MsResponse,
    NumericValue, RegionDescriptor,
};

use crate::buffer::{ClientBuffer, PeIdentity};

#[derive(Debug, Clone)]
pub struct FamClientConfig {
    pub cis_addr: String,
    /// Memory-service addresses, indexed by memserver id — the same
    /// topology the CIS itself is configured with, since the data plane
    /// talks to MS nodes directly.
    pub ms_addrs: Vec<String>,
    /// How this client is addressed on the fabric, so a memory service can
    /// issue the reverse one-sided ops described in spec.md §4.4.
    pub node_addr: String,
    pub pe: PeIdentity,
}

pub struct FamClient {
    config: FamClientConfig,
    fabric: Arc<dyn FabricProvider>,
    buffer: Arc<ClientBuffer>,
}

impl FamClient {
    pub fn new(config: FamClientConfig, fabric: Arc<dyn FabricProvider>, buffer: Arc<ClientBuffer>) -> Self {
        FamClient {
            config,
            fabric,
            buffer,
        }
    }

    pub fn pe(&self) -> PeIdentity {
        self.config.pe
    }

    pub fn buffer(&self) -> &Arc<ClientBuffer> {
        &self.buffer
    }

    async fn cis_call(&self, request: CisRequest) -> FamResult<CisResponse> {
        match fam_rpc::call::<CisRequest, CisResponse>(&self.config.cis_addr, &request).await {
            Ok(CisResponse::Error(code, message)) => Err(FamError::from_wire(code, message)),
            Ok(resp) => Ok(resp),
            Err(e) => Err(FamError::Metadata(format!("cis rpc failed: {e}"))),
        }
    }

    fn ms_addr(&self, memserver_id: u32) -> FamResult<&str> {
        self.config
            .ms_addrs
            .get(memserver_id as usize)
            .map(String::as_str)
            .ok_or_else(|| FamError::NotFound(format!("memserver {memserver_id}")))
    }

    async fn ms_call(&self, memserver_id: u32, request: MsRequest) -> FamResult<MsResponse> {
        let addr = self.ms_addr(memserver_id)?;
        match fam_rpc::call::<MsRequest, MsResponse>(addr, &request).await {
            Ok(MsResponse::Error(code, message)) => Err(FamError::from_wire(code, message)),
            Ok(resp) => Ok(resp),
            Err(e) => Err(FamError::Fabric(format!("ms {memserver_id} rpc failed: {e}"))),
        }
    }

    // --- Metadata/control plane, via the CIS ---

    #[allow(clippy::too_many_arguments)]
    pub async fn create_region(
        &self,
        name: String,
        size: u64,
        mode: u32,
        uid: u32,
        gid: u32,
        interleave_enable: bool,
        interleave_size: u64,
        permission_level: PermissionLevel,
    ) -> FamResult<u64> {
        match self
            .cis_call(CisRequest::CreateRegion {
                name,
                size,
                mode,
                uid,
                gid,
                redundancy_none: true,
                interleave_enable,
                interleave_size,
                permission_level,
            })
            .await?
        {
            CisResponse::RegionId(id) => Ok(id),
            other => Err(FamError::Metadata(format!("unexpected cis response: {other:?}"))),
        }
    }

    pub async fn destroy_region(&self, region_id: u64, uid: u32, gid: u32) -> FamResult<()> {
        self.cis_call(CisRequest::DestroyRegion { region_id, uid, gid })
            .await?;
        Ok(())
    }

    pub async fn lookup_region(&self, name: String, uid: u32, gid: u32) -> FamResult<RegionDescriptor> {
        match self.cis_call(CisRequest::LookupRegion { name, uid, gid }).await? {
            CisResponse::Region(desc) => Ok(desc),
            other => Err(FamError::NotFound(format!("unexpected cis response: {other:?}"))),
        }
    }

    pub async fn lookup(
        &self,
        item_name: String,
        region_name: String,
        uid: u32,
        gid: u32,
    ) -> FamResult<DataItemDescriptor> {
        match self
            .cis_call(CisRequest::Lookup {
                item_name,
                region_name,
                uid,
                gid,
            })
            .await?
        {
            CisResponse::DataItem(desc) => Ok(desc),
            other => Err(FamError::NotFound(format!("unexpected cis response: {other:?}"))),
        }
    }

    pub async fn allocate(
        &self,
        region_id: u64,
        name: Option<String>,
        size: u64,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FamResult<u64> {
        match self
            .cis_call(CisRequest::Allocate {
                region_id,
                name,
                size,
                mode,
                uid,
                gid,
            })
            .await?
        {
            CisResponse::Offset(offset) => Ok(offset),
            other => Err(FamError::Memory(format!("unexpected cis response: {other:?}"))),
        }
    }

    pub async fn deallocate(&self, region_id: u64, offset: u64, uid: u32, gid: u32) -> FamResult<()> {
        self.cis_call(CisRequest::Deallocate {
            region_id,
            offset,
            uid,
            gid,
        })
        .await?;
        Ok(())
    }

    // --- Data plane: one-sided fabric access, straight to the owning MS ---

    pub async fn fam_put(&self, ms_node_addr: &str, key: u64, base: u64, offset: u64, data: &[u8]) -> FamResult<()> {
        self.fabric.write_at(ms_node_addr, key, base + offset, data).await
    }

    pub async fn fam_get(&self, ms_node_addr: &str, key: u64, base: u64, offset: u64, len: u64) -> FamResult<Vec<u8>> {
        self.fabric.read_at(ms_node_addr, key, base + offset, len).await
    }

    // --- Server-executed atomics: forwarded straight to the owning MS ---

    #[allow(clippy::too_many_arguments)]
    pub async fn rmw_atomic(
        &self,
        memserver_id: u32,
        region_id: u64,
        offset: u64,
        op: AtomicOp,
        operand: NumericValue,
        compare: Option<NumericValue>,
    ) -> FamResult<NumericValue> {
        match self
            .ms_call(
                memserver_id,
                MsRequest::RmwAtomic {
                    region_id,
                    offset,
                    op,
                    operand,
                    compare,
                },
            )
            .await?
        {
            MsResponse::NumericValue(v) => Ok(v),
            other => Err(FamError::Resource(format!("unexpected ms response: {other:?}"))),
        }
    }

    /// Bulk atomic get (spec.md §4.4 item 3): the MS reads `size` bytes at
    /// `(region_id, offset)` and pushes them into this client's registered
    /// buffer at `dst_offset` via a reverse one-sided fabric write.
    pub async fn get_atomic(
        &self,
        memserver_id: u32,
        region_id: u64,
        offset: u64,
        size: u64,
        dst_key: u64,
        dst_offset: u64,
    ) -> FamResult<()> {
        self.ms_call(
            memserver_id,
            MsRequest::GetAtomic {
                region_id,
                offset,
                size,
                dst_base_addr: dst_offset,
                dst_key,
                dst_node_addr: self.config.node_addr.clone(),
            },
        )
        .await?;
        Ok(())
    }

    /// Bulk atomic put: the MS reads `size` bytes from this client's
    /// registered buffer at `src_offset` via a reverse one-sided fabric
    /// read, then writes them at `(region_id, offset)`.
    pub async fn put_atomic(
        &self,
        memserver_id: u32,
        region_id: u64,
        offset: u64,
        size: u64,
        src_key: u64,
        src_offset: u64,
    ) -> FamResult<()> {
        self.ms_call(
            memserver_id,
            MsRequest::PutAtomic {
                region_id,
                offset,
                size,
                src_base_addr: src_offset,
                src_key,
                src_node_addr: self.config.node_addr.clone(),
            },
        )
        .await?;
        Ok(())
    }

    pub async fn acquire_cas_lock(&self, memserver_id: u32, offset: u64) -> FamResult<()> {
        self.ms_call(memserver_id, MsRequest::AcquireCasLock { offset })
            .await?;
        Ok(())
    }

    pub async fn release_cas_lock(&self, memserver_id: u32, offset: u64) -> FamResult<()> {
        self.ms_call(memserver_id, MsRequest::ReleaseCasLock { offset })
            .await?;
        Ok(())
    }

    pub async fn get_region_memory(
        &self,
        memserver_id: u32,
        region_id: u64,
        access: AccessTypeWire,
    ) -> FamResult<(Vec<u64>, Vec<u64>)> {
        match self
            .ms_call(memserver_id, MsRequest::GetRegionMemory { region_id, access })
            .await?
        {
            MsResponse::RegionMemory(info) => Ok((info.keys, info.bases)),
            other => Err(FamError::Memory(format!("unexpected ms response: {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fam_ms::{LoopbackFabric, MemoryService, MemoryServiceConfig};

    fn new_ms(fabric: &Arc<LoopbackFabric>, addr: &str, tmp: &std::path::Path) -> Arc<MemoryService> {
        let config = MemoryServiceConfig {
            node_addr: addr.to_string(),
            memserver_id: 0,
            backup_root: tmp.to_path_buf(),
            num_consumer: 1,
            queue_depth: 8,
            async_jobs_enabled: false,
        };
        let svc = MemoryService::new(config, fabric.clone()).unwrap();
        fabric.register_peer(svc.node_addr().to_string(), svc.clone());
        svc
    }

    /// Scenario 3 (spec.md §8): an interleaved put/get round trip whose
    /// bytes span at least two memserver extents, driven entirely through
    /// `FamClient`'s data-plane calls rather than any server-internal API.
    #[tokio::test]
    async fn put_get_round_trip_spans_two_memserver_extents() {
        let tmp_a = tempfile::tempdir().unwrap();
        let tmp_b = tempfile::tempdir().unwrap();
        let fabric = LoopbackFabric::new();
        let svc_a = new_ms(&fabric, "node-a", tmp_a.path());
        let svc_b = new_ms(&fabric, "node-b", tmp_b.path());

        let interleave_size = 64u64;
        let num_memservers = 2u64;
        svc_a.create_region(1, 4096, PermissionLevel::Region).unwrap();
        svc_b.create_region(1, 4096, PermissionLevel::Region).unwrap();
        svc_a
            .register_region_memory(1, AccessTypeWire::ReadWrite)
            .unwrap();
        svc_b
            .register_region_memory(1, AccessTypeWire::ReadWrite)
            .unwrap();
        let (keys_a, bases_a) = svc_a.get_region_memory(1, AccessTypeWire::ReadWrite).unwrap();
        let (keys_b, bases_b) = svc_b.get_region_memory(1, AccessTypeWire::ReadWrite).unwrap();

        let client = FamClient::new(
            FamClientConfig {
                cis_addr: "unused".into(),
                ms_addrs: vec![],
                node_addr: "client-1".into(),
                pe: PeIdentity {
                    pe_id: 0,
                    pe_count: 1,
                },
            },
            fabric.clone(),
            Arc::new(ClientBuffer::new(0)),
        );

        // Offset 0 resolves to extent 0 (node-a); offset `interleave_size`
        // resolves to extent 1 (node-b) — the two puts below land on
        // different memservers.
        let (extent_a, off_a) = fam_cis::layout::resolve_offset(0, interleave_size, num_memservers);
        let (extent_b, off_b) =
            fam_cis::layout::resolve_offset(interleave_size, interleave_size, num_memservers);
        assert_eq!(extent_a, 0);
        assert_eq!(extent_b, 1);

        client
            .fam_put("node-a", keys_a[0], bases_a[0], off_a, b"hello-a")
            .await
            .unwrap();
        client
            .fam_put("node-b", keys_b[0], bases_b[0], off_b, b"hello-b")
            .await
            .unwrap();

        let read_a = client
            .fam_get("node-a", keys_a[0], bases_a[0], off_a, 7)
            .await
            .unwrap();
        let read_b = client
            .fam_get("node-b", keys_b[0], bases_b[0], off_b, 7)
            .await
            .unwrap();
        assert_eq!(read_a, b"hello-a");
        assert_eq!(read_b, b"hello-b");
    }
}
