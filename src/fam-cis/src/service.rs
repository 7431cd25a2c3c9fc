//! The Client-Interface Service (spec.md §4.3): a stateless fan-in that
//! turns one client request into a layout decision plus a handful of MDS and
//! MS calls. Nothing here is mutable service state — every call re-derives
//! the plan from the request and the static memserver topology, so (as the
//! spec requires) the CIS may be restarted without losing anything.

use fam_common::model::PermissionLevel;
use fam_common::permission::Op;
use fam_common::{FamError, FamResult};
use fam_rpc::messages::{
    AccessTypeWire, DataItemDescriptor, MdsRequest, MdsResponse, MsRequest, MsResponse,
    RegionDescriptor,
};
use tokio::task::JoinSet;
use tracing::warn;

use crate::layout;

/// Static topology the CIS was started with: one metadata service and an
/// ordered list of memory-service addresses, indexed by memserver id.
#[derive(Debug, Clone)]
pub struct CisConfig {
    pub mds_addr: String,
    pub ms_addrs: Vec<String>,
}

pub struct ClientInterfaceService {
    config: CisConfig,
}

impl ClientInterfaceService {
    pub fn new(config: CisConfig) -> Self {
        ClientInterfaceService { config }
    }

    async fn mds_call(&self, request: MdsRequest) -> FamResult<MdsResponse> {
        match fam_rpc::call::<MdsRequest, MdsResponse>(&self.config.mds_addr, &request).await {
            Ok(MdsResponse::Error(code, message)) => Err(FamError::from_wire(code, message)),
            Ok(resp) => Ok(resp),
            Err(e) => Err(FamError::Metadata(format!("mds rpc failed: {e}"))),
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

    /// Best-effort `destroy_region` against every memserver that already
    /// succeeded in creating an extent, per spec.md §4.3 step 3. Errors are
    /// logged, not propagated — the caller is already unwinding a failure.
    async fn create_region_failure_cleanup(&self, region_id: u64, created_on: &[u32]) {
        for &memserver_id in created_on {
            if let Err(e) = self
                .ms_call(memserver_id, MsRequest::DestroyRegion { region_id })
                .await
            {
                warn!(region_id, memserver_id, error = %e, "failure-path destroy_region did not complete");
            }
        }
    }

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
        let memservers =
            layout::choose_memservers(&name, self.config.ms_addrs.len(), interleave_enable);
        let extent_size = layout::extent_size(size, memservers.len() as u64);

        // The metadata record is the source of truth for `region_id`, so it
        // is committed first; a memory-service create failure rolls both
        // the extents already created *and* this record back.
        let region_id = match self
            .mds_call(MdsRequest::CreateRegionMeta {
                name,
                size,
                mode,
                uid,
                gid,
                permission_level,
                interleave_enable,
                interleave_size,
                memservers: memservers.clone(),
            })
            .await?
        {
            MdsResponse::RegionId(id) => id,
            other => {
                return Err(FamError::Metadata(format!(
                    "unexpected mds response to create_region_meta: {other:?}"
                )))
            }
        };

        let mut joins = JoinSet::new();
        for &memserver_id in &memservers {
            let addr = self.ms_addr(memserver_id)?.to_string();
            joins.spawn(async move {
                let req = MsRequest::CreateRegion {
                    region_id,
                    size: extent_size,
                    permission_level,
                };
                let result = fam_rpc::call::<MsRequest, MsResponse>(&addr, &req).await;
                (memserver_id, result)
            });
        }

        let mut succeeded = Vec::with_capacity(memservers.len());
        let mut first_err: Option<FamError> = None;
        while let Some(joined) = joins.join_next().await {
            let (memserver_id, result) = match joined {
                Ok(pair) => pair,
                Err(join_err) => {
                    first_err.get_or_insert(FamError::Resource(format!(
                        "memserver task panicked: {join_err}"
                    )));
                    continue;
                }
            };
            match result {
                Ok(MsResponse::Unit) => succeeded.push(memserver_id),
                Ok(MsResponse::Error(code, message)) => {
                    first_err.get_or_insert(FamError::from_wire(code, message));
                }
                Ok(other) => {
                    first_err.get_or_insert(FamError::Resource(format!(
                        "unexpected ms response to create_region: {other:?}"
                    )));
                }
                Err(e) => {
                    first_err.get_or_insert(FamError::Fabric(format!(
                        "memserver {memserver_id} create_region rpc failed: {e}"
                    )));
                }
            }
        }

        if let Some(err) = first_err {
            self.create_region_failure_cleanup(region_id, &succeeded)
                .await;
            let _ = self
                .mds_call(MdsRequest::DestroyRegionMeta { region_id })
                .await;
            return Err(err);
        }

        Ok(region_id)
    }

    pub async fn destroy_region(&self, region_id: u64, uid: u32, gid: u32) -> FamResult<()> {
        let region = match self.mds_call(MdsRequest::GetRegion { region_id }).await? {
            MdsResponse::RegionMeta(meta) => meta,
            _ => return Err(FamError::NotFound(format!("region {region_id}"))),
        };
        if region.owner_uid != uid {
            return Err(FamError::NoPermission(format!(
                "uid {uid} does not own region {region_id}"
            )));
        }
        let _ = gid;

        for &memserver_id in &region.memservers {
            if let Err(e) = self
                .ms_call(memserver_id, MsRequest::DestroyRegion { region_id })
                .await
            {
                // destroy_region is documented idempotent; leave metadata in
                // place so a retry can finish fanning the destroy out.
                warn!(region_id, memserver_id, error = %e, "destroy_region did not reach every memserver");
                return Err(e);
            }
        }

        self.mds_call(MdsRequest::DestroyRegionMeta { region_id })
            .await?;
        Ok(())
    }

    pub async fn resize(&self, region_id: u64, new_size: u64, uid: u32, gid: u32) -> FamResult<()> {
        let region = self.require_region(region_id, Op::Write, uid, gid).await?;
        let extent_size = layout::extent_size(new_size, region.memservers.len() as u64);
        for &memserver_id in &region.memservers {
            self.ms_call(
                memserver_id,
                MsRequest::ResizeRegion {
                    region_id,
                    new_size: extent_size,
                },
            )
            .await?;
        }
        self.mds_call(MdsRequest::ResizeRegionMeta { region_id, new_size })
            .await?;
        Ok(())
    }

    async fn require_region(
        &self,
        region_id: u64,
        op: Op,
        uid: u32,
        gid: u32,
    ) -> FamResult<fam_common::model::RegionMeta> {
        let region = match self.mds_call(MdsRequest::GetRegion { region_id }).await? {
            MdsResponse::RegionMeta(meta) => meta,
            _ => return Err(FamError::NotFound(format!("region {region_id}"))),
        };
        if !fam_common::permission::Mode(region.mode).allows(
            op,
            region.owner_uid,
            region.owner_gid,
            uid,
            gid,
        ) {
            return Err(FamError::NoPermission(format!(
                "uid {uid} gid {gid} denied on region {region_id}"
            )));
        }
        Ok(region)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn allocate(
        &self,
        region_id: u64,
        name: Option<String>,
        size: u64,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FamResult<u64> {
        let region = self.require_region(region_id, Op::Write, uid, gid).await?;

        let memserver_id = match region.permission_level {
            PermissionLevel::DataItem => {
                let idx = layout::hash_name(name.as_deref().unwrap_or(""))
                    % region.memservers.len() as u64;
                region.memservers[idx as usize]
            }
            PermissionLevel::Region => {
                // Round-robin across the region's memservers using the
                // region's own per-region cursor, so fresh allocations
                // spread out over time instead of always landing on the
                // first memserver.
                let cursor = match self
                    .mds_call(MdsRequest::NextAllocCursor { region_id })
                    .await?
                {
                    MdsResponse::Cursor(c) => c,
                    other => {
                        return Err(FamError::Metadata(format!(
                            "unexpected mds response to next_alloc_cursor: {other:?}"
                        )))
                    }
                };
                region.memservers[(cursor % region.memservers.len() as u64) as usize]
            }
        };

        let offset = match self
            .ms_call(memserver_id, MsRequest::Allocate { region_id, size })
            .await?
        {
            MsResponse::Offset(offset) => offset,
            other => {
                return Err(FamError::Memory(format!(
                    "unexpected ms response to allocate: {other:?}"
                )))
            }
        };

        if let Err(e) = self
            .mds_call(MdsRequest::AllocateMeta {
                region_id,
                offset,
                size,
                name,
                mode,
                uid,
                gid,
            })
            .await
        {
            let _ = self
                .ms_call(memserver_id, MsRequest::Deallocate { region_id, offset })
                .await;
            return Err(e);
        }

        Ok(offset)
    }

    pub async fn deallocate(&self, region_id: u64, offset: u64, uid: u32, gid: u32) -> FamResult<()> {
        let item = match self
            .mds_call(MdsRequest::GetDataitem { region_id, offset })
            .await?
        {
            MdsResponse::DataItemMeta(meta) => meta,
            _ => return Err(FamError::NotFound(format!("dataitem {region_id}:{offset}"))),
        };
        if !fam_common::permission::Mode(item.mode).allows(
            Op::Write,
            item.owner_uid,
            item.owner_gid,
            uid,
            gid,
        ) {
            return Err(FamError::NoPermission(format!(
                "uid {uid} gid {gid} denied deallocate on {region_id}:{offset}"
            )));
        }

        let region = match self.mds_call(MdsRequest::GetRegion { region_id }).await? {
            MdsResponse::RegionMeta(meta) => meta,
            _ => return Err(FamError::NotFound(format!("region {region_id}"))),
        };
        let memserver_id = region.memservers[0];
        self.ms_call(memserver_id, MsRequest::Deallocate { region_id, offset })
            .await?;
        self.mds_call(MdsRequest::DeallocateMeta { region_id, offset })
            .await?;
        Ok(())
    }

    pub async fn change_region_permission(&self, region_id: u64, mode: u32, uid: u32) -> FamResult<()> {
        self.mds_call(MdsRequest::ChangeRegionPermission {
            region_id,
            mode,
            caller_uid: uid,
        })
        .await?;
        Ok(())
    }

    pub async fn change_dataitem_permission(
        &self,
        region_id: u64,
        offset: u64,
        mode: u32,
        uid: u32,
    ) -> FamResult<()> {
        self.mds_call(MdsRequest::ChangeDataitemPermission {
            region_id,
            offset,
            mode,
            caller_uid: uid,
        })
        .await?;
        Ok(())
    }

    pub async fn lookup_region(&self, name: String, uid: u32, gid: u32) -> FamResult<RegionDescriptor> {
        let region = match self.mds_call(MdsRequest::LookupRegion { name }).await? {
            MdsResponse::RegionMeta(meta) => meta,
            _ => return Err(FamError::NotFound("region".into())),
        };
        if !fam_common::permission::Mode(region.mode).allows(
            Op::Read,
            region.owner_uid,
            region.owner_gid,
            uid,
            gid,
        ) {
            return Err(FamError::NoPermission(format!(
                "uid {uid} gid {gid} denied lookup on region {}",
                region.region_id
            )));
        }
        Ok(RegionDescriptor {
            region_id: region.region_id,
            name: region.name,
            size: region.size,
            mode: region.mode,
            owner_uid: region.owner_uid,
            owner_gid: region.owner_gid,
            interleave_size: region.interleave_size,
            permission_level: region.permission_level,
            memservers: region.memservers,
        })
    }

    pub async fn lookup(
        &self,
        item_name: String,
        region_name: String,
        uid: u32,
        gid: u32,
    ) -> FamResult<DataItemDescriptor> {
        let item = match self
            .mds_call(MdsRequest::Lookup {
                item_name,
                region_name: region_name.clone(),
            })
            .await?
        {
            MdsResponse::DataItemMeta(meta) => meta,
            _ => return Err(FamError::NotFound("dataitem".into())),
        };
        if !fam_common::permission::Mode(item.mode).allows(
            Op::Read,
            item.owner_uid,
            item.owner_gid,
            uid,
            gid,
        ) {
            return Err(FamError::NoPermission(format!(
                "uid {uid} gid {gid} denied lookup on dataitem {}:{}",
                item.region_id, item.offset
            )));
        }

        let region = match self
            .mds_call(MdsRequest::GetRegion {
                region_id: item.region_id,
            })
            .await?
        {
            MdsResponse::RegionMeta(meta) => meta,
            _ => return Err(FamError::NotFound("region".into())),
        };
        let memserver_id = region.memservers[0];
        let access = AccessTypeWire::ReadWrite;
        let (key, base) = match region.permission_level {
            PermissionLevel::DataItem => match self
                .ms_call(
                    memserver_id,
                    MsRequest::GetDataitemMemory {
                        region_id: item.region_id,
                        offset: item.offset,
                        size: item.size,
                        access,
                    },
                )
                .await?
            {
                MsResponse::DataitemMemory(info) => (info.key, info.base),
                other => {
                    return Err(FamError::Memory(format!(
                        "unexpected ms response to get_dataitem_memory: {other:?}"
                    )))
                }
            },
            PermissionLevel::Region => match self
                .ms_call(
                    memserver_id,
                    MsRequest::GetRegionMemory {
                        region_id: item.region_id,
                        access,
                    },
                )
                .await?
            {
                MsResponse::RegionMemory(info) => {
                    (info.keys.first().copied().unwrap_or(0), info.bases.first().copied().unwrap_or(0))
                }
                other => {
                    return Err(FamError::Memory(format!(
                        "unexpected ms response to get_region_memory: {other:?}"
                    )))
                }
            },
        };

        Ok(DataItemDescriptor {
            region_id: item.region_id,
            offset: item.offset,
            size: item.size,
            mode: item.mode,
            owner_uid: item.owner_uid,
            owner_gid: item.owner_gid,
            key,
            base,
            memserver_id,
        })
    }

    /// Resolves every extent the source range `[src_offset, src_offset +
    /// size)` touches and packs all of their keys, base addresses and
    /// on-extent offsets into one call to the destination memserver, which
    /// pulls the bytes over the fabric (spec.md §4.3's `copy`).
    pub async fn copy(
        &self,
        src_region_id: u64,
        src_offset: u64,
        dst_region_id: u64,
        dst_offset: u64,
        size: u64,
        uid: u32,
        gid: u32,
    ) -> FamResult<(u32, u64)> {
        let src_region = self.require_region(src_region_id, Op::Read, uid, gid).await?;
        let dst_region = self.require_region(dst_region_id, Op::Write, uid, gid).await?;

        let dst_memserver_id = dst_region.memservers[0];
        let access = AccessTypeWire::Read;

        let extents = layout::resolve_copy_extents(
            src_offset,
            size,
            src_region.interleave_size,
            src_region.memservers.len() as u64,
        );
        // submit_copy divides `size` evenly across every source entry, so
        // each entry is registered for an even share regardless of how many
        // interleave blocks actually merged into it.
        let chunk_size = size / extents.len().max(1) as u64;

        let mut src_keys = Vec::with_capacity(extents.len());
        let mut src_base_addrs = Vec::with_capacity(extents.len());
        let mut src_offsets = Vec::with_capacity(extents.len());
        let mut src_memserver_ids = Vec::with_capacity(extents.len());

        for &(extent_index, extent_offset, _) in &extents {
            let memserver_id = src_region.memservers[extent_index as usize];
            let (key, base) = match self
                .ms_call(
                    memserver_id,
                    MsRequest::GetDataitemMemory {
                        region_id: src_region_id,
                        offset: extent_offset,
                        size: chunk_size,
                        access,
                    },
                )
                .await?
            {
                MsResponse::DataitemMemory(info) => (info.key, info.base),
                other => {
                    return Err(FamError::Memory(format!(
                        "unexpected ms response to get_dataitem_memory: {other:?}"
                    )))
                }
            };
            src_keys.push(key);
            src_base_addrs.push(base);
            src_offsets.push(extent_offset);
            src_memserver_ids.push(memserver_id);
        }

        let handle = match self
            .ms_call(
                dst_memserver_id,
                MsRequest::Copy {
                    src_region_id,
                    src_offsets,
                    src_copy_start: 0,
                    src_copy_end: size,
                    src_keys,
                    src_base_addrs,
                    src_memserver_ids,
                    src_interleave_size: src_region.interleave_size,
                    dst_region_id,
                    dst_offset,
                    dst_interleave_size: dst_region.interleave_size,
                    size,
                },
            )
            .await?
        {
            MsResponse::JobHandle(handle) => handle,
            other => {
                return Err(FamError::Resource(format!(
                    "unexpected ms response to copy: {other:?}"
                )))
            }
        };

        Ok((dst_memserver_id, handle))
    }

    pub async fn wait_for_copy(&self, memserver_id: u32, handle: u64) -> FamResult<()> {
        match self
            .ms_call(memserver_id, MsRequest::WaitForCopy { handle })
            .await?
        {
            MsResponse::JobStatus(fam_rpc::messages::JobStatusWire::Failed) => {
                Err(FamError::Fabric(format!("copy job {handle} failed")))
            }
            MsResponse::JobStatus(_) => Ok(()),
            other => Err(FamError::Resource(format!(
                "unexpected ms response to wait_for_copy: {other:?}"
            ))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn backup(
        &self,
        region_id: u64,
        offset: u64,
        size: u64,
        item_name: Option<String>,
        backup_name: String,
        uid: u32,
        gid: u32,
        mode: u32,
    ) -> FamResult<()> {
        let region = self.require_region(region_id, Op::Read, uid, gid).await?;
        let leader = region.memservers[0];
        const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

        for (idx, &memserver_id) in region.memservers.iter().enumerate() {
            let handle = match self
                .ms_call(
                    memserver_id,
                    MsRequest::Backup {
                        region_id,
                        offset,
                        size,
                        chunk_size: DEFAULT_CHUNK_SIZE,
                        used_memserver_cnt: region.memservers.len() as u32,
                        file_start_pos: 0,
                        name: backup_name.clone(),
                        uid,
                        gid,
                        mode,
                        item_name: item_name.clone(),
                        item_size: size,
                        write_metadata: memserver_id == leader,
                    },
                )
                .await?
            {
                MsResponse::JobHandle(handle) => handle,
                other => {
                    return Err(FamError::Resource(format!(
                        "unexpected ms response to backup on memserver {idx}: {other:?}"
                    )))
                }
            };
            match self
                .ms_call(memserver_id, MsRequest::WaitForBackup { handle })
                .await?
            {
                MsResponse::JobStatus(fam_rpc::messages::JobStatusWire::Failed) => {
                    return Err(FamError::Fabric(format!(
                        "backup job {handle} on memserver {memserver_id} failed"
                    )))
                }
                MsResponse::JobStatus(_) => {}
                other => {
                    return Err(FamError::Resource(format!(
                        "unexpected ms response to wait_for_backup: {other:?}"
                    )))
                }
            }
        }
        Ok(())
    }

    pub async fn restore(
        &self,
        region_id: u64,
        offset: u64,
        backup_name: String,
        uid: u32,
        gid: u32,
    ) -> FamResult<()> {
        let region = self.require_region(region_id, Op::Write, uid, gid).await?;
        let leader = region.memservers[0];
        let info = match self
            .ms_call(leader, MsRequest::GetBackupInfo { name: backup_name.clone() })
            .await?
        {
            MsResponse::BackupInfo(info) => info,
            other => {
                return Err(FamError::NotFound(format!(
                    "unexpected ms response to get_backup_info: {other:?}"
                )))
            }
        };

        for &memserver_id in &region.memservers {
            let handle = match self
                .ms_call(
                    memserver_id,
                    MsRequest::Restore {
                        region_id,
                        offset,
                        size: info.size,
                        chunk_size: info.chunk_size,
                        used_memserver_cnt: info.used_memserver_cnt,
                        file_start_pos: 0,
                        name: backup_name.clone(),
                    },
                )
                .await?
            {
                MsResponse::JobHandle(handle) => handle,
                other => {
                    return Err(FamError::Resource(format!(
                        "unexpected ms response to restore: {other:?}"
                    )))
                }
            };
            match self
                .ms_call(memserver_id, MsRequest::WaitForRestore { handle })
                .await?
            {
                MsResponse::JobStatus(fam_rpc::messages::JobStatusWire::Failed) => {
                    return Err(FamError::Fabric(format!(
                        "restore job {handle} on memserver {memserver_id} failed"
                    )))
                }
                MsResponse::JobStatus(_) => {}
                other => {
                    return Err(FamError::Resource(format!(
                        "unexpected ms response to wait_for_restore: {other:?}"
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fam_ms::{LoopbackFabric, MemoryService, MemoryServiceConfig, MsHandler};
    use fam_mds::{MdsHandler, MdsService, MemStore};
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn spawn_mds(addr: &str) {
        let handler = Arc::new(MdsHandler::new(MdsService::new(Arc::new(MemStore::new()))));
        let addr = addr.to_string();
        tokio::spawn(async move {
            fam_rpc::serve(&addr, handler).await.unwrap();
        });
    }

    async fn spawn_ms(addr: &str, memserver_id: u32) {
        let dir = tempdir().unwrap();
        let fabric = LoopbackFabric::new();
        let config = MemoryServiceConfig {
            node_addr: addr.to_string(),
            memserver_id,
            backup_root: dir.path().to_path_buf(),
            num_consumer: 2,
            queue_depth: 32,
            async_jobs_enabled: true,
        };
        let service = MemoryService::new(config, fabric.clone()).unwrap();
        fabric.register_peer(service.node_addr().to_string(), service.clone());
        let handler = Arc::new(MsHandler::new(service));
        let addr = addr.to_string();
        tokio::spawn(async move {
            // Keep the backup directory alive for the lifetime of the
            // server task, not just this setup function.
            let _dir = dir;
            fam_rpc::serve(&addr, handler).await.unwrap();
        });
    }

    async fn wait_for_listener(addr: &str) {
        for _ in 0..200 {
            if tokio::net::TcpStream::connect(addr).await.is_ok() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("nothing listening on {addr}");
    }

    async fn new_cis(mds_addr: &str, ms_addrs: &[&str]) -> ClientInterfaceService {
        spawn_mds(mds_addr).await;
        for (idx, addr) in ms_addrs.iter().enumerate() {
            spawn_ms(addr, idx as u32).await;
        }
        wait_for_listener(mds_addr).await;
        for addr in ms_addrs {
            wait_for_listener(addr).await;
        }
        ClientInterfaceService::new(CisConfig {
            mds_addr: mds_addr.to_string(),
            ms_addrs: ms_addrs.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn create_destroy_round_trip() {
        let cis = new_cis("127.0.0.1:19801", &["127.0.0.1:19811"]).await;
        let region_id = cis
            .create_region(
                "r1".into(),
                4096,
                0o777,
                1000,
                100,
                false,
                4096,
                PermissionLevel::DataItem,
            )
            .await
            .unwrap();

        let desc = cis.lookup_region("r1".into(), 1000, 100).await.unwrap();
        assert_eq!(desc.region_id, region_id);
        assert_eq!(desc.size, 4096);

        cis.destroy_region(region_id, 1000, 100).await.unwrap();
        assert!(matches!(
            cis.lookup_region("r1".into(), 1000, 100).await,
            Err(FamError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn permission_enforced_on_allocate() {
        let cis = new_cis("127.0.0.1:19802", &["127.0.0.1:19812"]).await;
        let region_id = cis
            .create_region(
                "r2".into(),
                4096,
                0o444,
                1000,
                100,
                false,
                4096,
                PermissionLevel::DataItem,
            )
            .await
            .unwrap();

        let err = cis
            .allocate(region_id, Some("d1".into()), 1024, 0o444, 2000, 200)
            .await
            .unwrap_err();
        assert!(matches!(err, FamError::NoPermission(_)));

        cis.change_region_permission(region_id, 0o777, 1000)
            .await
            .unwrap();
        cis.allocate(region_id, Some("d1".into()), 1024, 0o444, 2000, 200)
            .await
            .unwrap();
    }
}
