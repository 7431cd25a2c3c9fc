//! RPC dispatch for the Memory Service: translates each `MsRequest` variant
//! into a `MemoryService` call, same boundary convention as `fam-mds`'s
//! `MdsHandler` (errors become wire pairs only here).

use std::sync::Arc;

use async_trait::async_trait;
use fam_common::FamResult;
use fam_rpc::messages::{
    DataitemMemoryInfo, MsRequest, MsResponse, RegionMemoryInfo, ResourceStatusWire,
};
use fam_rpc::RequestHandler;
use tracing::warn;

use crate::resource::ResourceStatus;
use crate::service::MemoryService;

pub struct MsHandler {
    service: Arc<MemoryService>,
}

impl MsHandler {
    pub fn new(service: Arc<MemoryService>) -> Self {
        MsHandler { service }
    }

    fn wire_status(status: ResourceStatus) -> ResourceStatusWire {
        match status {
            ResourceStatus::Inactive => ResourceStatusWire::Inactive,
            ResourceStatus::Busy => ResourceStatusWire::Busy,
            ResourceStatus::Active => ResourceStatusWire::Active,
            ResourceStatus::Released => ResourceStatusWire::Released,
        }
    }

    async fn dispatch(&self, request: MsRequest) -> FamResult<MsResponse> {
        use MsRequest::*;
        Ok(match request {
            CreateRegion {
                region_id,
                size,
                permission_level,
            } => {
                self.service.create_region(region_id, size, permission_level)?;
                MsResponse::Unit
            }
            DestroyRegion { region_id } => {
                let status = self.service.destroy_region(region_id)?;
                MsResponse::ResourceStatus(Self::wire_status(status))
            }
            ResizeRegion { region_id, new_size } => {
                self.service.resize_region(region_id, new_size)?;
                MsResponse::Unit
            }
            Allocate { region_id, size } => {
                MsResponse::Offset(self.service.allocate(region_id, size)?)
            }
            Deallocate { region_id, offset } => {
                self.service.deallocate(region_id, offset)?;
                MsResponse::Unit
            }
            GetLocalPointerDebug { region_id, offset } => {
                MsResponse::Addr(self.service.get_local_pointer(region_id, offset)?)
            }
            OpenRegionWithRegistration { region_id, access } => {
                let (keys, bases) = self
                    .service
                    .open_region_with_registration(region_id, access)?;
                MsResponse::RegionMemory(RegionMemoryInfo { keys, bases })
            }
            OpenRegionWithoutRegistration { region_id } => {
                self.service.open_region_without_registration(region_id)?;
                MsResponse::Unit
            }
            CloseRegion { region_id } => {
                let status = self.service.close_region(region_id)?;
                MsResponse::ResourceStatus(Self::wire_status(status))
            }
            GetRegionMemory { region_id, access } => {
                let (keys, bases) = self.service.get_region_memory(region_id, access)?;
                MsResponse::RegionMemory(RegionMemoryInfo { keys, bases })
            }
            GetDataitemMemory {
                region_id,
                offset,
                size,
                access,
            } => {
                let (key, base) = self
                    .service
                    .get_dataitem_memory(region_id, offset, size, access)?;
                MsResponse::DataitemMemory(DataitemMemoryInfo { key, base })
            }
            RegisterRegionMemory { region_id, access } => {
                self.service.register_region_memory(region_id, access)?;
                MsResponse::Unit
            }
            UpdateMemserverAddrlist { addrs } => {
                self.service.update_memserver_addrlist(addrs);
                MsResponse::Unit
            }
            GetAtomic {
                region_id,
                offset,
                size,
                dst_base_addr,
                dst_key,
                dst_node_addr,
            } => {
                self.service
                    .fabric_get(region_id, offset, size, &dst_node_addr, dst_key, dst_base_addr)
                    .await?;
                MsResponse::Unit
            }
            PutAtomic {
                region_id,
                offset,
                size,
                src_base_addr,
                src_key,
                src_node_addr,
            } => {
                self.service
                    .fabric_put(region_id, offset, size, &src_node_addr, src_key, src_base_addr)
                    .await?;
                MsResponse::Unit
            }
            RmwAtomic {
                region_id,
                offset,
                op,
                operand,
                compare,
            } => MsResponse::NumericValue(
                self.service.rmw_atomic(region_id, offset, op, operand, compare)?,
            ),
            Copy {
                src_offsets,
                src_keys,
                src_base_addrs,
                src_memserver_ids,
                dst_region_id,
                dst_offset,
                size,
                ..
            } => {
                let handle = self.service.submit_copy(
                    dst_region_id,
                    dst_offset,
                    src_memserver_ids,
                    src_keys,
                    src_base_addrs,
                    src_offsets,
                    size,
                )?;
                MsResponse::JobHandle(handle.id())
            }
            WaitForCopy { handle } | WaitForBackup { handle } | WaitForRestore { handle } => {
                MsResponse::JobStatus(self.service.wait_for_job(handle)?.status())
            }
            Backup {
                region_id,
                offset,
                size,
                chunk_size,
                used_memserver_cnt,
                name,
                uid,
                gid,
                mode,
                item_name,
                write_metadata,
                ..
            } => {
                let handle = self.service.submit_backup(
                    region_id,
                    offset,
                    size,
                    chunk_size,
                    name,
                    uid,
                    gid,
                    mode,
                    item_name,
                    used_memserver_cnt,
                    write_metadata,
                )?;
                MsResponse::JobHandle(handle.id())
            }
            Restore {
                region_id,
                offset,
                size,
                chunk_size,
                name,
                ..
            } => {
                let handle = self
                    .service
                    .submit_restore(region_id, offset, size, chunk_size, name)?;
                MsResponse::JobHandle(handle.id())
            }
            GetBackupInfo { name } => MsResponse::BackupInfo(self.service.get_backup_info(&name)?),
            ListBackup { name, uid, gid, .. } => {
                MsResponse::BackupList(self.service.list_backup(&name, uid, gid)?)
            }
            DeleteBackup { name } => {
                self.service.delete_backup(&name)?;
                MsResponse::Unit
            }
            AcquireCasLock { offset } => {
                self.service.acquire_cas_lock(offset)?;
                MsResponse::Unit
            }
            ReleaseCasLock { offset } => {
                self.service.release_cas_lock(offset)?;
                MsResponse::Unit
            }
        })
    }
}

#[async_trait]
impl RequestHandler<MsRequest, MsResponse> for MsHandler {
    async fn handle(&self, request: MsRequest) -> MsResponse {
        match self.dispatch(request).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "ms request failed");
                let (code, message) = err.into_wire();
                MsResponse::Error(code, message)
            }
        }
    }
}
