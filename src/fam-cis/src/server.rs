//! RPC dispatch for the Client-Interface Service: same boundary convention
//! as `fam-mds`'s `MdsHandler` and `fam-ms`'s `MsHandler` — errors become
//! wire pairs only here, never inside `ClientInterfaceService`.

use async_trait::async_trait;
use fam_common::FamResult;
use fam_rpc::messages::{CisRequest, CisResponse};
use fam_rpc::RequestHandler;
use tracing::warn;

use crate::service::ClientInterfaceService;

pub struct CisHandler {
    service: ClientInterfaceService,
}

impl CisHandler {
    pub fn new(service: ClientInterfaceService) -> Self {
        CisHandler { service }
    }

    async fn dispatch(&self, request: CisRequest) -> FamResult<CisResponse> {
        use CisRequest::*;
        Ok(match request {
            CreateRegion {
                name,
                size,
                mode,
                uid,
                gid,
                redundancy_none: _,
                interleave_enable,
                interleave_size,
                permission_level,
            } => CisResponse::RegionId(
                self.service
                    .create_region(
                        name,
                        size,
                        mode,
                        uid,
                        gid,
                        interleave_enable,
                        interleave_size,
                        permission_level,
                    )
                    .await?,
            ),
            DestroyRegion { region_id, uid, gid } => {
                self.service.destroy_region(region_id, uid, gid).await?;
                CisResponse::Unit
            }
            Resize {
                region_id,
                new_size,
                uid,
                gid,
            } => {
                self.service.resize(region_id, new_size, uid, gid).await?;
                CisResponse::Unit
            }
            Allocate {
                region_id,
                name,
                size,
                mode,
                uid,
                gid,
            } => CisResponse::Offset(
                self.service
                    .allocate(region_id, name, size, mode, uid, gid)
                    .await?,
            ),
            Deallocate {
                region_id,
                offset,
                uid,
                gid,
            } => {
                self.service.deallocate(region_id, offset, uid, gid).await?;
                CisResponse::Unit
            }
            ChangeRegionPermission { region_id, mode, uid } => {
                self.service
                    .change_region_permission(region_id, mode, uid)
                    .await?;
                CisResponse::Unit
            }
            ChangeDataitemPermission {
                region_id,
                offset,
                mode,
                uid,
            } => {
                self.service
                    .change_dataitem_permission(region_id, offset, mode, uid)
                    .await?;
                CisResponse::Unit
            }
            Lookup {
                item_name,
                region_name,
                uid,
                gid,
            } => CisResponse::DataItem(
                self.service.lookup(item_name, region_name, uid, gid).await?,
            ),
            LookupRegion { name, uid, gid } => {
                CisResponse::Region(self.service.lookup_region(name, uid, gid).await?)
            }
            Copy {
                src_region_id,
                src_offset,
                dst_region_id,
                dst_offset,
                size,
                uid,
                gid,
            } => {
                let (memserver_id, handle) = self
                    .service
                    .copy(src_region_id, src_offset, dst_region_id, dst_offset, size, uid, gid)
                    .await?;
                CisResponse::CopyHandle { memserver_id, handle }
            }
            WaitForCopy { memserver_id, handle } => {
                self.service.wait_for_copy(memserver_id, handle).await?;
                CisResponse::Unit
            }
            Backup {
                region_id,
                offset,
                size,
                item_name,
                backup_name,
                uid,
                gid,
                mode,
            } => {
                self.service
                    .backup(region_id, offset, size, item_name, backup_name, uid, gid, mode)
                    .await?;
                CisResponse::Unit
            }
            Restore {
                region_id,
                offset,
                backup_name,
                uid,
                gid,
            } => {
                self.service
                    .restore(region_id, offset, backup_name, uid, gid)
                    .await?;
                CisResponse::Unit
            }
        })
    }
}

#[async_trait]
impl RequestHandler<CisRequest, CisResponse> for CisHandler {
    async fn handle(&self, request: CisRequest) -> CisResponse {
        match self.dispatch(request).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "cis request failed");
                let (code, message) = err.into_wire();
                CisResponse::Error(code, message)
            }
        }
    }
}
