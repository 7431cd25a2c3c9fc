//! RPC dispatch for the Metadata Service: translates each `MdsRequest`
//! variant into a `MdsService` call and folds the `Result` into the
//! `MdsResponse::Error` wire variant (SPEC_FULL.md §7 — errors only become
//! wire pairs at this boundary, never inside `MdsService`).

use async_trait::async_trait;
use fam_common::FamResult;
use fam_rpc::messages::{MdsRequest, MdsResponse};
use fam_rpc::RequestHandler;
use tracing::warn;

use crate::service::MdsService;

pub struct MdsHandler {
    service: MdsService,
}

impl MdsHandler {
    pub fn new(service: MdsService) -> Self {
        MdsHandler { service }
    }

    fn dispatch(&self, request: MdsRequest) -> FamResult<MdsResponse> {
        use MdsRequest::*;
        Ok(match request {
            CreateRegionMeta {
                name,
                size,
                mode,
                uid,
                gid,
                permission_level,
                interleave_enable,
                interleave_size,
                memservers,
            } => MdsResponse::RegionId(self.service.create_region_meta(
                name,
                size,
                mode,
                uid,
                gid,
                permission_level,
                interleave_enable,
                interleave_size,
                memservers,
            )?),
            DestroyRegionMeta { region_id } => {
                self.service.destroy_region_meta(region_id)?;
                MdsResponse::Unit
            }
            ResizeRegionMeta { region_id, new_size } => {
                self.service.resize_region_meta(region_id, new_size)?;
                MdsResponse::Unit
            }
            AllocateMeta {
                region_id,
                offset,
                size,
                name,
                mode,
                uid,
                gid,
            } => {
                self.service
                    .allocate_meta(region_id, offset, size, name, mode, uid, gid)?;
                MdsResponse::Unit
            }
            DeallocateMeta { region_id, offset } => {
                self.service.deallocate_meta(region_id, offset)?;
                MdsResponse::Unit
            }
            ChangeRegionPermission {
                region_id,
                mode,
                caller_uid,
            } => {
                self.service
                    .change_region_permission(region_id, mode, caller_uid)?;
                MdsResponse::Unit
            }
            ChangeDataitemPermission {
                region_id,
                offset,
                mode,
                caller_uid,
            } => {
                self.service
                    .change_dataitem_permission(region_id, offset, mode, caller_uid)?;
                MdsResponse::Unit
            }
            LookupRegion { name } => MdsResponse::RegionMeta(self.service.lookup_region(&name)?),
            Lookup {
                item_name,
                region_name,
            } => MdsResponse::DataItemMeta(self.service.lookup(&item_name, &region_name)?),
            GetRegion { region_id } => MdsResponse::RegionMeta(self.service.get_region(region_id)?),
            GetDataitem { region_id, offset } => {
                MdsResponse::DataItemMeta(self.service.get_dataitem(region_id, offset)?)
            }
            CheckRegionPermission {
                region_id,
                op,
                uid,
                gid,
            } => {
                let region = self.service.get_region(region_id)?;
                MdsResponse::Permitted(MdsService::check_region_permission(
                    &region,
                    op.into(),
                    uid,
                    gid,
                ))
            }
            CheckDataitemPermission {
                region_id,
                offset,
                op,
                uid,
                gid,
            } => {
                let item = self.service.get_dataitem(region_id, offset)?;
                MdsResponse::Permitted(MdsService::check_dataitem_permission(
                    &item,
                    op.into(),
                    uid,
                    gid,
                ))
            }
            GetMemserverList { region_id } => {
                MdsResponse::MemserverList(self.service.get_memserver_list(region_id)?)
            }
            NextAllocCursor { region_id } => {
                MdsResponse::Cursor(self.service.next_alloc_cursor(region_id))
            }
        })
    }
}

#[async_trait]
impl RequestHandler<MdsRequest, MdsResponse> for MdsHandler {
    async fn handle(&self, request: MdsRequest) -> MdsResponse {
        match self.dispatch(request) {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "mds request failed");
                let (code, message) = err.into_wire();
                MdsResponse::Error(code, message)
            }
        }
    }
}
