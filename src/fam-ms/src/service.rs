//! The Memory Service's public contract (spec.md §4.1): per-node heaps,
//! fabric registration, the resource state machine, server-executed
//! atomics, and async copy/backup/restore, wired together.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fam_common::keys::{dataitem_id, decode_access_key, generate_access_key, AccessType};
use fam_common::model::PermissionLevel;
use fam_common::permission::{Mode, Op};
use fam_common::{FamError, FamResult};
use fam_rpc::messages::{AccessTypeWire, AtomicOp, BackupInfo, NumericValue};
use parking_lot::RwLock;

use crate::async_jobs::{AsyncJobQueue, WaitHandle};
use crate::atomics::{apply_rmw, CasLockArray, ExplicitLockTable};
use crate::backup::{BackupMetadata, BackupStore};
use crate::fabric::{FabricProvider, FabricTarget};
use crate::heap::{Heap, MappedHeap};
use crate::resource::{ResourceStatus, ResourceTable};

fn to_internal_access(access: AccessTypeWire) -> AccessType {
    match access {
        AccessTypeWire::Read => AccessType::Read,
        AccessTypeWire::ReadWrite => AccessType::ReadWrite,
    }
}

pub struct MemoryServiceConfig {
    pub node_addr: String,
    pub memserver_id: u32,
    pub backup_root: PathBuf,
    pub num_consumer: usize,
    pub queue_depth: usize,
    pub async_jobs_enabled: bool,
}

pub struct MemoryService {
    config: MemoryServiceConfig,
    heaps: RwLock<HashMap<u64, Arc<MappedHeap>>>,
    permission_levels: RwLock<HashMap<u64, PermissionLevel>>,
    resources: ResourceTable,
    cas_locks: CasLockArray,
    explicit_locks: ExplicitLockTable,
    fabric: Arc<dyn FabricProvider>,
    jobs: Arc<AsyncJobQueue>,
    backups: BackupStore,
    peer_addrs: RwLock<HashMap<u32, String>>,
}

impl MemoryService {
    pub fn new(config: MemoryServiceConfig, fabric: Arc<dyn FabricProvider>) -> FamResult<Arc<Self>> {
        let backups = BackupStore::new(&config.backup_root)?;
        let jobs = AsyncJobQueue::new(
            config.num_consumer,
            config.queue_depth,
            config.async_jobs_enabled,
        );
        Ok(Arc::new(MemoryService {
            config,
            heaps: RwLock::new(HashMap::new()),
            permission_levels: RwLock::new(HashMap::new()),
            resources: ResourceTable::new(256),
            cas_locks: CasLockArray::new(),
            explicit_locks: ExplicitLockTable::new(),
            fabric,
            jobs,
            backups,
            peer_addrs: RwLock::new(HashMap::new()),
        }))
    }

    fn heap(&self, region_id: u64) -> FamResult<Arc<MappedHeap>> {
        self.heaps
            .read()
            .get(&region_id)
            .cloned()
            .ok_or_else(|| FamError::NotFound(format!("region {region_id} has no local heap")))
    }

    pub fn create_region(
        &self,
        region_id: u64,
        size: u64,
        permission_level: PermissionLevel,
    ) -> FamResult<()> {
        if self.heaps.read().contains_key(&region_id) {
            return Err(FamError::AlreadyExists(format!(
                "region {region_id} already has a local heap"
            )));
        }
        let heap = Arc::new(MappedHeap::volatile(format!("region-{region_id}"), size));
        self.heaps.write().insert(region_id, heap);
        self.permission_levels.write().insert(region_id, permission_level);
        Ok(())
    }

    fn permission_level(&self, region_id: u64) -> FamResult<PermissionLevel> {
        self.permission_levels
            .read()
            .get(&region_id)
            .copied()
            .ok_or_else(|| FamError::NotFound(format!("region {region_id} has no local heap")))
    }

    pub fn destroy_region(&self, region_id: u64) -> FamResult<ResourceStatus> {
        let status = self
            .resources
            .get(region_id)
            .map(|r| r.status())
            .unwrap_or(ResourceStatus::Inactive);
        self.heaps
            .write()
            .remove(&region_id)
            .ok_or_else(|| FamError::NotFound(format!("region {region_id}")))?;
        self.permission_levels.write().remove(&region_id);
        self.resources.remove(region_id);
        Ok(status)
    }

    pub fn resize_region(&self, region_id: u64, new_size: u64) -> FamResult<()> {
        self.heap(region_id)?.resize(new_size)
    }

    pub fn allocate(&self, region_id: u64, size: u64) -> FamResult<u64> {
        self.heap(region_id)?.alloc(size)
    }

    /// Deallocation is deferred if the slot's registration is still live
    /// (spec.md §4.1): marking deallocated is a per-slot CAS-style flag, so a
    /// repeat `deallocate` on an already-marked slot is a no-op success, not
    /// an error (see DESIGN.md's resolution of the open question).
    pub fn deallocate(&self, region_id: u64, offset: u64) -> FamResult<()> {
        if let Some(resource) = self.resources.get(region_id) {
            if resource.permission_level == PermissionLevel::DataItem {
                let item_id = dataitem_id(offset);
                let key_r = generate_access_key(region_id, item_id, AccessType::Read);
                let key_rw = generate_access_key(region_id, item_id, AccessType::ReadWrite);
                let still_registered = resource
                    .registrations()
                    .iter()
                    .any(|r| (r.key == key_r || r.key == key_rw) && !r.deallocated);
                if still_registered {
                    resource.mark_deallocated(key_r);
                    resource.mark_deallocated(key_rw);
                    return Ok(());
                }
            }
        }
        self.heap(region_id)?.free(offset)
    }

    pub fn get_local_pointer(&self, region_id: u64, offset: u64) -> FamResult<u64> {
        self.heap(region_id)?;
        Ok(offset)
    }

    pub fn update_memserver_addrlist(&self, addrs: Vec<(u32, String)>) {
        let mut map = self.peer_addrs.write();
        for (id, addr) in addrs {
            map.insert(id, addr);
        }
    }

    fn sub_id_for(&self, permission_level: PermissionLevel, offset: u64, extent_index: u64) -> u64 {
        match permission_level {
            PermissionLevel::Region => extent_index,
            PermissionLevel::DataItem => dataitem_id(offset),
        }
    }

    pub fn register_region_memory(&self, region_id: u64, access: AccessTypeWire) -> FamResult<()> {
        let heap = self.heap(region_id)?;
        let permission_level = self.permission_level(region_id)?;
        let access = to_internal_access(access);
        let resource = self
            .resources
            .get(region_id)
            .ok_or_else(|| FamError::Resource(format!("region {region_id} is not open")))?;

        if !resource.registrations().is_empty() {
            return Ok(());
        }

        for (extent_index, (base, size)) in heap.get_extents().into_iter().enumerate() {
            let sub_id = self.sub_id_for(permission_level, base, extent_index as u64);
            let key = generate_access_key(region_id, sub_id, access);
            self.fabric.register_mr(key, base, size)?;
            resource.insert_registration(key, base);
        }
        Ok(())
    }

    pub fn open_region_with_registration(
        &self,
        region_id: u64,
        access: AccessTypeWire,
    ) -> FamResult<(Vec<u64>, Vec<u64>)> {
        let permission_level = self.permission_level(region_id)?;
        let (_, resource) = self.resources.open(region_id, permission_level, true, |_| {
            self.register_region_memory(region_id, access)
        })?;
        let regs = resource.registrations();
        Ok((regs.iter().map(|r| r.key).collect(), regs.iter().map(|r| r.base_addr).collect()))
    }

    pub fn open_region_without_registration(&self, region_id: u64) -> FamResult<u64> {
        self.heap(region_id)?;
        let permission_level = self.permission_level(region_id)?;
        let (rc, _) = self
            .resources
            .open(region_id, permission_level, false, |_| Ok(()))?;
        Ok(rc)
    }

    pub fn close_region(&self, region_id: u64) -> FamResult<ResourceStatus> {
        let heap = self.heap(region_id).ok();
        self.resources.close(region_id, |resource| {
            for reg in resource.registrations() {
                self.fabric.deregister_mr(reg.key)?;
                if reg.deallocated {
                    if let Some(heap) = &heap {
                        let (_, sub_id, _) = decode_access_key(reg.key);
                        let _ = heap.free(fam_common::keys::offset_from_dataitem_id(sub_id));
                    }
                }
            }
            Ok(())
        })
    }

    pub fn get_region_memory(
        &self,
        region_id: u64,
        access: AccessTypeWire,
    ) -> FamResult<(Vec<u64>, Vec<u64>)> {
        let _ = access;
        let resource = self
            .resources
            .get(region_id)
            .ok_or_else(|| FamError::NotFound(format!("region {region_id} is not registered")))?;
        let regs = resource.registrations();
        Ok((regs.iter().map(|r| r.key).collect(), regs.iter().map(|r| r.base_addr).collect()))
    }

    pub fn get_dataitem_memory(
        &self,
        region_id: u64,
        offset: u64,
        size: u64,
        access: AccessTypeWire,
    ) -> FamResult<(u64, u64)> {
        let heap = self.heap(region_id)?;
        let resource = self
            .resources
            .get(region_id)
            .ok_or_else(|| FamError::Resource(format!("region {region_id} is not open")))?;
        let access = to_internal_access(access);
        let sub_id = dataitem_id(offset);
        let key = generate_access_key(region_id, sub_id, access);
        if let Some(existing) = resource.registrations().iter().find(|r| r.key == key) {
            return Ok((existing.key, existing.base_addr));
        }
        self.fabric.register_mr(key, offset, size)?;
        resource.insert_registration(key, offset);
        let _ = heap;
        Ok((key, offset))
    }

    pub fn acquire_cas_lock(&self, offset: u64) -> FamResult<()> {
        self.explicit_locks.acquire(offset)
    }

    pub fn release_cas_lock(&self, offset: u64) -> FamResult<()> {
        self.explicit_locks.release(offset);
        Ok(())
    }

    pub fn rmw_atomic(
        &self,
        region_id: u64,
        offset: u64,
        op: AtomicOp,
        operand: NumericValue,
        compare: Option<NumericValue>,
    ) -> FamResult<NumericValue> {
        let heap = self.heap(region_id)?;
        let width = numeric_width(operand);
        self.cas_locks.with_lock(offset, || -> FamResult<NumericValue> {
            let bytes = heap.read(offset, width as u64)?;
            let current = decode_numeric(&bytes, operand)?;
            let (previous, new_value) = apply_rmw(current, op, operand, compare)?;
            heap.write(offset, &encode_numeric(new_value))?;
            Ok(previous)
        })
    }

    pub async fn fabric_get(
        &self,
        region_id: u64,
        offset: u64,
        size: u64,
        dst_node_addr: &str,
        dst_key: u64,
        dst_base_addr: u64,
    ) -> FamResult<()> {
        let heap = self.heap(region_id)?;
        let data = heap.read(offset, size)?;
        self.fabric
            .write_at(dst_node_addr, dst_key, dst_base_addr, &data)
            .await
    }

    pub async fn fabric_put(
        &self,
        region_id: u64,
        offset: u64,
        size: u64,
        src_node_addr: &str,
        src_key: u64,
        src_base_addr: u64,
    ) -> FamResult<()> {
        let heap = self.heap(region_id)?;
        let data = self
            .fabric
            .read_at(src_node_addr, src_key, src_base_addr, size)
            .await?;
        heap.write(offset, &data)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit_copy(
        self: &Arc<Self>,
        dst_region_id: u64,
        dst_offset: u64,
        src_memserver_ids: Vec<u32>,
        src_keys: Vec<u64>,
        src_base_addrs: Vec<u64>,
        src_offsets: Vec<u64>,
        size: u64,
    ) -> FamResult<Arc<WaitHandle>> {
        let service = self.clone();
        let peer_addrs = self.peer_addrs.read().clone();
        self.jobs.submit(async move {
            let dst_heap = service.heap(dst_region_id)?;
            let mut buf = Vec::with_capacity(size as usize);
            for (i, memserver_id) in src_memserver_ids.iter().enumerate() {
                let node_addr = peer_addrs
                    .get(memserver_id)
                    .ok_or_else(|| FamError::Fabric(format!("unknown memserver {memserver_id}")))?;
                let chunk = service
                    .fabric
                    .read_at(node_addr, src_keys[i], src_offsets[i], size / src_memserver_ids.len() as u64)
                    .await?;
                buf.extend_from_slice(&chunk);
            }
            let _ = src_base_addrs;
            dst_heap.write(dst_offset, &buf)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit_backup(
        self: &Arc<Self>,
        region_id: u64,
        offset: u64,
        size: u64,
        chunk_size: u64,
        name: String,
        uid: u32,
        gid: u32,
        mode: u32,
        item_name: Option<String>,
        used_memserver_cnt: u32,
        write_metadata: bool,
    ) -> FamResult<Arc<WaitHandle>> {
        let service = self.clone();
        self.jobs.submit(async move {
            let heap = service.heap(region_id)?;
            let data = heap.read(offset, size)?;
            let chunk_size = chunk_size.max(1);
            for (i, chunk) in data.chunks(chunk_size as usize).enumerate() {
                service.backups.write_chunk(&name, i as u64, chunk)?;
            }
            if write_metadata {
                service.backups.write_metadata(&BackupMetadata {
                    name,
                    size,
                    mode,
                    uid,
                    gid,
                    chunk_size,
                    used_memserver_cnt,
                    item_name,
                })?;
            }
            Ok(())
        })
    }

    pub fn submit_restore(
        self: &Arc<Self>,
        region_id: u64,
        offset: u64,
        size: u64,
        chunk_size: u64,
        name: String,
    ) -> FamResult<Arc<WaitHandle>> {
        let service = self.clone();
        self.jobs.submit(async move {
            let heap = service.heap(region_id)?;
            let chunk_size = chunk_size.max(1);
            let num_chunks = size.div_ceil(chunk_size);
            let mut buf = Vec::with_capacity(size as usize);
            for i in 0..num_chunks {
                let chunk = service.backups.read_chunk(&name, i)?;
                buf.extend_from_slice(&chunk);
            }
            buf.truncate(size as usize);
            heap.write(offset, &buf)
        })
    }

    pub fn wait_for_job(&self, handle_id: u64) -> FamResult<Arc<WaitHandle>> {
        self.jobs.get(handle_id)
    }

    pub fn get_backup_info(&self, name: &str) -> FamResult<BackupInfo> {
        let meta = self.backups.read_metadata(name)?;
        Ok(BackupInfo {
            name: meta.name,
            size: meta.size,
            mode: meta.mode,
            uid: meta.uid,
            gid: meta.gid,
            chunk_size: meta.chunk_size,
            used_memserver_cnt: meta.used_memserver_cnt,
        })
    }

    /// Only backups `(uid, gid)` has read permission on are returned
    /// (spec.md §4.1: "reads/enumerates/removes backup metadata with
    /// permission enforcement").
    pub fn list_backup(&self, prefix: &str, uid: u32, gid: u32) -> FamResult<Vec<BackupInfo>> {
        Ok(self
            .backups
            .list(prefix)?
            .into_iter()
            .filter(|meta| Mode(meta.mode).allows(Op::Read, meta.uid, meta.gid, uid, gid))
            .map(|meta| BackupInfo {
                name: meta.name,
                size: meta.size,
                mode: meta.mode,
                uid: meta.uid,
                gid: meta.gid,
                chunk_size: meta.chunk_size,
                used_memserver_cnt: meta.used_memserver_cnt,
            })
            .collect())
    }

    pub fn delete_backup(&self, name: &str) -> FamResult<()> {
        self.backups.delete(name)
    }

    pub fn node_addr(&self) -> &str {
        &self.config.node_addr
    }
}

#[async_trait]
impl FabricTarget for MemoryService {
    async fn fabric_read(&self, key: u64, offset: u64, len: u64) -> FamResult<Vec<u8>> {
        let (region_id, _, _) = decode_access_key(key);
        self.heap(region_id)?.read(offset, len)
    }

    async fn fabric_write(&self, key: u64, offset: u64, data: &[u8]) -> FamResult<()> {
        let (region_id, _, _) = decode_access_key(key);
        self.heap(region_id)?.write(offset, data)
    }
}

fn numeric_width(value: NumericValue) -> usize {
    match value {
        NumericValue::I32(_) | NumericValue::U32(_) | NumericValue::F32(_) => 4,
        NumericValue::I64(_) | NumericValue::U64(_) | NumericValue::F64(_) => 8,
    }
}

fn decode_numeric(bytes: &[u8], shape: NumericValue) -> FamResult<NumericValue> {
    let err = || FamError::OutOfRange("short read decoding numeric atomic slot".to_string());
    Ok(match shape {
        NumericValue::I32(_) => {
            NumericValue::I32(i32::from_le_bytes(bytes.try_into().map_err(|_| err())?))
        }
        NumericValue::U32(_) => {
            NumericValue::U32(u32::from_le_bytes(bytes.try_into().map_err(|_| err())?))
        }
        NumericValue::I64(_) => {
            NumericValue::I64(i64::from_le_bytes(bytes.try_into().map_err(|_| err())?))
        }
        NumericValue::U64(_) => {
            NumericValue::U64(u64::from_le_bytes(bytes.try_into().map_err(|_| err())?))
        }
        NumericValue::F32(_) => {
            NumericValue::F32(f32::from_le_bytes(bytes.try_into().map_err(|_| err())?))
        }
        NumericValue::F64(_) => {
            NumericValue::F64(f64::from_le_bytes(bytes.try_into().map_err(|_| err())?))
        }
    })
}

fn encode_numeric(value: NumericValue) -> Vec<u8> {
    match value {
        NumericValue::I32(v) => v.to_le_bytes().to_vec(),
        NumericValue::U32(v) => v.to_le_bytes().to_vec(),
        NumericValue::I64(v) => v.to_le_bytes().to_vec(),
        NumericValue::U64(v) => v.to_le_bytes().to_vec(),
        NumericValue::F32(v) => v.to_le_bytes().to_vec(),
        NumericValue::F64(v) => v.to_le_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::LoopbackFabric;

    fn new_service(addr: &str, tmp: &std::path::Path) -> Arc<MemoryService> {
        MemoryService::new(
            MemoryServiceConfig {
                node_addr: addr.to_string(),
                memserver_id: 0,
                backup_root: tmp.to_path_buf(),
                num_consumer: 2,
                queue_depth: 32,
                async_jobs_enabled: true,
            },
            LoopbackFabric::new(),
        )
        .unwrap()
    }

    #[test]
    fn create_then_allocate_then_deallocate() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = new_service("n1", tmp.path());
        svc.create_region(1, 4096, PermissionLevel::DataItem).unwrap();
        let off = svc.allocate(1, 128).unwrap();
        svc.deallocate(1, off).unwrap();
        let off2 = svc.allocate(1, 128).unwrap();
        assert_eq!(off, off2);
    }

    #[test]
    fn duplicate_create_region_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = new_service("n1", tmp.path());
        svc.create_region(1, 4096, PermissionLevel::DataItem).unwrap();
        assert!(matches!(
            svc.create_region(1, 4096, PermissionLevel::DataItem),
            Err(FamError::AlreadyExists(_))
        ));
    }

    #[test]
    fn rmw_fetch_add_under_cas_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = new_service("n1", tmp.path());
        svc.create_region(1, 4096, PermissionLevel::DataItem).unwrap();
        let off = svc.allocate(1, 8).unwrap();
        svc.heap(1).unwrap().write(off, &0u64.to_le_bytes()).unwrap();

        for _ in 0..10 {
            svc.rmw_atomic(1, off, AtomicOp::FetchAdd, NumericValue::U64(1), None)
                .unwrap();
        }
        let bytes = svc.heap(1).unwrap().read(off, 8).unwrap();
        assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), 10);
    }

    #[tokio::test]
    async fn backup_then_restore_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = new_service("n1", tmp.path());
        svc.create_region(1, 4096, PermissionLevel::DataItem).unwrap();
        let off = svc.allocate(1, 64).unwrap();
        svc.heap(1).unwrap().write(off, &[7u8; 64]).unwrap();

        let handle = svc
            .submit_backup(1, off, 64, 32, "b1".to_string(), 1, 1, 0o640, None, 1, true)
            .unwrap();
        handle.wait().await.unwrap();

        let off2 = svc.allocate(1, 64).unwrap();
        let handle2 = svc.submit_restore(1, off2, 64, 32, "b1".to_string()).unwrap();
        handle2.wait().await.unwrap();

        assert_eq!(svc.heap(1).unwrap().read(off2, 64).unwrap(), vec![7u8; 64]);
    }

    #[test]
    fn acquire_cas_lock_blocks_until_released() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = new_service("n1", tmp.path());
        svc.acquire_cas_lock(128).unwrap();
        assert!(matches!(
            svc.acquire_cas_lock(128),
            Err(FamError::Resource(_))
        ));
        svc.release_cas_lock(128).unwrap();
        assert!(svc.acquire_cas_lock(128).is_ok());
    }

    #[tokio::test]
    async fn fabric_get_pulls_bytes_from_a_peer_memory_service() {
        let fabric = LoopbackFabric::new();
        let tmp_a = tempfile::tempdir().unwrap();
        let tmp_b = tempfile::tempdir().unwrap();

        let svc_a = MemoryService::new(
            MemoryServiceConfig {
                node_addr: "node-a".to_string(),
                memserver_id: 0,
                backup_root: tmp_a.path().to_path_buf(),
                num_consumer: 1,
                queue_depth: 16,
                async_jobs_enabled: true,
            },
            fabric.clone(),
        )
        .unwrap();
        let svc_b = MemoryService::new(
            MemoryServiceConfig {
                node_addr: "node-b".to_string(),
                memserver_id: 1,
                backup_root: tmp_b.path().to_path_buf(),
                num_consumer: 1,
                queue_depth: 16,
                async_jobs_enabled: true,
            },
            fabric.clone(),
        )
        .unwrap();
        fabric.register_peer("node-a", svc_a.clone());
        fabric.register_peer("node-b", svc_b.clone());

        svc_a.create_region(1, 4096, PermissionLevel::DataItem).unwrap();
        svc_b.create_region(1, 4096, PermissionLevel::DataItem).unwrap();
        let off = svc_a.allocate(1, 64).unwrap();
        svc_a.heap(1).unwrap().write(off, &[9u8; 64]).unwrap();

        let dst_key = generate_access_key(1, dataitem_id(off), AccessType::ReadWrite);
        svc_a
            .fabric_get(1, off, 64, "node-b", dst_key, off)
            .await
            .unwrap();

        assert_eq!(svc_b.heap(1).unwrap().read(off, 64).unwrap(), vec![9u8; 64]);
    }
}
