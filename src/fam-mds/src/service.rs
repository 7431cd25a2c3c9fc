//! The Metadata Service's public contract (spec.md §4.2): a synchronous,
//! single-ACID-operation-per-call service over the opaque ordered map in
//! `store`. No call here suspends or leaves a partial state; every failure
//! is either "nothing happened" or a fully-applied write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use fam_common::constants::{is_power_of_two, MAX_NAME_LEN};
use fam_common::model::{DataItemMeta, PermissionLevel, RegionMeta};
use fam_common::permission::{Mode, Op};
use fam_common::{FamError, FamResult};

use crate::store::{
    item_key, item_name_key, item_prefix, region_key, region_name_key, OrderedStore,
};

pub struct MdsService {
    store: Arc<dyn OrderedStore>,
    next_region_id: AtomicU64,
    /// Per-region cursor the CIS advances on every fresh allocation into a
    /// REGION-permission-level region, so allocations round-robin across the
    /// region's memservers (spec.md §4.3) instead of always landing on the
    /// first one.
    alloc_cursors: Mutex<HashMap<u64, u64>>,
}

impl MdsService {
    pub fn new(store: Arc<dyn OrderedStore>) -> Self {
        MdsService {
            store,
            next_region_id: AtomicU64::new(1),
            alloc_cursors: Mutex::new(HashMap::new()),
        }
    }

    fn check_name(name: &str) -> FamResult<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(FamError::NameTooLong(format!(
                "name '{name}' exceeds {MAX_NAME_LEN} bytes"
            )));
        }
        Ok(())
    }

    fn load_region(&self, region_id: u64) -> FamResult<RegionMeta> {
        let bytes = self
            .store
            .get(&region_key(region_id))
            .ok_or_else(|| FamError::NotFound(format!("region {region_id}")))?;
        bincode::deserialize(&bytes)
            .map_err(|e| FamError::Metadata(format!("corrupt region record: {e}")))
    }

    fn save_region(&self, meta: &RegionMeta) -> FamResult<()> {
        let bytes = bincode::serialize(meta)
            .map_err(|e| FamError::Metadata(format!("encode region record: {e}")))?;
        self.store.put(&region_key(meta.region_id), bytes);
        Ok(())
    }

    fn load_item(&self, region_id: u64, offset: u64) -> FamResult<DataItemMeta> {
        let bytes = self
            .store
            .get(&item_key(region_id, offset))
            .ok_or_else(|| FamError::NotFound(format!("dataitem {region_id}:{offset}")))?;
        bincode::deserialize(&bytes)
            .map_err(|e| FamError::Metadata(format!("corrupt dataitem record: {e}")))
    }

    fn save_item(&self, meta: &DataItemMeta) -> FamResult<()> {
        let bytes = bincode::serialize(meta)
            .map_err(|e| FamError::Metadata(format!("encode dataitem record: {e}")))?;
        self.store.put(&item_key(meta.region_id, meta.offset), bytes);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_region_meta(
        &self,
        name: String,
        size: u64,
        mode: u32,
        uid: u32,
        gid: u32,
        permission_level: PermissionLevel,
        interleave_enable: bool,
        interleave_size: u64,
        memservers: Vec<u32>,
    ) -> FamResult<u64> {
        Self::check_name(&name)?;
        if interleave_enable && !is_power_of_two(interleave_size) {
            return Err(FamError::NotPowerOfTwo(format!(
                "interleave size {interleave_size}"
            )));
        }
        let name_key = region_name_key(&name);
        if self.store.contains(&name_key) {
            return Err(FamError::AlreadyExists(format!("region '{name}'")));
        }

        let region_id = self.next_region_id.fetch_add(1, Ordering::Relaxed);
        let meta = RegionMeta {
            region_id,
            name: name.clone(),
            owner_uid: uid,
            owner_gid: gid,
            mode,
            size,
            redundancy: fam_common::model::Redundancy::None,
            memory_type: fam_common::model::MemoryType::Volatile,
            interleave_enable,
            interleave_size,
            permission_level,
            memservers,
        };
        self.save_region(&meta)?;
        self.store.put(&name_key, region_id.to_le_bytes().to_vec());
        Ok(region_id)
    }

    pub fn destroy_region_meta(&self, region_id: u64) -> FamResult<()> {
        let meta = self.load_region(region_id)?;
        for (key, _) in self.store.scan_prefix(&item_prefix(region_id)) {
            self.store.delete(&key);
        }
        self.store.delete(&region_key(region_id));
        self.store.delete(&region_name_key(&meta.name));
        self.alloc_cursors.lock().remove(&region_id);
        Ok(())
    }

    /// Fetch-and-increment the region's round-robin allocation cursor.
    pub fn next_alloc_cursor(&self, region_id: u64) -> u64 {
        let mut cursors = self.alloc_cursors.lock();
        let cursor = cursors.entry(region_id).or_insert(0);
        let value = *cursor;
        *cursor = cursor.wrapping_add(1);
        value
    }

    pub fn resize_region_meta(&self, region_id: u64, new_size: u64) -> FamResult<()> {
        let mut meta = self.load_region(region_id)?;
        meta.size = new_size;
        self.save_region(&meta)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn allocate_meta(
        &self,
        region_id: u64,
        offset: u64,
        size: u64,
        name: Option<String>,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FamResult<()> {
        let region = self.load_region(region_id)?;
        if offset.saturating_add(size) > region.size {
            return Err(FamError::OutOfRange(format!(
                "offset {offset} + size {size} exceeds region size {}",
                region.size
            )));
        }
        if let Some(name) = &name {
            Self::check_name(name)?;
            let name_key = item_name_key(region_id, name);
            if self.store.contains(&name_key) {
                return Err(FamError::AlreadyExists(format!(
                    "dataitem '{name}' in region {region_id}"
                )));
            }
            self.store.put(&name_key, offset.to_le_bytes().to_vec());
        }

        let meta = DataItemMeta {
            region_id,
            offset,
            name,
            size,
            owner_uid: uid,
            owner_gid: gid,
            mode,
        };
        self.save_item(&meta)
    }

    pub fn deallocate_meta(&self, region_id: u64, offset: u64) -> FamResult<()> {
        let meta = self.load_item(region_id, offset)?;
        if let Some(name) = &meta.name {
            self.store.delete(&item_name_key(region_id, name));
        }
        self.store.delete(&item_key(region_id, offset));
        Ok(())
    }

    pub fn change_region_permission(
        &self,
        region_id: u64,
        mode: u32,
        caller_uid: u32,
    ) -> FamResult<()> {
        let mut meta = self.load_region(region_id)?;
        if !Mode::may_change(meta.owner_uid, caller_uid) {
            return Err(FamError::NoPermission(format!(
                "uid {caller_uid} may not change permissions on region {region_id}"
            )));
        }
        meta.mode = mode;
        self.save_region(&meta)
    }

    pub fn change_dataitem_permission(
        &self,
        region_id: u64,
        offset: u64,
        mode: u32,
        caller_uid: u32,
    ) -> FamResult<()> {
        let mut meta = self.load_item(region_id, offset)?;
        if !Mode::may_change(meta.owner_uid, caller_uid) {
            return Err(FamError::NoPermission(format!(
                "uid {caller_uid} may not change permissions on dataitem {region_id}:{offset}"
            )));
        }
        meta.mode = mode;
        self.save_item(&meta)
    }

    pub fn lookup_region(&self, name: &str) -> FamResult<RegionMeta> {
        let bytes = self
            .store
            .get(&region_name_key(name))
            .ok_or_else(|| FamError::NotFound(format!("region '{name}'")))?;
        let region_id = u64::from_le_bytes(bytes.try_into().unwrap_or_default());
        self.load_region(region_id)
    }

    pub fn lookup(&self, item_name: &str, region_name: &str) -> FamResult<DataItemMeta> {
        let region = self.lookup_region(region_name)?;
        let bytes = self
            .store
            .get(&item_name_key(region.region_id, item_name))
            .ok_or_else(|| FamError::NotFound(format!("dataitem '{item_name}'")))?;
        let offset = u64::from_le_bytes(bytes.try_into().unwrap_or_default());
        self.load_item(region.region_id, offset)
    }

    pub fn get_region(&self, region_id: u64) -> FamResult<RegionMeta> {
        self.load_region(region_id)
    }

    pub fn get_dataitem(&self, region_id: u64, offset: u64) -> FamResult<DataItemMeta> {
        self.load_item(region_id, offset)
    }

    pub fn check_region_permission(
        region: &RegionMeta,
        op: Op,
        uid: u32,
        gid: u32,
    ) -> bool {
        Mode(region.mode).allows(op, region.owner_uid, region.owner_gid, uid, gid)
    }

    pub fn check_dataitem_permission(
        item: &DataItemMeta,
        op: Op,
        uid: u32,
        gid: u32,
    ) -> bool {
        Mode(item.mode).allows(op, item.owner_uid, item.owner_gid, uid, gid)
    }

    pub fn get_memserver_list(&self, region_id: u64) -> FamResult<Vec<u32>> {
        Ok(self.load_region(region_id)?.memservers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn new_service() -> MdsService {
        MdsService::new(Arc::new(MemStore::new()))
    }

    #[test]
    fn create_lookup_destroy_round_trip() {
        let svc = new_service();
        let id = svc
            .create_region_meta(
                "r1".into(),
                4096,
                0o777,
                1000,
                100,
                PermissionLevel::Region,
                false,
                4096,
                vec![0],
            )
            .unwrap();

        let meta = svc.lookup_region("r1").unwrap();
        assert_eq!(meta.region_id, id);
        assert_eq!(meta.size, 4096);

        svc.destroy_region_meta(id).unwrap();
        assert!(matches!(
            svc.lookup_region("r1"),
            Err(FamError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_region_name_rejected() {
        let svc = new_service();
        svc.create_region_meta(
            "dup".into(),
            100,
            0o777,
            1,
            1,
            PermissionLevel::Region,
            false,
            4096,
            vec![0],
        )
        .unwrap();

        let err = svc
            .create_region_meta(
                "dup".into(),
                100,
                0o777,
                1,
                1,
                PermissionLevel::Region,
                false,
                4096,
                vec![0],
            )
            .unwrap_err();
        assert!(matches!(err, FamError::AlreadyExists(_)));
    }

    #[test]
    fn non_power_of_two_interleave_rejected() {
        let svc = new_service();
        let err = svc
            .create_region_meta(
                "bad".into(),
                100,
                0o777,
                1,
                1,
                PermissionLevel::Region,
                true,
                3000,
                vec![0, 1],
            )
            .unwrap_err();
        assert!(matches!(err, FamError::NotPowerOfTwo(_)));
    }

    #[test]
    fn permission_enforced_on_non_owner() {
        let svc = new_service();
        let id = svc
            .create_region_meta(
                "perm".into(),
                4096,
                0o400,
                1000,
                100,
                PermissionLevel::Region,
                false,
                4096,
                vec![0],
            )
            .unwrap();
        let region = svc.get_region(id).unwrap();
        assert!(!MdsService::check_region_permission(
            &region,
            Op::Write,
            2000,
            200
        ));

        svc.change_region_permission(id, 0o777, 1000).unwrap();
        let region = svc.get_region(id).unwrap();
        assert!(MdsService::check_region_permission(
            &region,
            Op::Write,
            2000,
            200
        ));
    }

    #[test]
    fn change_permission_denied_for_non_owner() {
        let svc = new_service();
        let id = svc
            .create_region_meta(
                "owned".into(),
                4096,
                0o600,
                1000,
                100,
                PermissionLevel::Region,
                false,
                4096,
                vec![0],
            )
            .unwrap();
        let err = svc
            .change_region_permission(id, 0o777, 2000)
            .unwrap_err();
        assert!(matches!(err, FamError::NoPermission(_)));
    }

    #[test]
    fn allocate_and_lookup_named_dataitem() {
        let svc = new_service();
        let region_id = svc
            .create_region_meta(
                "r".into(),
                65536,
                0o777,
                1,
                1,
                PermissionLevel::DataItem,
                false,
                4096,
                vec![0],
            )
            .unwrap();
        svc.allocate_meta(region_id, 0, 1024, Some("d1".into()), 0o644, 1, 1)
            .unwrap();
        let item = svc.lookup("d1", "r").unwrap();
        assert_eq!(item.size, 1024);

        svc.deallocate_meta(region_id, 0).unwrap();
        assert!(matches!(svc.lookup("d1", "r"), Err(FamError::NotFound(_))));
    }

    #[test]
    fn alloc_cursor_advances_and_resets_per_region() {
        let svc = new_service();
        let r1 = svc
            .create_region_meta(
                "rr1".into(),
                4096,
                0o777,
                1,
                1,
                PermissionLevel::Region,
                true,
                4096,
                vec![0, 1, 2],
            )
            .unwrap();
        let r2 = svc
            .create_region_meta(
                "rr2".into(),
                4096,
                0o777,
                1,
                1,
                PermissionLevel::Region,
                true,
                4096,
                vec![0, 1],
            )
            .unwrap();

        assert_eq!(svc.next_alloc_cursor(r1), 0);
        assert_eq!(svc.next_alloc_cursor(r1), 1);
        assert_eq!(svc.next_alloc_cursor(r2), 0);
        assert_eq!(svc.next_alloc_cursor(r1), 2);

        svc.destroy_region_meta(r1).unwrap();
        // A region reusing a destroyed region's counter starts fresh.
        let r3 = svc
            .create_region_meta(
                "rr3".into(),
                4096,
                0o777,
                1,
                1,
                PermissionLevel::Region,
                true,
                4096,
                vec![0, 1],
            )
            .unwrap();
        assert_eq!(svc.next_alloc_cursor(r3), 0);
    }

    #[test]
    fn allocate_out_of_range_rejected() {
        let svc = new_service();
        let region_id = svc
            .create_region_meta(
                "small".into(),
                1024,
                0o777,
                1,
                1,
                PermissionLevel::DataItem,
                false,
                4096,
                vec![0],
            )
            .unwrap();
        let err = svc
            .allocate_meta(region_id, 900, 1000, None, 0o644, 1, 1)
            .unwrap_err();
        assert!(matches!(err, FamError::OutOfRange(_)));
    }
}
