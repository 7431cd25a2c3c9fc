//! The server-side resource state machine (spec.md §4.1, "core of this
//! component"): a packed 64-bit `{status: u8, ref_count: u56}` word mutated
//! only via compare-and-exchange, grounded directly in
//! `fam_server_resource_manager.cpp`'s `find_or_create_resource` /
//! `open_resource` / `close_resource`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use fam_common::model::PermissionLevel;
use fam_common::{FamError, FamResult};
use parking_lot::RwLock;

const REF_COUNT_BITS: u32 = 56;
const REF_COUNT_MASK: u64 = (1u64 << REF_COUNT_BITS) - 1;

const STATUS_INACTIVE: u8 = 0;
const STATUS_BUSY: u8 = 1;
const STATUS_ACTIVE: u8 = 2;
const STATUS_RELEASED: u8 = 3;

/// Bounded number of CAS retries before a caller observing a stuck `BUSY`
/// resource gives up; spec.md §5 calls for "bounded backoff", not an
/// unbounded spin.
const MAX_BUSY_RETRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Inactive,
    Busy,
    Active,
    Released,
}

impl ResourceStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            STATUS_INACTIVE => ResourceStatus::Inactive,
            STATUS_BUSY => ResourceStatus::Busy,
            STATUS_ACTIVE => ResourceStatus::Active,
            STATUS_RELEASED => ResourceStatus::Released,
            _ => unreachable!("resource status word corrupted"),
        }
    }
}

fn pack(status: u8, ref_count: u64) -> u64 {
    ((status as u64) << REF_COUNT_BITS) | (ref_count & REF_COUNT_MASK)
}

fn unpack(word: u64) -> (u8, u64) {
    ((word >> REF_COUNT_BITS) as u8, word & REF_COUNT_MASK)
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryRegistrationEntry {
    pub reg_id: u64,
    pub key: u64,
    pub base_addr: u64,
    pub deallocated: bool,
}

/// Per-`(region_id, MS)` resource record (spec.md §3).
pub struct ServerResource {
    pub region_id: u64,
    pub permission_level: PermissionLevel,
    word: AtomicU64,
    registrations: RwLock<HashMap<u64, MemoryRegistrationEntry>>,
    next_reg_id: AtomicU64,
}

impl ServerResource {
    pub fn new_inactive(region_id: u64, permission_level: PermissionLevel) -> Arc<Self> {
        Arc::new(ServerResource {
            region_id,
            permission_level,
            word: AtomicU64::new(pack(STATUS_INACTIVE, 0)),
            registrations: RwLock::new(HashMap::new()),
            next_reg_id: AtomicU64::new(1),
        })
    }

    pub fn status(&self) -> ResourceStatus {
        ResourceStatus::from_u8(unpack(self.word.load(Ordering::Acquire)).0)
    }

    pub fn ref_count(&self) -> u64 {
        unpack(self.word.load(Ordering::Acquire)).1
    }

    pub fn insert_registration(&self, key: u64, base_addr: u64) -> u64 {
        let reg_id = self.next_reg_id.fetch_add(1, Ordering::Relaxed);
        self.registrations.write().insert(
            reg_id,
            MemoryRegistrationEntry {
                reg_id,
                key,
                base_addr,
                deallocated: false,
            },
        );
        reg_id
    }

    pub fn registrations(&self) -> Vec<MemoryRegistrationEntry> {
        self.registrations.read().values().copied().collect()
    }

    pub fn mark_deallocated(&self, key: u64) {
        if let Some(entry) = self
            .registrations
            .write()
            .values_mut()
            .find(|e| e.key == key)
        {
            entry.deallocated = true;
        }
    }

    /// Opens this resource, invoking `register_fn` exactly once if the
    /// transition is `INACTIVE -> BUSY` (this caller becomes the unique
    /// owner of the registration step, spec.md §4.1 rule 2). If
    /// `register_fn` fails the resource rolls back to `INACTIVE` (see
    /// DESIGN.md for why not `RELEASED`). An already-`ACTIVE` resource just
    /// increments `ref_count`.
    pub fn open<F>(&self, with_registration: bool, register_fn: F) -> FamResult<u64>
    where
        F: FnOnce(&Self) -> FamResult<()>,
    {
        let mut retries = 0;
        loop {
            let word = self.word.load(Ordering::Acquire);
            let (status, rc) = unpack(word);
            match status {
                STATUS_INACTIVE => {
                    let busy = pack(STATUS_BUSY, 0);
                    if self
                        .word
                        .compare_exchange(word, busy, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        if with_registration {
                            if let Err(e) = register_fn(self) {
                                self.word.store(pack(STATUS_INACTIVE, 0), Ordering::Release);
                                return Err(e);
                            }
                        }
                        self.word.store(pack(STATUS_ACTIVE, 1), Ordering::Release);
                        return Ok(1);
                    }
                }
                STATUS_ACTIVE => {
                    let new_rc = rc + 1;
                    let new_word = pack(STATUS_ACTIVE, new_rc);
                    if self
                        .word
                        .compare_exchange(word, new_word, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return Ok(new_rc);
                    }
                }
                STATUS_BUSY => {
                    retries += 1;
                    if retries > MAX_BUSY_RETRIES {
                        return Err(FamError::Resource(format!(
                            "resource for region {} stayed BUSY past {MAX_BUSY_RETRIES} retries",
                            self.region_id
                        )));
                    }
                    std::thread::yield_now();
                }
                STATUS_RELEASED => {
                    return Err(FamError::Resource(
                        "resource released; caller must open a fresh entry".to_string(),
                    ));
                }
                _ => unreachable!(),
            }
        }
    }

    /// Closes this resource. On the last close (`ref_count` 1 -> 0) this
    /// caller becomes the unique owner of the `BUSY -> RELEASED` transition
    /// and runs `deregister_fn` to drain every registration.
    pub fn close<F>(&self, deregister_fn: F) -> FamResult<ResourceStatus>
    where
        F: FnOnce(&Self) -> FamResult<()>,
    {
        let mut retries = 0;
        loop {
            let word = self.word.load(Ordering::Acquire);
            let (status, rc) = unpack(word);
            match status {
                STATUS_ACTIVE if rc > 1 => {
                    let new_word = pack(STATUS_ACTIVE, rc - 1);
                    if self
                        .word
                        .compare_exchange(word, new_word, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return Ok(ResourceStatus::Active);
                    }
                }
                STATUS_ACTIVE => {
                    let busy = pack(STATUS_BUSY, 0);
                    if self
                        .word
                        .compare_exchange(word, busy, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        deregister_fn(self)?;
                        self.registrations.write().clear();
                        self.word.store(pack(STATUS_RELEASED, 0), Ordering::Release);
                        return Ok(ResourceStatus::Released);
                    }
                }
                STATUS_BUSY => {
                    retries += 1;
                    if retries > MAX_BUSY_RETRIES {
                        return Err(FamError::Resource(format!(
                            "resource for region {} stayed BUSY past {MAX_BUSY_RETRIES} retries",
                            self.region_id
                        )));
                    }
                    std::thread::yield_now();
                }
                STATUS_INACTIVE => return Ok(ResourceStatus::Inactive),
                STATUS_RELEASED => return Ok(ResourceStatus::Released),
                _ => unreachable!(),
            }
        }
    }
}

/// Region-keyed table of resources, plus the garbage queue that recycles
/// `RELEASED` entries (spec.md §5: "pushed to a lock-free bounded queue and
/// reclaimed by a background task").
pub struct ResourceTable {
    table: RwLock<HashMap<u64, Arc<ServerResource>>>,
    garbage: ArrayQueue<Arc<ServerResource>>,
}

impl ResourceTable {
    pub fn new(garbage_capacity: usize) -> Self {
        ResourceTable {
            table: RwLock::new(HashMap::new()),
            garbage: ArrayQueue::new(garbage_capacity.max(1)),
        }
    }

    fn entry(&self, region_id: u64, permission_level: PermissionLevel) -> Arc<ServerResource> {
        if let Some(existing) = self.table.read().get(&region_id) {
            return existing.clone();
        }
        self.table
            .write()
            .entry(region_id)
            .or_insert_with(|| ServerResource::new_inactive(region_id, permission_level))
            .clone()
    }

    /// Opens the resource for `region_id`, replacing a `RELEASED` entry with
    /// a fresh one before retrying — this is the "subsequent opens create a
    /// fresh entry atomically" rule, and guarantees the caller never
    /// observes a stale registration map.
    pub fn open<F>(
        &self,
        region_id: u64,
        permission_level: PermissionLevel,
        with_registration: bool,
        register_fn: F,
    ) -> FamResult<(u64, Arc<ServerResource>)>
    where
        F: FnOnce(&ServerResource) -> FamResult<()>,
    {
        loop {
            let resource = self.entry(region_id, permission_level);
            if resource.status() == ResourceStatus::Released {
                let mut table = self.table.write();
                if let Some(current) = table.get(&region_id) {
                    if Arc::ptr_eq(current, &resource) {
                        let fresh = ServerResource::new_inactive(region_id, permission_level);
                        table.insert(region_id, fresh);
                        drop(table);
                        let _ = self.garbage.push(resource);
                    }
                }
                continue;
            }
            let rc = resource.open(with_registration, register_fn)?;
            return Ok((rc, resource));
        }
    }

    pub fn close<F>(&self, region_id: u64, deregister_fn: F) -> FamResult<ResourceStatus>
    where
        F: FnOnce(&ServerResource) -> FamResult<()>,
    {
        let resource = match self.table.read().get(&region_id).cloned() {
            Some(r) => r,
            None => return Ok(ResourceStatus::Inactive),
        };
        resource.close(deregister_fn)
    }

    pub fn get(&self, region_id: u64) -> Option<Arc<ServerResource>> {
        self.table.read().get(&region_id).cloned()
    }

    pub fn remove(&self, region_id: u64) {
        self.table.write().remove(&region_id);
    }

    pub fn garbage_len(&self) -> usize {
        self.garbage.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_without_registration_goes_straight_to_active() {
        let resource = ServerResource::new_inactive(1, PermissionLevel::Region);
        let rc = resource.open(false, |_| Ok(())).unwrap();
        assert_eq!(rc, 1);
        assert_eq!(resource.status(), ResourceStatus::Active);
    }

    #[test]
    fn second_open_increments_ref_count() {
        let resource = ServerResource::new_inactive(1, PermissionLevel::Region);
        resource.open(false, |_| Ok(())).unwrap();
        let rc = resource.open(false, |_| Ok(())).unwrap();
        assert_eq!(rc, 2);
    }

    #[test]
    fn registration_failure_rolls_back_to_inactive() {
        let resource = ServerResource::new_inactive(1, PermissionLevel::Region);
        let err = resource
            .open(true, |_| Err(FamError::Fabric("boom".to_string())))
            .unwrap_err();
        assert!(matches!(err, FamError::Fabric(_)));
        assert_eq!(resource.status(), ResourceStatus::Inactive);
    }

    #[test]
    fn close_decrements_then_releases_on_last_close() {
        let resource = ServerResource::new_inactive(1, PermissionLevel::Region);
        resource.open(false, |_| Ok(())).unwrap();
        resource.open(false, |_| Ok(())).unwrap();
        assert_eq!(resource.ref_count(), 2);

        let status = resource.close(|_| Ok(())).unwrap();
        assert_eq!(status, ResourceStatus::Active);
        assert_eq!(resource.ref_count(), 1);

        let mut deregistered = false;
        let status = resource.close(|_| {
            deregistered = true;
            Ok(())
        }).unwrap();
        assert_eq!(status, ResourceStatus::Released);
        assert!(deregistered);
    }

    #[test]
    fn resource_table_open_close_cycle_recycles_released_entry() {
        let table = ResourceTable::new(16);
        let (rc, resource1) = table
            .open(5, PermissionLevel::Region, false, |_| Ok(()))
            .unwrap();
        assert_eq!(rc, 1);
        resource1.insert_registration(0xdead, 0);

        table.close(5, |_| Ok(())).unwrap();
        assert_eq!(resource1.status(), ResourceStatus::Released);

        let (rc2, resource2) = table
            .open(5, PermissionLevel::Region, false, |_| Ok(()))
            .unwrap();
        assert_eq!(rc2, 1);
        assert!(!Arc::ptr_eq(&resource1, &resource2));
        assert!(resource2.registrations().is_empty());
        assert_eq!(table.garbage_len(), 1);
    }
}
