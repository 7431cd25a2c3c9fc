//! Request/response schema for all three services. Kept transport-agnostic
//! on purpose (SPEC_FULL.md §6): the RDMA and TCP/HTTP bindings the spec
//! calls out as equivalents differ only in which `Transport` moves these
//! values, never in the values themselves.

use fam_common::model::{DataItemMeta, PermissionLevel, RegionMeta};
use fam_common::permission::Op as PermOp;
use fam_common::ErrorCode;
use serde::{Deserialize, Serialize};

/// A numeric operand/result for server-executed atomics, tagged with its
/// width so one wire enum covers every numeric kind mentioned in spec.md
/// §4.4 instead of one variant per type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NumericValue {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomicOp {
    FetchAdd,
    FetchSub,
    FetchMin,
    FetchMax,
    FetchAnd,
    FetchOr,
    FetchXor,
    CompareSwap,
    Swap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessTypeWire {
    Read,
    ReadWrite,
}

// === Metadata Service ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MdsRequest {
    CreateRegionMeta {
        name: String,
        size: u64,
        mode: u32,
        uid: u32,
        gid: u32,
        permission_level: PermissionLevel,
        interleave_enable: bool,
        interleave_size: u64,
        memservers: Vec<u32>,
    },
    DestroyRegionMeta {
        region_id: u64,
    },
    ResizeRegionMeta {
        region_id: u64,
        new_size: u64,
    },
    AllocateMeta {
        region_id: u64,
        offset: u64,
        size: u64,
        name: Option<String>,
        mode: u32,
        uid: u32,
        gid: u32,
    },
    DeallocateMeta {
        region_id: u64,
        offset: u64,
    },
    ChangeRegionPermission {
        region_id: u64,
        mode: u32,
        caller_uid: u32,
    },
    ChangeDataitemPermission {
        region_id: u64,
        offset: u64,
        mode: u32,
        caller_uid: u32,
    },
    LookupRegion {
        name: String,
    },
    Lookup {
        item_name: String,
        region_name: String,
    },
    GetRegion {
        region_id: u64,
    },
    GetDataitem {
        region_id: u64,
        offset: u64,
    },
    CheckRegionPermission {
        region_id: u64,
        op: WirePermOp,
        uid: u32,
        gid: u32,
    },
    CheckDataitemPermission {
        region_id: u64,
        offset: u64,
        op: WirePermOp,
        uid: u32,
        gid: u32,
    },
    GetMemserverList {
        region_id: u64,
    },
    NextAllocCursor {
        region_id: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WirePermOp {
    Read,
    Write,
    ReadWrite,
}

impl From<WirePermOp> for PermOp {
    fn from(v: WirePermOp) -> Self {
        match v {
            WirePermOp::Read => PermOp::Read,
            WirePermOp::Write => PermOp::Write,
            WirePermOp::ReadWrite => PermOp::ReadWrite,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MdsResponse {
    RegionId(u64),
    RegionMeta(RegionMeta),
    DataItemMeta(DataItemMeta),
    MemserverList(Vec<u32>),
    Permitted(bool),
    Cursor(u64),
    Unit,
    Error(ErrorCode, String),
}

// === Memory Service ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MsRequest {
    CreateRegion {
        region_id: u64,
        size: u64,
        permission_level: PermissionLevel,
    },
    DestroyRegion {
        region_id: u64,
    },
    ResizeRegion {
        region_id: u64,
        new_size: u64,
    },
    Allocate {
        region_id: u64,
        size: u64,
    },
    Deallocate {
        region_id: u64,
        offset: u64,
    },
    GetLocalPointerDebug {
        region_id: u64,
        offset: u64,
    },
    OpenRegionWithRegistration {
        region_id: u64,
        access: AccessTypeWire,
    },
    OpenRegionWithoutRegistration {
        region_id: u64,
    },
    CloseRegion {
        region_id: u64,
    },
    GetRegionMemory {
        region_id: u64,
        access: AccessTypeWire,
    },
    GetDataitemMemory {
        region_id: u64,
        offset: u64,
        size: u64,
        access: AccessTypeWire,
    },
    RegisterRegionMemory {
        region_id: u64,
        access: AccessTypeWire,
    },
    UpdateMemserverAddrlist {
        addrs: Vec<(u32, String)>,
    },

    /// Server-executed one-sided read into the requester's pre-registered
    /// buffer (spec.md §4.4 item 3): the MS is the initiator.
    GetAtomic {
        region_id: u64,
        offset: u64,
        size: u64,
        dst_base_addr: u64,
        dst_key: u64,
        dst_node_addr: String,
    },
    PutAtomic {
        region_id: u64,
        offset: u64,
        size: u64,
        src_base_addr: u64,
        src_key: u64,
        src_node_addr: String,
    },
    /// In-place read-modify-write under the hashed CAS lock.
    RmwAtomic {
        region_id: u64,
        offset: u64,
        op: AtomicOp,
        operand: NumericValue,
        compare: Option<NumericValue>,
    },

    Copy {
        src_region_id: u64,
        src_offsets: Vec<u64>,
        src_copy_start: u64,
        src_copy_end: u64,
        src_keys: Vec<u64>,
        src_base_addrs: Vec<u64>,
        src_memserver_ids: Vec<u32>,
        src_interleave_size: u64,
        dst_region_id: u64,
        dst_offset: u64,
        dst_interleave_size: u64,
        size: u64,
    },
    WaitForCopy {
        handle: u64,
    },

    Backup {
        region_id: u64,
        offset: u64,
        size: u64,
        chunk_size: u64,
        used_memserver_cnt: u32,
        file_start_pos: u64,
        name: String,
        uid: u32,
        gid: u32,
        mode: u32,
        item_name: Option<String>,
        item_size: u64,
        write_metadata: bool,
    },
    Restore {
        region_id: u64,
        offset: u64,
        size: u64,
        chunk_size: u64,
        used_memserver_cnt: u32,
        file_start_pos: u64,
        name: String,
    },
    WaitForBackup {
        handle: u64,
    },
    WaitForRestore {
        handle: u64,
    },
    GetBackupInfo {
        name: String,
    },
    ListBackup {
        name: String,
        uid: u32,
        gid: u32,
        mode: u32,
    },
    DeleteBackup {
        name: String,
    },

    AcquireCasLock {
        offset: u64,
    },
    ReleaseCasLock {
        offset: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionMemoryInfo {
    pub keys: Vec<u64>,
    pub bases: Vec<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DataitemMemoryInfo {
    pub key: u64,
    pub base: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatusWire {
    Active,
    Busy,
    Released,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub chunk_size: u64,
    pub used_memserver_cnt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MsResponse {
    Offset(u64),
    Addr(u64),
    Unit,
    ResourceStatus(ResourceStatusWire),
    RegionMemory(RegionMemoryInfo),
    DataitemMemory(DataitemMemoryInfo),
    JobHandle(u64),
    JobStatus(JobStatusWire),
    NumericValue(NumericValue),
    BackupInfo(BackupInfo),
    BackupList(Vec<BackupInfo>),
    Error(ErrorCode, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatusWire {
    Pending,
    Running,
    Done,
    Failed,
}

// === Client-Interface Service ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CisRequest {
    CreateRegion {
        name: String,
        size: u64,
        mode: u32,
        uid: u32,
        gid: u32,
        redundancy_none: bool,
        interleave_enable: bool,
        interleave_size: u64,
        permission_level: PermissionLevel,
    },
    DestroyRegion {
        region_id: u64,
        uid: u32,
        gid: u32,
    },
    Resize {
        region_id: u64,
        new_size: u64,
        uid: u32,
        gid: u32,
    },
    Allocate {
        region_id: u64,
        name: Option<String>,
        size: u64,
        mode: u32,
        uid: u32,
        gid: u32,
    },
    Deallocate {
        region_id: u64,
        offset: u64,
        uid: u32,
        gid: u32,
    },
    ChangeRegionPermission {
        region_id: u64,
        mode: u32,
        uid: u32,
    },
    ChangeDataitemPermission {
        region_id: u64,
        offset: u64,
        mode: u32,
        uid: u32,
    },
    Lookup {
        item_name: String,
        region_name: String,
        uid: u32,
        gid: u32,
    },
    LookupRegion {
        name: String,
        uid: u32,
        gid: u32,
    },
    Copy {
        src_region_id: u64,
        src_offset: u64,
        dst_region_id: u64,
        dst_offset: u64,
        size: u64,
        uid: u32,
        gid: u32,
    },
    WaitForCopy {
        memserver_id: u32,
        handle: u64,
    },
    Backup {
        region_id: u64,
        offset: u64,
        size: u64,
        item_name: Option<String>,
        backup_name: String,
        uid: u32,
        gid: u32,
        mode: u32,
    },
    Restore {
        region_id: u64,
        offset: u64,
        backup_name: String,
        uid: u32,
        gid: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionDescriptor {
    pub region_id: u64,
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub owner_uid: u32,
    pub owner_gid: u32,
    pub interleave_size: u64,
    pub permission_level: PermissionLevel,
    pub memservers: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataItemDescriptor {
    pub region_id: u64,
    pub offset: u64,
    pub size: u64,
    pub mode: u32,
    pub owner_uid: u32,
    pub owner_gid: u32,
    pub key: u64,
    pub base: u64,
    pub memserver_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CisResponse {
    RegionId(u64),
    Offset(u64),
    Region(RegionDescriptor),
    DataItem(DataItemDescriptor),
    CopyHandle { memserver_id: u32, handle: u64 },
    Unit,
    Error(ErrorCode, String),
}
