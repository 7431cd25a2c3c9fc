//! Shared data-model types for regions, data items and extents (spec §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Redundancy {
    None,
    Raid1,
    Raid5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryType {
    Volatile,
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// A single key covers the whole region; offsets are logical positions
    /// in the interleaved layout.
    Region,
    /// Each data item has its own fabric key and base address.
    DataItem,
}

/// A named, coarse-grained allocation of remote memory, striped across one
/// or more memory-service nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionMeta {
    pub region_id: u64,
    pub name: String,
    pub owner_uid: u32,
    pub owner_gid: u32,
    pub mode: u32,
    pub size: u64,
    pub redundancy: Redundancy,
    pub memory_type: MemoryType,
    pub interleave_enable: bool,
    pub interleave_size: u64,
    pub permission_level: PermissionLevel,
    /// Ordered list of memory-service ids participating in this region; the
    /// order is the interleave/extent order and the first entry is the
    /// backup-metadata-writing leader.
    pub memservers: Vec<u32>,
}

/// A byte range inside a region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataItemMeta {
    pub region_id: u64,
    pub offset: u64,
    pub name: Option<String>,
    pub size: u64,
    pub owner_uid: u32,
    pub owner_gid: u32,
    pub mode: u32,
}

/// The portion of a region resident on a single memory-service node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegionExtent {
    pub memserver_id: u32,
    pub size: u64,
}
