//! Deterministic fabric access-key generation, mirroring
//! `Fam_Server_Resource_Manager::generate_access_key` in the original
//! sources: `key = (region_id << R_SHIFT) | (sub_id << D_SHIFT) | perm_bit`.
//!
//! `sub_id` is the extent index for REGION-permission-level regions, or the
//! data-item id (`offset / MIN_OBJ_SIZE`) for DATAITEM-permission-level
//! regions. The encoding is invertible so the memory service can recover
//! `(region_id, sub_id)` from a key during cleanup.

use crate::constants::{MIN_OBJ_SIZE, REGIONID_MASK, REGIONID_SHIFT, SUBID_MASK, SUBID_SHIFT};

/// Read/write access bit packed into the low bit of every access key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    Read,
    ReadWrite,
}

impl AccessType {
    fn bit(self) -> u64 {
        match self {
            AccessType::Read => 0,
            AccessType::ReadWrite => 1,
        }
    }

    pub fn from_bit(bit: u64) -> Self {
        if bit & 1 == 1 {
            AccessType::ReadWrite
        } else {
            AccessType::Read
        }
    }
}

pub fn generate_access_key(region_id: u64, sub_id: u64, access: AccessType) -> u64 {
    let mut key = 0u64;
    key |= (region_id & REGIONID_MASK) << REGIONID_SHIFT;
    key |= (sub_id & SUBID_MASK) << SUBID_SHIFT;
    key |= access.bit();
    key
}

/// Inverse of [`generate_access_key`]: recovers `(region_id, sub_id, access)`.
pub fn decode_access_key(key: u64) -> (u64, u64, AccessType) {
    let region_id = (key >> REGIONID_SHIFT) & REGIONID_MASK;
    let sub_id = (key >> SUBID_SHIFT) & SUBID_MASK;
    let access = AccessType::from_bit(key);
    (region_id, sub_id, access)
}

/// Data-item id for a DATAITEM-permission-level region: `offset / MIN_OBJ_SIZE`.
pub fn dataitem_id(offset: u64) -> u64 {
    offset / MIN_OBJ_SIZE
}

/// Inverse of [`dataitem_id`]: reconstructs the byte offset of a data item id.
pub fn offset_from_dataitem_id(id: u64) -> u64 {
    id * MIN_OBJ_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let key = generate_access_key(42, 7, AccessType::ReadWrite);
        let (region_id, sub_id, access) = decode_access_key(key);
        assert_eq!(region_id, 42);
        assert_eq!(sub_id, 7);
        assert_eq!(access, AccessType::ReadWrite);
    }

    #[test]
    fn read_and_write_keys_differ() {
        let r = generate_access_key(1, 1, AccessType::Read);
        let rw = generate_access_key(1, 1, AccessType::ReadWrite);
        assert_ne!(r, rw);
    }

    #[test]
    fn dataitem_id_round_trips_on_aligned_offsets() {
        let off = 5 * MIN_OBJ_SIZE;
        assert_eq!(offset_from_dataitem_id(dataitem_id(off)), off);
    }
}
