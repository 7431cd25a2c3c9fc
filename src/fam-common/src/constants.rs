//! System-wide constants mirroring `fam_server_resource_manager.h` and
//! `fam_options.h` in the original sources.

/// Minimum allocation granularity for `allocate`; all offsets are multiples
/// of this. Used to recover a data-item id from a byte offset
/// (`offset / MIN_OBJ_SIZE`).
pub const MIN_OBJ_SIZE: u64 = 64;

/// Number of bits of a 64-bit access key reserved for the region id.
pub const REGIONID_BITS: u32 = 32;
/// Number of bits reserved for the sub-id (extent index or data-item id).
pub const SUBID_BITS: u32 = 31;

pub const REGIONID_SHIFT: u32 = 64 - REGIONID_BITS;
pub const SUBID_SHIFT: u32 = 1;
pub const REGIONID_MASK: u64 = (1u64 << REGIONID_BITS) - 1;
pub const SUBID_MASK: u64 = (1u64 << SUBID_BITS) - 1;

/// Fixed, compile-time number of CAS-lock slots (must be a power of two).
pub const N_CAS_LOCKS: usize = 1024;

/// Default striping block size, overridable by `INTERLEAVE_SIZE`.
pub const DEFAULT_INTERLEAVE_SIZE: u64 = 4096;

/// Default worker-pool size for the async copy/backup/restore queue.
pub const DEFAULT_NUM_CONSUMER: usize = 4;

/// Default bound on the async job queue before `AtlQueueFull` is returned.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Maximum length, in bytes, of a region or data-item name.
pub const MAX_NAME_LEN: usize = 255;

/// Chunk size used for mapping heap-backing files (see `fam-ms::heap`).
pub const HEAP_CHUNK_SIZE: u64 = 1 << 30;

pub fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Rounds `size` up to the next multiple of [`MIN_OBJ_SIZE`].
pub fn round_up_to_min_obj(size: u64) -> u64 {
    size.div_ceil(MIN_OBJ_SIZE) * MIN_OBJ_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_respects_existing_multiples() {
        assert_eq!(round_up_to_min_obj(64), 64);
        assert_eq!(round_up_to_min_obj(1), 64);
        assert_eq!(round_up_to_min_obj(65), 128);
    }
}
