//! Pure layout decisions the Client-Interface Service makes without talking
//! to MDS or MS: which memory-service nodes participate in a region, and how
//! a logical offset maps onto one of their extents when interleaving is on
//! (SPEC_FULL.md §8's universal invariant).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Stable (not per-process-random) hash of a region name, used both to pick
/// the single memserver for a non-interleaved region and, by the memory
/// service's own `dataitem_id`, nowhere else — this is CIS-local.
pub fn hash_name(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Chooses the ordered list of memserver ids backing a new region.
///
/// Non-interleaved regions live on exactly one memserver, picked by hashing
/// the name so repeated lookups of the same name are deterministic. An
/// interleaved region spans every memserver the CIS knows about; real
/// deployments would let an attribute cap this to a subset, but this
/// implementation is not configured with subset sizing.
pub fn choose_memservers(name: &str, num_memservers: usize, interleave_enable: bool) -> Vec<u32> {
    assert!(num_memservers > 0, "CIS has no memservers configured");
    if interleave_enable {
        (0..num_memservers as u32).collect()
    } else {
        vec![(hash_name(name) % num_memservers as u64) as u32]
    }
}

/// Per-memserver extent size for a region of logical `size` bytes spread
/// across `num_memservers` participants. Non-interleaved regions place the
/// whole size on their single extent.
pub fn extent_size(size: u64, num_memservers: u64) -> u64 {
    if num_memservers <= 1 {
        size
    } else {
        size.div_ceil(num_memservers)
    }
}

/// Resolves a logical offset within an interleaved region to
/// `(extent_index, offset_within_extent)`, per the invariant in spec §8:
/// owning extent is `(o / B) mod n`, on-extent offset is
/// `(o / (B*n)) * B + (o mod B)`.
pub fn resolve_offset(offset: u64, interleave_size: u64, num_memservers: u64) -> (u64, u64) {
    if num_memservers <= 1 {
        return (0, offset);
    }
    let extent_index = (offset / interleave_size) % num_memservers;
    let stripe_span = interleave_size * num_memservers;
    let extent_offset = (offset / stripe_span) * interleave_size + (offset % interleave_size);
    (extent_index, extent_offset)
}

/// Walks `[offset, offset + size)` one interleave block at a time and
/// groups the visited blocks by owning extent, returning
/// `(extent_index, first_on_extent_offset, block_count)` for each extent the
/// range touches, in ascending extent order. A range that wraps around the
/// stripe more than once visits the same extent again exactly
/// `interleave_size * num_memservers` bytes later, which — by the placement
/// invariant — lands exactly `interleave_size` past the previous visit's
/// on-extent offset, so repeated visits to one extent merge into a single
/// contiguous entry.
pub fn resolve_copy_extents(
    offset: u64,
    size: u64,
    interleave_size: u64,
    num_memservers: u64,
) -> Vec<(u64, u64, u64)> {
    if size == 0 {
        return Vec::new();
    }
    if num_memservers <= 1 {
        return vec![(0, offset, size)];
    }

    let mut per_extent: Vec<Option<(u64, u64)>> = vec![None; num_memservers as usize];
    let mut pos = offset;
    let mut remaining = size;
    while remaining > 0 {
        let block_start = (pos / interleave_size) * interleave_size;
        let block_end = block_start + interleave_size;
        let take = remaining.min(block_end - pos);
        let (extent_index, extent_offset) = resolve_offset(pos, interleave_size, num_memservers);
        let entry = per_extent[extent_index as usize].get_or_insert((extent_offset, 0));
        entry.1 += take;
        pos += take;
        remaining -= take;
    }

    (0..num_memservers)
        .filter_map(|i| per_extent[i as usize].map(|(start, len)| (i, start, len)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interleaved_picks_single_memserver() {
        let chosen = choose_memservers("r1", 4, false);
        assert_eq!(chosen.len(), 1);
        assert!(chosen[0] < 4);
        // Same name always resolves to the same memserver.
        assert_eq!(chosen, choose_memservers("r1", 4, false));
    }

    #[test]
    fn interleaved_spans_every_memserver() {
        let chosen = choose_memservers("r3", 4, true);
        assert_eq!(chosen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn resolve_offset_matches_universal_invariant() {
        let b = 4096u64;
        let n = 4u64;
        for o in [0u64, 4095, 4096, 8192, 8192 + 4095, 65535] {
            let (extent, extent_off) = resolve_offset(o, b, n);
            assert_eq!(extent, (o / b) % n);
            assert_eq!(extent_off, (o / (b * n)) * b + (o % b));
        }
    }

    #[test]
    fn non_interleaved_resolve_is_identity_on_extent_zero() {
        assert_eq!(resolve_offset(12345, 4096, 1), (0, 12345));
    }

    #[test]
    fn copy_extents_single_memserver_is_one_chunk() {
        let chunks = resolve_copy_extents(100, 500, 4096, 1);
        assert_eq!(chunks, vec![(0, 100, 500)]);
    }

    #[test]
    fn copy_extents_whole_stripe_splits_evenly_per_extent() {
        let b = 64u64;
        let n = 2u64;
        // One full stripe: extent 0 and extent 1 each get `b` contiguous
        // bytes starting at on-extent offset 0.
        let chunks = resolve_copy_extents(0, b * n, b, n);
        assert_eq!(chunks, vec![(0, 0, b), (1, 0, b)]);
    }

    #[test]
    fn copy_extents_spanning_multiple_stripes_merges_same_extent() {
        let b = 64u64;
        let n = 2u64;
        // Two full stripes: each extent is visited twice, 64 bytes apart in
        // its own address space, so the two visits merge into one 128-byte
        // entry per extent.
        let chunks = resolve_copy_extents(0, b * n * 2, b, n);
        assert_eq!(chunks, vec![(0, 0, b * 2), (1, 0, b * 2)]);
    }

    #[test]
    fn copy_extents_within_a_single_extent_is_one_entry() {
        let b = 64u64;
        let n = 4u64;
        // A sub-block copy entirely inside extent 0's first stripe.
        let chunks = resolve_copy_extents(10, 20, b, n);
        assert_eq!(chunks, vec![(0, 10, 20)]);
    }
}
