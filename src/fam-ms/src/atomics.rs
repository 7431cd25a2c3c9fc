//! Server-executed read-modify-write atomics (spec.md §4.4), generic over
//! the numeric width instead of the six-way macro expansion in
//! `fam_util_atomic.h`. `apply_rmw` is pure (no locking, no I/O); the CAS
//! lock array below is the synchronization the memory service wraps around
//! it so RMWs against the same offset never race.

use std::sync::atomic::{AtomicBool, Ordering};

use fam_common::constants::N_CAS_LOCKS;
use fam_common::{FamError, FamResult};
use fam_rpc::messages::{AtomicOp, NumericValue};
use parking_lot::Mutex;

/// Fixed-size hashed lock array serializing RMW atomics against the same
/// byte range (spec.md §4.1: "the lock index is `(offset >> 7) mod N_LOCKS`").
pub struct CasLockArray {
    locks: Vec<Mutex<()>>,
}

impl CasLockArray {
    pub fn new() -> Self {
        let mut locks = Vec::with_capacity(N_CAS_LOCKS);
        locks.resize_with(N_CAS_LOCKS, || Mutex::new(()));
        CasLockArray { locks }
    }

    fn index_for(&self, offset: u64) -> usize {
        ((offset >> 7) as usize) % N_CAS_LOCKS
    }

    /// Runs `f` while holding the lock for `offset`.
    pub fn with_lock<R>(&self, offset: u64, f: impl FnOnce() -> R) -> R {
        let _guard = self.locks[self.index_for(offset)].lock();
        f()
    }
}

impl Default for CasLockArray {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded retries for [`ExplicitLockTable::acquire`] before giving up on a
/// slot held by a caller that never released it (spec.md §5's "bounded
/// backoff", same policy as the resource state machine's BUSY spin).
const MAX_ACQUIRE_RETRIES: usize = 10_000;

/// Advisory per-offset locking for `acquire_CAS_lock`/`release_CAS_lock`
/// (spec.md §4.4): unlike [`CasLockArray`], which scopes a `parking_lot`
/// guard to a single RMW call, this lock is explicitly held *across* two
/// separate RPCs, so it is a flag a caller sets and later clears rather than
/// a guard a callee can hold for them.
pub struct ExplicitLockTable {
    held: Vec<AtomicBool>,
}

impl ExplicitLockTable {
    pub fn new() -> Self {
        let mut held = Vec::with_capacity(N_CAS_LOCKS);
        held.resize_with(N_CAS_LOCKS, || AtomicBool::new(false));
        ExplicitLockTable { held }
    }

    fn index_for(&self, offset: u64) -> usize {
        ((offset >> 7) as usize) % N_CAS_LOCKS
    }

    pub fn acquire(&self, offset: u64) -> FamResult<()> {
        let index = self.index_for(offset);
        for _ in 0..MAX_ACQUIRE_RETRIES {
            if self.held[index]
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
            std::thread::yield_now();
        }
        Err(FamError::Resource(format!(
            "CAS lock for offset {offset} stayed held past {MAX_ACQUIRE_RETRIES} retries"
        )))
    }

    pub fn release(&self, offset: u64) {
        self.held[self.index_for(offset)].store(false, Ordering::Release);
    }
}

impl Default for ExplicitLockTable {
    fn default() -> Self {
        Self::new()
    }
}

fn binop(current: NumericValue, operand: NumericValue, op: AtomicOp) -> FamResult<NumericValue> {
    match (current, operand) {
        (NumericValue::I32(c), NumericValue::I32(o)) => Ok(NumericValue::I32(int_op(c, o, op))),
        (NumericValue::U32(c), NumericValue::U32(o)) => Ok(NumericValue::U32(int_op(c, o, op))),
        (NumericValue::I64(c), NumericValue::I64(o)) => Ok(NumericValue::I64(int_op(c, o, op))),
        (NumericValue::U64(c), NumericValue::U64(o)) => Ok(NumericValue::U64(int_op(c, o, op))),
        (NumericValue::F32(c), NumericValue::F32(o)) => Ok(NumericValue::F32(float_op(c, o, op))),
        (NumericValue::F64(c), NumericValue::F64(o)) => Ok(NumericValue::F64(float_op(c, o, op))),
        _ => Err(FamError::NullPointer(
            "atomic operand width does not match slot width".to_string(),
        )),
    }
}

fn int_op<T>(current: T, operand: T, op: AtomicOp) -> T
where
    T: Copy
        + PartialOrd
        + std::ops::BitAnd<Output = T>
        + std::ops::BitOr<Output = T>
        + std::ops::BitXor<Output = T>
        + WrappingArith,
{
    match op {
        AtomicOp::FetchAdd => current.wrapping_add(operand),
        AtomicOp::FetchSub => current.wrapping_sub(operand),
        AtomicOp::FetchMin => {
            if operand < current {
                operand
            } else {
                current
            }
        }
        AtomicOp::FetchMax => {
            if operand > current {
                operand
            } else {
                current
            }
        }
        AtomicOp::FetchAnd => current & operand,
        AtomicOp::FetchOr => current | operand,
        AtomicOp::FetchXor => current ^ operand,
        AtomicOp::CompareSwap | AtomicOp::Swap => operand,
    }
}

/// Float min/max per spec.md §4.4: "NaN never replaces a non-NaN value".
/// `f32::min`/`max` already implement that exact rule (they return the
/// non-NaN operand), but we spell the comparison out explicitly so the
/// invariant is visible at the call site rather than hidden in a stdlib
/// method whose NaN behavior callers would have to look up.
fn float_op<T: Float>(current: T, operand: T, op: AtomicOp) -> T {
    match op {
        AtomicOp::FetchAdd => current + operand,
        AtomicOp::FetchSub => current - operand,
        AtomicOp::FetchMin => {
            if current.is_nan() {
                operand
            } else if operand.is_nan() {
                current
            } else if operand < current {
                operand
            } else {
                current
            }
        }
        AtomicOp::FetchMax => {
            if current.is_nan() {
                operand
            } else if operand.is_nan() {
                current
            } else if operand > current {
                operand
            } else {
                current
            }
        }
        AtomicOp::FetchAnd | AtomicOp::FetchOr | AtomicOp::FetchXor => current,
        AtomicOp::CompareSwap | AtomicOp::Swap => operand,
    }
}

trait WrappingArith {
    fn wrapping_add(self, other: Self) -> Self;
    fn wrapping_sub(self, other: Self) -> Self;
}

macro_rules! impl_wrapping {
    ($($t:ty),*) => {
        $(impl WrappingArith for $t {
            fn wrapping_add(self, other: Self) -> Self { <$t>::wrapping_add(self, other) }
            fn wrapping_sub(self, other: Self) -> Self { <$t>::wrapping_sub(self, other) }
        })*
    };
}
impl_wrapping!(i32, u32, i64, u64);

trait Float: Copy + PartialOrd + std::ops::Add<Output = Self> + std::ops::Sub<Output = Self> {
    fn is_nan(self) -> bool;
}
impl Float for f32 {
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
}
impl Float for f64 {
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
}

/// Applies one RMW atomic to `current`, given `operand` and, for
/// compare-and-swap, the expected `compare` value. Returns
/// `(previous_value, new_value)`; callers store `new_value` and hand
/// `previous_value` back to the requester.
pub fn apply_rmw(
    current: NumericValue,
    op: AtomicOp,
    operand: NumericValue,
    compare: Option<NumericValue>,
) -> FamResult<(NumericValue, NumericValue)> {
    if op == AtomicOp::CompareSwap {
        let expected = compare.ok_or_else(|| {
            FamError::NullPointer("compare_swap requires an expected value".to_string())
        })?;
        if values_equal(current, expected)? {
            return Ok((current, operand));
        }
        return Ok((current, current));
    }

    let new_value = binop(current, operand, op)?;
    Ok((current, new_value))
}

fn values_equal(a: NumericValue, b: NumericValue) -> FamResult<bool> {
    match (a, b) {
        (NumericValue::I32(x), NumericValue::I32(y)) => Ok(x == y),
        (NumericValue::U32(x), NumericValue::U32(y)) => Ok(x == y),
        (NumericValue::I64(x), NumericValue::I64(y)) => Ok(x == y),
        (NumericValue::U64(x), NumericValue::U64(y)) => Ok(x == y),
        (NumericValue::F32(x), NumericValue::F32(y)) => Ok(x == y),
        (NumericValue::F64(x), NumericValue::F64(y)) => Ok(x == y),
        _ => Err(FamError::NullPointer(
            "compare_swap operand width does not match slot width".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_add_then_fetch_sub_round_trips() {
        let (_, v1) = apply_rmw(NumericValue::I64(100), AtomicOp::FetchAdd, NumericValue::I64(42), None).unwrap();
        assert_eq!(v1, NumericValue::I64(142));
        let (_, v2) = apply_rmw(v1, AtomicOp::FetchSub, NumericValue::I64(42), None).unwrap();
        assert_eq!(v2, NumericValue::I64(100));
    }

    #[test]
    fn int_min_max_respects_signedness() {
        let (prev, new) = apply_rmw(
            NumericValue::I32(0x7fffffffu32 as i32),
            AtomicOp::FetchMin,
            NumericValue::I32(0),
            None,
        )
        .unwrap();
        assert_eq!(prev, NumericValue::I32(0x7fffffff));
        assert_eq!(new, NumericValue::I32(0));

        let (prev2, new2) = apply_rmw(
            new,
            AtomicOp::FetchMax,
            NumericValue::I32(0x80000000u32 as i32),
            None,
        )
        .unwrap();
        assert_eq!(prev2, NumericValue::I32(0));
        assert_eq!(new2, NumericValue::I32(0));
    }

    #[test]
    fn float_min_never_replaces_non_nan_with_nan() {
        let (_, new) = apply_rmw(
            NumericValue::F64(1.0),
            AtomicOp::FetchMin,
            NumericValue::F64(f64::NAN),
            None,
        )
        .unwrap();
        assert_eq!(new, NumericValue::F64(1.0));

        let (_, new2) = apply_rmw(
            NumericValue::F64(f64::NAN),
            AtomicOp::FetchMax,
            NumericValue::F64(2.0),
            None,
        )
        .unwrap();
        assert_eq!(new2, NumericValue::F64(2.0));
    }

    #[test]
    fn compare_swap_matches_spec_scenario() {
        let (prev, new) = apply_rmw(
            NumericValue::U64(7),
            AtomicOp::CompareSwap,
            NumericValue::U64(9),
            Some(NumericValue::U64(7)),
        )
        .unwrap();
        assert_eq!(prev, NumericValue::U64(7));
        assert_eq!(new, NumericValue::U64(9));

        let (prev2, new2) = apply_rmw(
            NumericValue::U64(5),
            AtomicOp::CompareSwap,
            NumericValue::U64(9),
            Some(NumericValue::U64(7)),
        )
        .unwrap();
        assert_eq!(prev2, NumericValue::U64(5));
        assert_eq!(new2, NumericValue::U64(5));
    }

    #[test]
    fn mismatched_widths_are_rejected() {
        let err = apply_rmw(
            NumericValue::I32(1),
            AtomicOp::FetchAdd,
            NumericValue::I64(1),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, FamError::NullPointer(_)));
    }

    #[test]
    fn explicit_lock_rejects_reentry_until_released() {
        let locks = ExplicitLockTable::new();
        locks.acquire(64).unwrap();
        assert!(matches!(locks.acquire(64), Err(FamError::Resource(_))));
        locks.release(64);
        assert!(locks.acquire(64).is_ok());
    }

    #[test]
    fn cas_lock_array_indexes_by_shifted_offset() {
        let locks = CasLockArray::new();
        let a = locks.index_for(0);
        let b = locks.index_for(127);
        let c = locks.index_for(128);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
