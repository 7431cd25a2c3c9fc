//! The per-region local heap (spec.md §6: "the underlying heap allocator...
//! treated as an opaque `alloc(size) → offset` / `free(offset)` over named
//! heaps"). `Heap` is that boundary; `MappedHeap` is the one implementation,
//! grounded in `filemap/src/mmap.rs`'s technique of lazily touching
//! fixed-size chunks behind an atomic bitmap, minus the platform-specific
//! `mach_vm_map`/`mmap` calls that file needs for a real zero-copy guest
//! mapping — here the "mapping" is a growable in-process buffer, and
//! `PERSISTENT` heaps additionally mirror writes to a backing file so the
//! region's bytes survive a restart.
//!
//! The free-list bump allocator below is this crate's own design: the
//! filtered original source doesn't carry the allocator's internals (see
//! DESIGN.md).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use fam_common::constants::{round_up_to_min_obj, HEAP_CHUNK_SIZE, MIN_OBJ_SIZE};
use fam_common::{FamError, FamResult};

pub trait Heap: Send + Sync {
    fn alloc(&self, size: u64) -> FamResult<u64>;
    fn free(&self, offset: u64) -> FamResult<()>;
    fn resize(&self, new_size: u64) -> FamResult<()>;
    fn get_extents(&self) -> Vec<(u64, u64)>;
    fn read(&self, offset: u64, len: u64) -> FamResult<Vec<u8>>;
    fn write(&self, offset: u64, data: &[u8]) -> FamResult<()>;
    fn size(&self) -> u64;
}

struct AtomicBitmap(Vec<AtomicU64>);

impl AtomicBitmap {
    fn new(num_bits: usize) -> Self {
        let num_chunks = num_bits.div_ceil(64).max(1);
        let mut v = Vec::with_capacity(num_chunks);
        v.resize_with(num_chunks, || AtomicU64::new(0));
        AtomicBitmap(v)
    }

    fn test(&self, bit: usize) -> bool {
        let chunk = bit / 64;
        let off = bit % 64;
        self.0[chunk].load(Ordering::Relaxed) & (1 << off) != 0
    }

    fn set(&self, bit: usize) {
        let chunk = bit / 64;
        let off = bit % 64;
        self.0[chunk].fetch_or(1 << off, Ordering::Relaxed);
    }
}

/// A contiguous free byte range.
#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    offset: u64,
    size: u64,
}

struct Allocator {
    free_list: Vec<FreeBlock>,
    bump: u64,
    /// Rounded size handed back by the `alloc()` that produced each live
    /// offset, so `free()` can return the real extent instead of guessing
    /// `MIN_OBJ_SIZE` for every allocation.
    live: HashMap<u64, u64>,
}

impl Allocator {
    fn new() -> Self {
        Allocator {
            free_list: Vec::new(),
            bump: 0,
            live: HashMap::new(),
        }
    }

    fn alloc(&mut self, size: u64, capacity: u64) -> FamResult<u64> {
        let size = round_up_to_min_obj(size);

        if let Some(pos) = self.free_list.iter().position(|b| b.size >= size) {
            let block = self.free_list.remove(pos);
            if block.size > size {
                self.free_list.push(FreeBlock {
                    offset: block.offset + size,
                    size: block.size - size,
                });
            }
            self.live.insert(block.offset, size);
            return Ok(block.offset);
        }

        let offset = self.bump;
        if offset.saturating_add(size) > capacity {
            return Err(FamError::NoSpace(format!(
                "heap exhausted: requested {size} bytes, {} remaining",
                capacity.saturating_sub(offset)
            )));
        }
        self.bump += size;
        self.live.insert(offset, size);
        Ok(offset)
    }

    fn free(&mut self, offset: u64) {
        let size = match self.live.remove(&offset) {
            Some(size) => size,
            None => return,
        };
        self.free_list.push(FreeBlock { offset, size });
    }
}

pub struct MappedHeap {
    name: String,
    bytes: parking_lot::RwLock<Vec<u8>>,
    mapped: AtomicBitmap,
    allocator: Mutex<Allocator>,
    capacity: AtomicU64,
    persistent_file: Option<Mutex<File>>,
}

impl MappedHeap {
    /// Creates a volatile (in-memory only) heap of `size` bytes.
    pub fn volatile(name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        let num_chunks = (size as usize).div_ceil((HEAP_CHUNK_SIZE as usize)).max(1);
        MappedHeap {
            name,
            bytes: parking_lot::RwLock::new(vec![0u8; size as usize]),
            mapped: AtomicBitmap::new(num_chunks),
            allocator: Mutex::new(Allocator::new()),
            capacity: AtomicU64::new(size),
            persistent_file: None,
        }
    }

    /// Creates a persistent heap backed by `path`, truncated/extended to `size`.
    pub fn persistent(name: impl Into<String>, path: PathBuf, size: u64) -> FamResult<Self> {
        let name = name.into();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| FamError::Memory(format!("open heap file {path:?}: {e}")))?;
        file.set_len(size)
            .map_err(|e| FamError::Memory(format!("resize heap file {path:?}: {e}")))?;

        let mut bytes = vec![0u8; size as usize];
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut bytes))
            .or_else(|_| Ok::<(), std::io::Error>(()))
            .ok();

        let num_chunks = (size as usize).div_ceil((HEAP_CHUNK_SIZE as usize)).max(1);
        Ok(MappedHeap {
            name,
            bytes: parking_lot::RwLock::new(bytes),
            mapped: AtomicBitmap::new(num_chunks),
            allocator: Mutex::new(Allocator::new()),
            capacity: AtomicU64::new(size),
            persistent_file: Some(Mutex::new(file)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_mapped(&self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        let start_chunk = offset as usize / (HEAP_CHUNK_SIZE as usize);
        let end_chunk = (offset as usize + len as usize - 1) / (HEAP_CHUNK_SIZE as usize);
        for chunk in start_chunk..=end_chunk.min(self.mapped.0.len() - 1) {
            // touching a chunk is a no-op beyond bookkeeping: the backing
            // Vec is already fully sized, unlike a real lazily-mapped file.
            self.mapped.set(chunk);
        }
    }

    fn persist(&self, offset: u64, data: &[u8]) {
        if let Some(file) = &self.persistent_file {
            let mut file = file.lock();
            if file.seek(SeekFrom::Start(offset)).is_ok() {
                let _ = file.write_all(data);
            }
        }
    }
}

impl Heap for MappedHeap {
    fn alloc(&self, size: u64) -> FamResult<u64> {
        let capacity = self.capacity.load(Ordering::Acquire);
        let offset = self.allocator.lock().alloc(size, capacity)?;
        self.ensure_mapped(offset, round_up_to_min_obj(size));
        Ok(offset)
    }

    fn free(&self, offset: u64) -> FamResult<()> {
        // The allocator remembers each live offset's rounded size from its
        // own alloc() call, so the full extent is returned, not just
        // MIN_OBJ_SIZE.
        self.allocator.lock().free(offset);
        Ok(())
    }

    fn resize(&self, new_size: u64) -> FamResult<()> {
        let old_size = self.capacity.swap(new_size, Ordering::AcqRel);
        if new_size < old_size {
            self.capacity.store(old_size, Ordering::Release);
            return Err(FamError::Resource(
                "heap shrink is not supported".to_string(),
            ));
        }
        let mut bytes = self.bytes.write();
        bytes.resize(new_size as usize, 0);
        if let Some(file) = &self.persistent_file {
            file.lock()
                .set_len(new_size)
                .map_err(|e| FamError::Memory(format!("extend heap file: {e}")))?;
        }
        Ok(())
    }

    fn get_extents(&self) -> Vec<(u64, u64)> {
        vec![(0, self.capacity.load(Ordering::Acquire))]
    }

    fn read(&self, offset: u64, len: u64) -> FamResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let end = offset
            .checked_add(len)
            .ok_or_else(|| FamError::OutOfRange("offset+len overflow".to_string()))?;
        if end > bytes.len() as u64 {
            return Err(FamError::OutOfRange(format!(
                "read [{offset}, {end}) exceeds heap size {}",
                bytes.len()
            )));
        }
        Ok(bytes[offset as usize..end as usize].to_vec())
    }

    fn write(&self, offset: u64, data: &[u8]) -> FamResult<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| FamError::OutOfRange("offset+len overflow".to_string()))?;
        {
            let mut bytes = self.bytes.write();
            if end > bytes.len() as u64 {
                return Err(FamError::OutOfRange(format!(
                    "write [{offset}, {end}) exceeds heap size {}",
                    bytes.len()
                )));
            }
            bytes[offset as usize..end as usize].copy_from_slice(data);
        }
        self.ensure_mapped(offset, data.len() as u64);
        self.persist(offset, data);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.capacity.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_rounds_up_to_min_obj_size() {
        let heap = MappedHeap::volatile("h", 4096);
        let off = heap.alloc(10).unwrap();
        assert_eq!(off, 0);
        let off2 = heap.alloc(1).unwrap();
        assert_eq!(off2, MIN_OBJ_SIZE);
    }

    #[test]
    fn free_then_alloc_reuses_block() {
        let heap = MappedHeap::volatile("h", 4096);
        let off = heap.alloc(32).unwrap();
        heap.free(off).unwrap();
        let off2 = heap.alloc(32).unwrap();
        assert_eq!(off, off2);
    }

    #[test]
    fn write_then_read_round_trips() {
        let heap = MappedHeap::volatile("h", 4096);
        let off = heap.alloc(16).unwrap();
        heap.write(off, b"hello world12345").unwrap();
        let data = heap.read(off, 16).unwrap();
        assert_eq!(&data, b"hello world12345");
    }

    #[test]
    fn free_returns_the_full_allocated_extent() {
        let heap = MappedHeap::volatile("h", 8192);
        let off = heap.alloc(4096).unwrap();
        heap.free(off).unwrap();
        // A second alloc() of the same size should reuse the freed block
        // rather than bump past it — only possible if free() returned all
        // 4096 bytes, not just MIN_OBJ_SIZE.
        let off2 = heap.alloc(4096).unwrap();
        assert_eq!(off, off2);
    }

    #[test]
    fn alloc_fails_when_exhausted() {
        let heap = MappedHeap::volatile("h", 64);
        heap.alloc(64).unwrap();
        assert!(matches!(heap.alloc(64), Err(FamError::NoSpace(_))));
    }

    #[test]
    fn resize_grows_capacity() {
        let heap = MappedHeap::volatile("h", 64);
        heap.resize(128).unwrap();
        assert_eq!(heap.size(), 128);
        heap.alloc(128).unwrap();
    }
}
