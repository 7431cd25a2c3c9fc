//! Backup/restore to the filesystem (spec.md §6: "filesystem directory
//! containing one sidecar metadata file and chunked data files named by
//! index"). `serde_json` for the sidecar mirrors `wormhole::model`'s own use
//! of `serde_json` for structured on-disk/wire state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fam_common::{FamError, FamResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub chunk_size: u64,
    pub used_memserver_cnt: u32,
    pub item_name: Option<String>,
}

pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> FamResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| FamError::Memory(format!("create backup root {root:?}: {e}")))?;
        Ok(BackupStore { root })
    }

    fn backup_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn sidecar_path(&self, name: &str) -> PathBuf {
        self.backup_dir(name).join("metadata.json")
    }

    fn chunk_path(&self, name: &str, index: u64) -> PathBuf {
        self.backup_dir(name).join(format!("chunk.{index}"))
    }

    /// Only the leader MS writes the sidecar (spec.md §4.1); non-leader
    /// callers pass `write_metadata = false` and only persist their chunks.
    pub fn write_chunk(&self, name: &str, index: u64, data: &[u8]) -> FamResult<()> {
        let dir = self.backup_dir(name);
        fs::create_dir_all(&dir)
            .map_err(|e| FamError::Memory(format!("create backup dir {dir:?}: {e}")))?;
        fs::write(self.chunk_path(name, index), data)
            .map_err(|e| FamError::Memory(format!("write backup chunk: {e}")))
    }

    pub fn write_metadata(&self, meta: &BackupMetadata) -> FamResult<()> {
        let dir = self.backup_dir(&meta.name);
        fs::create_dir_all(&dir)
            .map_err(|e| FamError::Memory(format!("create backup dir {dir:?}: {e}")))?;
        let bytes = serde_json::to_vec_pretty(meta)
            .map_err(|e| FamError::Metadata(format!("encode backup metadata: {e}")))?;
        fs::write(self.sidecar_path(&meta.name), bytes)
            .map_err(|e| FamError::Memory(format!("write backup metadata: {e}")))
    }

    pub fn read_metadata(&self, name: &str) -> FamResult<BackupMetadata> {
        let path = self.sidecar_path(name);
        let bytes = fs::read(&path)
            .map_err(|_| FamError::NotFound(format!("backup '{name}'")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FamError::Metadata(format!("corrupt backup metadata {path:?}: {e}")))
    }

    pub fn read_chunk(&self, name: &str, index: u64) -> FamResult<Vec<u8>> {
        fs::read(self.chunk_path(name, index))
            .map_err(|_| FamError::NotFound(format!("backup '{name}' chunk {index}")))
    }

    pub fn list(&self, prefix: &str) -> FamResult<Vec<BackupMetadata>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(_) => return Ok(out),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) {
                continue;
            }
            if let Ok(meta) = self.read_metadata(&name) {
                out.push(meta);
            }
        }
        Ok(out)
    }

    pub fn delete(&self, name: &str) -> FamResult<()> {
        let dir = self.backup_dir(name);
        if !dir.exists() {
            return Err(FamError::NotFound(format!("backup '{name}'")));
        }
        fs::remove_dir_all(&dir).map_err(|e| FamError::Memory(format!("delete backup: {e}")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (BackupStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn write_and_read_metadata_round_trips() {
        let (store, _dir) = store();
        let meta = BackupMetadata {
            name: "b1".into(),
            size: 4096,
            mode: 0o640,
            uid: 1,
            gid: 1,
            chunk_size: 1024,
            used_memserver_cnt: 2,
            item_name: Some("d1".into()),
        };
        store.write_metadata(&meta).unwrap();
        let read_back = store.read_metadata("b1").unwrap();
        assert_eq!(read_back.size, 4096);
        assert_eq!(read_back.used_memserver_cnt, 2);
    }

    #[test]
    fn chunk_round_trip() {
        let (store, _dir) = store();
        store.write_chunk("b2", 0, b"hello").unwrap();
        store.write_chunk("b2", 1, b"world").unwrap();
        assert_eq!(store.read_chunk("b2", 0).unwrap(), b"hello");
        assert_eq!(store.read_chunk("b2", 1).unwrap(), b"world");
    }

    #[test]
    fn delete_then_read_metadata_not_found() {
        let (store, _dir) = store();
        store
            .write_metadata(&BackupMetadata {
                name: "b3".into(),
                size: 0,
                mode: 0o640,
                uid: 1,
                gid: 1,
                chunk_size: 1,
                used_memserver_cnt: 1,
                item_name: None,
            })
            .unwrap();
        store.delete("b3").unwrap();
        assert!(matches!(store.read_metadata("b3"), Err(FamError::NotFound(_))));
    }
}
