// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! A directory-backed node store.
//!
//! Layout:
//! - `<slot>.node`: one file per live handle, named by [`Handle::slot_name`]
//! - `HEAD`: the allocator counter, so handles survive restarts unreused
//!
//! A record is the blake3 hex digest of the payload, a newline, then the
//! JSON payload. Every write lands in a temp file that is synced and renamed
//! over the target, so a record is either the old payload or the new one.

use std::cell::Cell;
use std::fs;
use std::io;
use std::io::Write;
use std::marker::PhantomData;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::handle::Handle;
use crate::handle::HandleAllocator;
use crate::store::NodeStore;
use crate::store::StoreStats;

const HEAD: &str = "HEAD";
const EXTENSION: &str = "node";

/// Stores each node as a checksummed JSON file.
#[derive(Debug)]
pub struct FileStore<V> {
    dir: PathBuf,
    allocator: HandleAllocator,
    live: u64,
    quota: Option<u64>,
    stats: Cell<StoreStats>,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Serialize + DeserializeOwned> FileStore<V> {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<FileStore<V>> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut allocator = match fs::read_to_string(dir.join(HEAD)) {
            Ok(text) => {
                let next = text.trim().parse::<u64>().map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("bad HEAD counter: {e}"))
                })?;
                HandleAllocator::starting_at(next)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => HandleAllocator::new(),
            Err(e) => return Err(e.into()),
        };

        let handles = scan(&dir)?;
        if let Some(last) = handles.last() {
            // HEAD is written before the node file, so this only matters if
            // HEAD was lost.
            allocator.bump_past(*last);
        }
        debug!(dir = %dir.display(), live = handles.len(), next = allocator.peek(), "opened file store");

        return Ok(FileStore {
            dir,
            allocator,
            live: handles.len() as u64,
            quota: None,
            stats: Cell::new(StoreStats::default()),
            _marker: PhantomData,
        });
    }

    /// Limit the number of live handles.
    pub fn with_quota(mut self, quota: u64) -> FileStore<V> {
        self.quota = Some(quota);
        return self;
    }

    pub fn dir(&self) -> &Path {
        return &self.dir;
    }

    fn path(&self, handle: Handle) -> PathBuf {
        return self.dir.join(format!("{}.{EXTENSION}", handle.slot_name()));
    }

    #[inline]
    fn bump(&self, f: impl FnOnce(&mut StoreStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn encode(value: &V) -> Result<Vec<u8>> {
        let payload = serde_json::to_vec(value)?;
        let digest = blake3::hash(&payload);
        let mut record = Vec::with_capacity(payload.len() + 65);
        record.extend_from_slice(digest.to_hex().as_bytes());
        record.push(b'\n');
        record.extend_from_slice(&payload);
        return Ok(record);
    }

    fn decode(handle: Handle, record: &[u8]) -> Result<V> {
        let Some(split) = record.iter().position(|&b| b == b'\n') else {
            return Err(Error::malformed(handle, "record has no checksum line"));
        };
        let (digest, payload) = (&record[..split], &record[split + 1..]);
        if blake3::hash(payload).to_hex().as_bytes() != digest {
            return Err(Error::malformed(handle, "checksum mismatch"));
        }
        return serde_json::from_slice(payload)
            .map_err(|e| Error::malformed(handle, format!("undecodable payload: {e}")));
    }

    fn persist(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp_name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = self.dir.join(tmp_name);
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, target)?;
        return Ok(());
    }
}

/// Live handles in `dir`, ascending.
fn scan(dir: &Path) -> Result<Vec<Handle>> {
    let mut handles = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        match Handle::from_slot_name(stem) {
            Some(handle) => handles.push(handle),
            None => warn!(path = %path.display(), "ignoring stray file in node store"),
        }
    }
    handles.sort_unstable();
    return Ok(handles);
}

fn not_found_as(handle: Handle, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        return Error::NotFound(handle);
    }
    return Error::Io(e);
}

impl<V: Serialize + DeserializeOwned> NodeStore<V> for FileStore<V> {
    fn allocate(&mut self, value: V) -> Result<Handle> {
        if let Some(available) = self.available() {
            if available == 0 {
                return Err(Error::ResourceExhausted { needed: 1, available });
            }
        }
        self.bump(|stats| stats.allocations += 1);
        let record = Self::encode(&value)?;
        let handle = self.allocator.next();
        let head = self.allocator.peek().to_string();
        self.persist(&self.dir.join(HEAD), head.as_bytes())?;
        self.persist(&self.path(handle), &record)?;
        self.live += 1;
        return Ok(handle);
    }

    fn read(&self, handle: Handle) -> Result<V> {
        self.bump(|stats| stats.reads += 1);
        let record = fs::read(self.path(handle)).map_err(|e| not_found_as(handle, e))?;
        return Self::decode(handle, &record);
    }

    fn write(&mut self, handle: Handle, value: V) -> Result<()> {
        self.bump(|stats| stats.writes += 1);
        let path = self.path(handle);
        if !path.exists() {
            return Err(Error::NotFound(handle));
        }
        let record = Self::encode(&value)?;
        return self.persist(&path, &record);
    }

    fn free(&mut self, handle: Handle) -> Result<()> {
        self.bump(|stats| stats.frees += 1);
        fs::remove_file(self.path(handle)).map_err(|e| not_found_as(handle, e))?;
        self.live -= 1;
        return Ok(());
    }

    fn handles(&self) -> Result<Vec<Handle>> {
        return scan(&self.dir);
    }

    fn available(&self) -> Option<u64> {
        let quota = self.quota?;
        return Some(quota.saturating_sub(self.live));
    }

    fn stats(&self) -> StoreStats {
        return self.stats.get();
    }

    fn len(&self) -> u64 {
        return self.live;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_reopen_without_reusing_handles() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = {
            let mut store: FileStore<Vec<String>> = FileStore::open(dir.path()).unwrap();
            let a = store.allocate(vec!["hello".to_string()]).unwrap();
            let b = store.allocate(vec!["world".to_string()]).unwrap();
            store.free(b).unwrap();
            (a, b)
        };

        let mut store: FileStore<Vec<String>> = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.read(a).unwrap(), vec!["hello".to_string()]);
        assert!(matches!(store.read(b), Err(Error::NotFound(_))));

        let c = store.allocate(vec![]).unwrap();
        assert!(c > b);
        assert_eq!(store.handles().unwrap(), vec![a, c]);
    }

    #[test]
    fn detects_corrupted_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: FileStore<u64> = FileStore::open(dir.path()).unwrap();
        let handle = store.allocate(42).unwrap();

        let path = dir.path().join(format!("{}.node", handle.slot_name()));
        let mut record = fs::read(&path).unwrap();
        let last = record.len() - 1;
        record[last] = b'3';
        fs::write(&path, record).unwrap();

        assert!(matches!(store.read(handle), Err(Error::MalformedNode { .. })));
    }

    #[test]
    fn write_requires_live_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: FileStore<u64> = FileStore::open(dir.path()).unwrap();
        assert!(matches!(store.write(Handle(3), 1), Err(Error::NotFound(Handle(3)))));
        assert!(matches!(store.free(Handle(3)), Err(Error::NotFound(Handle(3)))));
    }

    #[test]
    fn quota_limits_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: FileStore<u64> = FileStore::open(dir.path()).unwrap().with_quota(1);
        store.allocate(1).unwrap();
        assert!(matches!(store.allocate(2), Err(Error::ResourceExhausted { .. })));
    }

    #[test]
    fn stray_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
        fs::write(dir.path().join("Bad.node"), b"hi").unwrap();
        let store: FileStore<u64> = FileStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
    }
}
