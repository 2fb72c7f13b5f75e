//! Persisted bytecode caches.
//!
//! A bytecode cache stores serialized compiled templates keyed by a stable
//! hash of the template name.  The stored payload embeds the source
//! checksum; stale or corrupted payloads read as misses so a cache can
//! never produce wrong output, only cold starts.
//!
//! ```no_run
//! use vinja::bccache::FileSystemBytecodeCache;
//! use vinja::Environment;
//!
//! let mut env = Environment::new();
//! env.set_bytecode_cache(FileSystemBytecodeCache::new("/tmp/template-cache"));
//! ```
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// A backend for persisted template bytecode.
///
/// Buckets are keyed by a stable 64-bit hash of the template name; the
/// checksum identifies the source revision the payload was compiled from.
/// Implementations must never fail loudly: problems reading or writing
/// buckets degrade to cache misses.
pub trait BytecodeCache: Send + Sync {
    /// Loads the payload for a bucket if present and matching.
    fn load_bucket(&self, key: u64, checksum: u64) -> Option<Vec<u8>>;

    /// Stores the payload of a bucket.
    fn dump_bucket(&self, key: u64, checksum: u64, payload: &[u8]);

    /// Removes all buckets.
    fn clear(&self);
}

/// A bytecode cache storing buckets as files in a directory.
#[derive(Debug)]
pub struct FileSystemBytecodeCache {
    dir: PathBuf,
}

impl FileSystemBytecodeCache {
    /// Creates a cache writing to the given directory.
    ///
    /// The directory is created on the first dump.
    pub fn new<P: Into<PathBuf>>(dir: P) -> FileSystemBytecodeCache {
        FileSystemBytecodeCache { dir: dir.into() }
    }

    fn bucket_path(&self, key: u64) -> PathBuf {
        self.dir.join(format!("{key:016x}.vjbc"))
    }
}

impl BytecodeCache for FileSystemBytecodeCache {
    fn load_bucket(&self, key: u64, _checksum: u64) -> Option<Vec<u8>> {
        // checksum validation happens during deserialization; a stale
        // payload is simply a miss.
        fs::read(self.bucket_path(key)).ok()
    }

    fn dump_bucket(&self, key: u64, _checksum: u64, payload: &[u8]) {
        if fs::create_dir_all(&self.dir).is_err() {
            return;
        }
        let path = self.bucket_path(key);
        let tmp_path = path.with_extension("tmp");
        let write_result = fs::File::create(&tmp_path)
            .and_then(|mut file| file.write_all(payload))
            .and_then(|_| fs::rename(&tmp_path, &path));
        if write_result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
    }

    fn clear(&self) {
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if entry.path().extension().map_or(false, |x| x == "vjbc") {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }
    }
}

/// An in-memory bytecode cache.
///
/// Mostly useful for tests and to share compilation work between
/// short-lived environments in one process.
#[derive(Debug, Default)]
pub struct MemoryBytecodeCache {
    buckets: Mutex<HashMap<u64, (u64, Vec<u8>)>>,
}

impl MemoryBytecodeCache {
    /// Creates an empty in-memory cache.
    pub fn new() -> MemoryBytecodeCache {
        MemoryBytecodeCache::default()
    }
}

impl BytecodeCache for MemoryBytecodeCache {
    fn load_bucket(&self, key: u64, checksum: u64) -> Option<Vec<u8>> {
        let buckets = self.buckets.lock().unwrap();
        match buckets.get(&key) {
            Some((stored_checksum, payload)) if *stored_checksum == checksum => {
                Some(payload.clone())
            }
            _ => None,
        }
    }

    fn dump_bucket(&self, key: u64, checksum: u64, payload: &[u8]) {
        self.buckets
            .lock()
            .unwrap()
            .insert(key, (checksum, payload.to_vec()));
    }

    fn clear(&self) {
        self.buckets.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_checksum_mismatch_is_miss() {
        let cache = MemoryBytecodeCache::new();
        cache.dump_bucket(1, 42, b"payload");
        assert_eq!(cache.load_bucket(1, 42), Some(b"payload".to_vec()));
        assert_eq!(cache.load_bucket(1, 43), None);
        cache.clear();
        assert_eq!(cache.load_bucket(1, 42), None);
    }
}
