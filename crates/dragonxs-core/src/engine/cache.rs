use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

const MANIFEST_NAME: &str = "manifest.toml";
const READ_CHUNK_BYTES: usize = 1 << 16;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to encode cache manifest: {0}")]
    Encode(#[from] toml::ser::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Content digest of one solver invocation.
///
/// Covers the executable (its file name and bytes) and the bytes of every input
/// in declared order. Paths are not part of the key, so a cache built on one
/// host stays valid on another sharing the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    executable_name: String,
    digest: String,
}

impl CacheKey {
    pub fn compute<P: AsRef<Path>>(executable: &Path, inputs: &[P]) -> Result<Self, CacheError> {
        let executable_name = executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| executable.to_string_lossy().into_owned());

        let mut hasher = Sha256::new();
        hasher.update(executable_name.as_bytes());
        hash_file(&mut hasher, executable)?;
        for input in inputs {
            hash_file(&mut hasher, input.as_ref())?;
        }

        Ok(Self {
            executable_name,
            digest: format!("{:x}", hasher.finalize()),
        })
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn executable_name(&self) -> &str {
        &self.executable_name
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

/// Feeds the length and contents of `path`, so adjacent files cannot alias.
fn hash_file(hasher: &mut Sha256, path: &Path) -> Result<(), CacheError> {
    let mut file = File::open(path).map_err(io_error(path))?;
    let len = file.metadata().map_err(io_error(path))?.len();
    hasher.update(len.to_le_bytes());

    let mut buffer = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = file.read(&mut buffer).map_err(io_error(path))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Manifest {
    key: String,
    executable: String,
    outputs: Vec<String>,
}

/// A persisted set of outputs for one key. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub dir: PathBuf,
    pub outputs: Vec<String>,
}

impl CacheEntry {
    pub fn path_of(&self, output: &str) -> Option<PathBuf> {
        self.outputs
            .iter()
            .any(|o| o == output)
            .then(|| self.dir.join(output))
    }

    /// Copies every cached output into `dir` under its original name.
    pub fn restore_into(&self, dir: &Path) -> Result<(), CacheError> {
        for output in &self.outputs {
            let target = dir.join(output);
            std::fs::copy(self.dir.join(output), &target).map_err(io_error(&target))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// A valid entry existed and was restored; the run closure was not called.
    Hit(CacheEntry),
    /// The run closure succeeded and its outputs were persisted.
    Stored(CacheEntry),
}

impl StoreOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, StoreOutcome::Hit(_))
    }
}

/// Content-addressed store of solver outputs.
///
/// Layout: `{root}/{executable}/{key[..2]}/{key}/` holding the output files and a
/// manifest. Entries are assembled in a staging directory and renamed into place,
/// so readers never observe a partial entry. Within a process, callers for the
/// same key are serialized so the run closure executes at most once.
#[derive(Debug)]
pub struct OutputCache {
    root: PathBuf,
    in_flight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl OutputCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        let shard = key.digest.get(..2).unwrap_or(&key.digest);
        self.root
            .join(&key.executable_name)
            .join(shard)
            .join(&key.digest)
    }

    /// Returns the entry for `key` if it is complete.
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let dir = self.entry_dir(key);
        let manifest_path = dir.join(MANIFEST_NAME);
        if !manifest_path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&manifest_path).map_err(io_error(&manifest_path))?;
        let manifest: Manifest = match toml::from_str(&content) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring cache entry with an unreadable manifest.");
                return Ok(None);
            }
        };
        if manifest.key != key.digest || manifest.outputs.iter().any(|o| !dir.join(o).is_file()) {
            warn!(key = %key, "Ignoring incomplete cache entry.");
            return Ok(None);
        }
        Ok(Some(CacheEntry {
            key: key.clone(),
            dir,
            outputs: manifest.outputs,
        }))
    }

    /// Runs `run` unless `key` is already cached, then persists `outputs` from `work_dir`.
    ///
    /// On a hit the cached outputs are copied into `work_dir` and `run` is never
    /// called. Outputs that `run` did not produce are left out of the entry. An
    /// error from `run` leaves the cache untouched.
    pub fn store<E, F>(
        &self,
        key: &CacheKey,
        work_dir: &Path,
        outputs: &[&str],
        run: F,
    ) -> Result<StoreOutcome, E>
    where
        F: FnOnce() -> Result<(), E>,
        E: From<CacheError>,
    {
        let key_lock = self.key_lock(key);
        let outcome = {
            let _guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.store_locked(key, work_dir, outputs, run)
        };
        drop(key_lock);
        self.release_key_lock(key);
        outcome
    }

    fn store_locked<E, F>(
        &self,
        key: &CacheKey,
        work_dir: &Path,
        outputs: &[&str],
        run: F,
    ) -> Result<StoreOutcome, E>
    where
        F: FnOnce() -> Result<(), E>,
        E: From<CacheError>,
    {
        if let Some(entry) = self.lookup(key)? {
            info!(key = %key, "Cache hit; skipping solver execution.");
            entry.restore_into(work_dir)?;
            return Ok(StoreOutcome::Hit(entry));
        }

        run()?;

        let produced: Vec<String> = outputs
            .iter()
            .filter(|name| work_dir.join(name).is_file())
            .map(|name| name.to_string())
            .collect();
        Ok(StoreOutcome::Stored(self.persist(key, work_dir, produced)?))
    }

    fn persist(&self, key: &CacheKey, work_dir: &Path, outputs: Vec<String>) -> Result<CacheEntry, CacheError> {
        std::fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)
            .map_err(io_error(&self.root))?;

        for output in &outputs {
            let target = staging.path().join(output);
            std::fs::copy(work_dir.join(output), &target).map_err(io_error(&target))?;
        }
        let manifest = Manifest {
            key: key.digest.clone(),
            executable: key.executable_name.clone(),
            outputs: outputs.clone(),
        };
        let manifest_path = staging.path().join(MANIFEST_NAME);
        std::fs::write(&manifest_path, toml::to_string(&manifest)?).map_err(io_error(&manifest_path))?;

        let dir = self.entry_dir(key);
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        self.publish(key, staging.path(), &dir)?;

        Ok(CacheEntry {
            key: key.clone(),
            dir,
            outputs,
        })
    }

    /// Moves a staged entry to `dir`, replacing whatever incomplete entry sits there.
    fn publish(&self, key: &CacheKey, staging: &Path, dir: &Path) -> Result<(), CacheError> {
        let Err(first) = std::fs::rename(staging, dir) else {
            debug!(key = %key, dir = %dir.display(), "Stored cache entry.");
            return Ok(());
        };
        // A complete entry from another writer is equivalent to ours.
        if self.lookup(key)?.is_some() {
            debug!(key = %key, "Cache entry already published by another writer.");
            return Ok(());
        }
        if !dir.exists() {
            return Err(CacheError::Io {
                path: dir.to_path_buf(),
                source: first,
            });
        }

        warn!(key = %key, dir = %dir.display(), "Replacing incomplete cache entry.");
        std::fs::remove_dir_all(dir).map_err(io_error(dir))?;
        match std::fs::rename(staging, dir) {
            Ok(()) => Ok(()),
            Err(_) if self.lookup(key)?.is_some() => Ok(()),
            Err(source) => Err(CacheError::Io {
                path: dir.to_path_buf(),
                source,
            }),
        }
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(key.clone()).or_default())
    }

    fn release_key_lock(&self, key: &CacheKey) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            in_flight.remove(key);
        }
    }

    /// Removes the whole store.
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).map_err(io_error(&self.root))?;
            info!(root = %self.root.display(), "Cleared output cache.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn key_is_a_function_of_contents_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write(dir.path(), "dragon", "binary");
        let a = write(dir.path(), "a.x2m", "deck");
        let b = write(dir.path(), "lib", "library");
        let a_copy = write(dir.path(), "elsewhere.x2m", "deck");

        let key = CacheKey::compute(&exe, &[&a, &b]).unwrap();
        assert_eq!(key, CacheKey::compute(&exe, &[&a, &b]).unwrap());
        assert_eq!(key, CacheKey::compute(&exe, &[&a_copy, &b]).unwrap());
        assert_ne!(key, CacheKey::compute(&exe, &[&b, &a]).unwrap());
        assert_eq!(key.digest().len(), 64);
    }

    #[test]
    fn input_boundaries_are_part_of_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write(dir.path(), "dragon", "binary");
        let ab = write(dir.path(), "ab", "ab");
        let c = write(dir.path(), "c", "c");
        let a = write(dir.path(), "a", "a");
        let bc = write(dir.path(), "bc", "bc");
        assert_ne!(
            CacheKey::compute(&exe, &[&ab, &c]).unwrap(),
            CacheKey::compute(&exe, &[&a, &bc]).unwrap()
        );
    }

    #[test]
    fn second_store_is_a_hit_and_skips_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write(dir.path(), "dragon", "binary");
        let deck = write(dir.path(), "deck", "deck");
        let key = CacheKey::compute(&exe, &[&deck]).unwrap();
        let cache = OutputCache::new(dir.path().join("cache"));
        let calls = AtomicUsize::new(0);

        let first_work = tempfile::tempdir().unwrap();
        let outcome = cache
            .store::<CacheError, _>(&key, first_work.path(), &["out", "ISOTXS000001"], || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::fs::write(first_work.path().join("out"), "log").unwrap();
                Ok(())
            })
            .unwrap();
        assert!(matches!(&outcome, StoreOutcome::Stored(entry) if entry.outputs == vec!["out".to_string()]));

        let second_work = tempfile::tempdir().unwrap();
        let outcome = cache
            .store::<CacheError, _>(&key, second_work.path(), &["out"], || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert!(outcome.is_hit());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read_to_string(second_work.path().join("out")).unwrap(),
            "log"
        );
    }

    #[test]
    fn failed_runs_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write(dir.path(), "dragon", "binary");
        let key = CacheKey::compute::<&Path>(&exe, &[]).unwrap();
        let cache = OutputCache::new(dir.path().join("cache"));
        let work = tempfile::tempdir().unwrap();

        let result = cache.store(&key, work.path(), &["out"], || {
            Err(CacheError::Io {
                path: PathBuf::from("dragon"),
                source: std::io::Error::other("exit 1"),
            })
        });
        assert!(result.is_err());
        assert_eq!(cache.lookup(&key).unwrap(), None);
    }

    #[test]
    fn concurrent_stores_run_once() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write(dir.path(), "dragon", "binary");
        let key = CacheKey::compute::<&Path>(&exe, &[]).unwrap();
        let cache = OutputCache::new(dir.path().join("cache"));
        let calls = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let work = tempfile::tempdir().unwrap();
                    cache
                        .store::<CacheError, _>(&key, work.path(), &["out"], || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::fs::write(work.path().join("out"), "log").unwrap();
                            Ok(())
                        })
                        .unwrap();
                    assert!(work.path().join("out").is_file());
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn entries_without_manifest_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write(dir.path(), "dragon", "binary");
        let key = CacheKey::compute::<&Path>(&exe, &[]).unwrap();
        let cache = OutputCache::new(dir.path().join("cache"));
        std::fs::create_dir_all(cache.entry_dir(&key)).unwrap();
        write(&cache.entry_dir(&key), "out", "torn");
        assert_eq!(cache.lookup(&key).unwrap(), None);
    }

    fn store_log(cache: &OutputCache, key: &CacheKey, content: &'static str) -> Result<StoreOutcome, CacheError> {
        let work = tempfile::tempdir().unwrap();
        cache.store::<CacheError, _>(key, work.path(), &["out"], || {
            std::fs::write(work.path().join("out"), content).unwrap();
            Ok(())
        })
    }

    #[test]
    fn torn_entries_are_replaced_by_the_next_store() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write(dir.path(), "dragon", "binary");
        let key = CacheKey::compute::<&Path>(&exe, &[]).unwrap();
        let cache = OutputCache::new(dir.path().join("cache"));
        std::fs::create_dir_all(cache.entry_dir(&key)).unwrap();
        write(&cache.entry_dir(&key), "out", "torn");

        let outcome = store_log(&cache, &key, "fresh").unwrap();
        assert!(!outcome.is_hit());
        let entry = cache.lookup(&key).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(entry.dir.join("out")).unwrap(), "fresh");
    }

    #[test]
    fn entries_missing_an_output_are_healed() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write(dir.path(), "dragon", "binary");
        let key = CacheKey::compute::<&Path>(&exe, &[]).unwrap();
        let cache = OutputCache::new(dir.path().join("cache"));
        store_log(&cache, &key, "first").unwrap();
        std::fs::remove_file(cache.entry_dir(&key).join("out")).unwrap();
        assert_eq!(cache.lookup(&key).unwrap(), None);

        let outcome = store_log(&cache, &key, "second").unwrap();
        assert!(!outcome.is_hit());
        assert!(cache.lookup(&key).unwrap().is_some());
    }

    #[test]
    fn unreadable_manifests_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let exe = write(dir.path(), "dragon", "binary");
        let key = CacheKey::compute::<&Path>(&exe, &[]).unwrap();
        let cache = OutputCache::new(dir.path().join("cache"));
        std::fs::create_dir_all(cache.entry_dir(&key)).unwrap();
        write(&cache.entry_dir(&key), "out", "log");
        write(&cache.entry_dir(&key), MANIFEST_NAME, "key = [not toml");

        assert_eq!(cache.lookup(&key).unwrap(), None);
        store_log(&cache, &key, "log").unwrap();
        assert!(cache.lookup(&key).unwrap().is_some());
    }

    #[test]
    fn clear_removes_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let cache = OutputCache::new(dir.path().join("cache"));
        std::fs::create_dir_all(cache.root().join("dragon")).unwrap();
        cache.clear().unwrap();
        assert!(!cache.root().exists());
        cache.clear().unwrap();
    }
}
