use crate::clock::{Clock, Timestamp};
use crate::disk::record::{RECORD_EXT, decode_record, encode_record, key_file_stem};
use crate::entry::{CacheKey, CacheValue, Entry, EntryStats};
use crate::errors::CacheError;
use crate::expiry::ExpiryPolicy;
use crate::fsutil;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Index entries examined per lock acquisition during an expiry scan.
const SCAN_CHUNK: usize = 128;

#[derive(Debug, Clone)]
struct DiskSlot {
    stem: String,
    stats: EntryStats,
    /// Access metadata changed since the record was written.
    dirty: bool,
}

/// Result of [`DiskStore::put`].
#[derive(Debug)]
pub struct DiskPut<K, V> {
    pub previous: Option<Entry<K, V>>,
    /// Key dropped to stay within the disk bound.
    pub evicted: Option<K>,
}

/// Outcome of one expiry sweep over the disk tier.
#[derive(Debug)]
pub struct PurgeReport<K> {
    pub removed: Vec<K>,
    pub failed: Vec<(K, CacheError)>,
}

impl<K> Default for PurgeReport<K> {
    fn default() -> Self {
        Self { removed: Vec::new(), failed: Vec::new() }
    }
}

/// Disk overflow tier: one record file per entry, LRU-bounded.
///
/// The index is only changed after the matching file operation succeeded, so
/// a failed write or delete leaves the store exactly as it was.
pub struct DiskStore<K, V> {
    dir: PathBuf,
    max_elements: usize,
    clock: Arc<dyn Clock>,
    index: Mutex<LruCache<K, DiskSlot>>,
    _value: PhantomData<fn() -> V>,
}

impl<K: CacheKey, V: CacheValue> DiskStore<K, V> {
    /// Opens the store at `dir`, rebuilding the index from existing records.
    ///
    /// # Errors
    /// Returns a storage error if the directory cannot be created or listed.
    pub fn open(dir: impl Into<PathBuf>, max_elements: usize, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let store = Self {
            dir,
            max_elements,
            clock,
            index: Mutex::new(LruCache::unbounded()),
            _value: PhantomData,
        };
        store.load_existing()?;
        Ok(store)
    }

    fn load_existing(&self) -> Result<(), CacheError> {
        let mut found: Vec<(K, DiskSlot)> = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            match path.extension().and_then(|s| s.to_str()) {
                Some("tmp") => {
                    log::warn!("removing partial disk record {}", path.display());
                    let _ = fsutil::remove_if_exists(&path);
                }
                Some(RECORD_EXT) => match self.read_entry(&path) {
                    Ok(entry) => {
                        let stem = key_file_stem(&entry.key)?;
                        if path.file_stem().and_then(|s| s.to_str()) != Some(stem.as_str()) {
                            log::warn!("record {} does not match its key, removing", path.display());
                            let _ = fsutil::remove_if_exists(&path);
                            continue;
                        }
                        found.push((entry.key, DiskSlot { stem, stats: entry.stats, dirty: false }));
                    }
                    Err(e) => {
                        log::warn!("discarding unreadable disk record {}: {e}", path.display());
                        let _ = fsutil::remove_if_exists(&path);
                    }
                },
                _ => {}
            }
        }
        // Oldest first, so the most recently accessed record ends up most recent in the index.
        found.sort_by(|(_, a), (_, b)| {
            a.stats.last_accessed_at.cmp(&b.stats.last_accessed_at).then(a.stats.access_seq.cmp(&b.stats.access_seq))
        });
        let mut idx = self.index.lock();
        for (k, slot) in found {
            idx.put(k, slot);
        }
        if self.max_elements > 0 {
            while idx.len() > self.max_elements {
                let Some((_, slot)) = idx.pop_lru() else { break };
                let _ = fsutil::remove_if_exists(&self.path_for(&slot.stem));
            }
        }
        log::info!("disk store opened: dir={}, records={}", self.dir.display(), idx.len());
        Ok(())
    }

    fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.{RECORD_EXT}"))
    }

    fn read_entry(&self, path: &Path) -> Result<Entry<K, V>, CacheError> {
        let bytes = fs::read(path)?;
        decode_record(&bytes)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn max_elements(&self) -> usize {
        self.max_elements
    }

    /// Persists `entry`, replacing any record for the same key. When a new key
    /// would exceed the bound, the least recently used record is dropped.
    ///
    /// # Errors
    /// Returns a storage error if encoding, writing or evicting fails; the store
    /// is left unchanged in that case.
    pub fn put(&self, entry: &Entry<K, V>) -> Result<DiskPut<K, V>, CacheError> {
        self.put_sparing(entry, None)
    }

    /// Like [`put`](Self::put), but `spare` is never chosen as the record to
    /// drop. If `spare` is the only candidate the store runs one over its
    /// bound until the caller removes `spare`.
    ///
    /// # Errors
    /// As [`put`](Self::put).
    pub fn put_sparing(&self, entry: &Entry<K, V>, spare: Option<&K>) -> Result<DiskPut<K, V>, CacheError> {
        let stem = key_file_stem(&entry.key)?;
        let bytes = encode_record(entry)?;
        let path = self.path_for(&stem);

        let mut idx = self.index.lock();
        let existed = idx.contains(&entry.key);
        let previous = if existed {
            match self.read_entry(&path) {
                Ok(prev) => Some(prev),
                Err(e) => {
                    log::warn!("could not read previous disk record {}: {e}", path.display());
                    None
                }
            }
        } else {
            None
        };

        fsutil::write_atomic(&path, &bytes)?;

        let mut evicted = None;
        if !existed && self.max_elements > 0 && idx.len() >= self.max_elements {
            let victim = idx
                .iter()
                .rev()
                .find(|(k, _)| spare != Some(*k))
                .map(|(k, slot)| (k.clone(), slot.stem.clone()));
            if let Some((victim_key, victim_stem)) = victim {
                if let Err(e) = fsutil::remove_if_exists(&self.path_for(&victim_stem)) {
                    if let Err(undo) = fsutil::remove_if_exists(&path) {
                        log::warn!("could not roll back disk record {}: {undo}", path.display());
                    }
                    return Err(e.into());
                }
                idx.pop(&victim_key);
                evicted = Some(victim_key);
            }
        }
        idx.put(entry.key.clone(), DiskSlot { stem, stats: entry.stats, dirty: false });
        Ok(DiskPut { previous, evicted })
    }

    /// Reads an entry and refreshes its last access time.
    ///
    /// A record whose file vanished is dropped from the index and reported as
    /// absent.
    ///
    /// # Errors
    /// Returns a storage error if the record cannot be read or decoded.
    pub fn get(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError> {
        let mut idx = self.index.lock();
        let Some(slot) = idx.get_mut(key) else { return Ok(None) };
        let path = self.path_for(&slot.stem);
        let entry = match fs::read(&path) {
            Ok(bytes) => decode_record::<K, V>(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("disk record {} disappeared, dropping from index", path.display());
                idx.pop(key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        slot.stats.last_accessed_at = self.clock.now();
        slot.dirty = true;
        Ok(Some(Entry::new(entry.key, entry.value, slot.stats)))
    }

    /// Reads an entry without touching access metadata or recency.
    ///
    /// # Errors
    /// Returns a storage error if the record cannot be read or decoded.
    pub fn peek(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError> {
        let idx = self.index.lock();
        let Some(slot) = idx.peek(key) else { return Ok(None) };
        let entry = self.read_entry(&self.path_for(&slot.stem))?;
        Ok(Some(Entry::new(entry.key, entry.value, slot.stats)))
    }

    #[must_use]
    pub fn stats_of(&self, key: &K) -> Option<EntryStats> {
        self.index.lock().peek(key).map(|slot| slot.stats)
    }

    /// # Errors
    /// Returns a storage error if the record file cannot be deleted; the entry
    /// then stays in the store.
    pub fn remove(&self, key: &K) -> Result<bool, CacheError> {
        let mut idx = self.index.lock();
        let Some(slot) = idx.peek(key) else { return Ok(false) };
        fsutil::remove_if_exists(&self.path_for(&slot.stem))?;
        idx.pop(key);
        Ok(true)
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.index.lock().contains(key)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.index.lock().len()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.index.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Removes every record. Records that could not be deleted stay indexed.
    ///
    /// # Errors
    /// Returns the first deletion failure.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut idx = self.index.lock();
        let mut removed = Vec::new();
        let mut first_err = None;
        for (k, slot) in idx.iter() {
            match fsutil::remove_if_exists(&self.path_for(&slot.stem)) {
                Ok(()) => removed.push(k.clone()),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(CacheError::from(e));
                    }
                }
            }
        }
        for k in &removed {
            idx.pop(k);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(removed.len()),
        }
    }

    /// Rewrites records whose access metadata changed since they were written.
    ///
    /// # Errors
    /// Returns the first failure; remaining dirty records are still attempted.
    pub fn flush(&self) -> Result<usize, CacheError> {
        let mut idx = self.index.lock();
        let mut written = 0usize;
        let mut first_err = None;
        for (_, slot) in idx.iter_mut() {
            if !slot.dirty {
                continue;
            }
            let path = self.path_for(&slot.stem);
            let res = self.read_entry(&path).and_then(|mut entry| {
                entry.stats = slot.stats;
                let bytes = encode_record(&entry)?;
                fsutil::write_atomic(&path, &bytes).map_err(CacheError::from)
            });
            match res {
                Ok(()) => {
                    slot.dirty = false;
                    written += 1;
                }
                Err(e) => {
                    log::warn!("flush of {} failed: {e}", path.display());
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Keys whose metadata is expired at `now`.
    ///
    /// The index is scanned from its least recently used end, releasing the
    /// lock after every `SCAN_CHUNK` entries. Records promoted or removed
    /// while the scan runs may shift past it or be reported twice; the next
    /// scan picks up anything missed.
    #[must_use]
    pub fn expired_keys(&self, policy: &ExpiryPolicy, now: Timestamp) -> Vec<K> {
        let mut expired = Vec::new();
        if policy.never_expires() {
            return expired;
        }
        let mut offset = 0;
        loop {
            let idx = self.index.lock();
            let mut seen = 0;
            for (k, slot) in idx.iter().rev().skip(offset).take(SCAN_CHUNK) {
                seen += 1;
                if policy.is_expired(&slot.stats, now) {
                    expired.push(k.clone());
                }
            }
            drop(idx);
            if seen < SCAN_CHUNK {
                return expired;
            }
            offset += SCAN_CHUNK;
        }
    }

    /// Removes `key` if it is still present and still expired.
    ///
    /// # Errors
    /// Returns a storage error if the record file cannot be deleted.
    pub fn remove_if_expired(&self, key: &K, policy: &ExpiryPolicy, now: Timestamp) -> Result<bool, CacheError> {
        let mut idx = self.index.lock();
        let stem = match idx.peek(key) {
            Some(slot) if policy.is_expired(&slot.stats, now) => slot.stem.clone(),
            _ => return Ok(false),
        };
        fsutil::remove_if_exists(&self.path_for(&stem))?;
        idx.pop(key);
        Ok(true)
    }

    /// One expiry sweep. The lock is held for one chunk of the scan or one
    /// removal at a time, so foreground calls interleave with a long sweep.
    pub fn purge_expired(&self, policy: &ExpiryPolicy) -> PurgeReport<K> {
        let now = self.clock.now();
        let mut report = PurgeReport::default();
        for key in self.expired_keys(policy, now) {
            match self.remove_if_expired(&key, policy, now) {
                Ok(true) => report.removed.push(key),
                Ok(false) => {}
                Err(e) => report.failed.push((key, e)),
            }
        }
        report
    }
}

impl<K, V> std::fmt::Debug for DiskStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStore")
            .field("dir", &self.dir)
            .field("max_elements", &self.max_elements)
            .finish_non_exhaustive()
    }
}
