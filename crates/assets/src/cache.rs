use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sysinfo::Disks;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not enough free space in {dir}: {available} bytes available, {required} required")]
    InsufficientSpace {
        dir: PathBuf,
        available: u64,
        required: u64,
    },

    #[error("staged file {name} ({size} bytes) exceeds the cache cap of {cap} bytes")]
    ExceedsCap { name: String, size: u64, cap: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reports free bytes on the volume backing a directory.
pub trait SpaceProbe: Send + Sync {
    fn available_bytes(&self, dir: &Path) -> io::Result<u64>;
}

/// `SpaceProbe` backed by the mounted disk list from `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskSpaceProbe;

impl SpaceProbe for DiskSpaceProbe {
    fn available_bytes(&self, dir: &Path) -> io::Result<u64> {
        let dir = dir.canonicalize()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| dir.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no mounted disk contains {}", dir.display()),
                )
            })
    }
}

/// A video copied into the cache, ready for the playback engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedVideo {
    pub path: PathBuf,
    pub size: u64,
}

/// Bounded staging directory for video files.
///
/// Each call to [`VideoCache::stage`] empties the directory, checks free
/// space, copies the new item in and finally trims the directory back under
/// `max_bytes`, keeping the most recently modified files.
pub struct VideoCache {
    root: PathBuf,
    max_bytes: u64,
    min_free_bytes: u64,
    probe: Box<dyn SpaceProbe>,
    sequence: AtomicU64,
}

impl VideoCache {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64, min_free_bytes: u64) -> Self {
        Self::with_probe(root, max_bytes, min_free_bytes, Box::new(DiskSpaceProbe))
    }

    pub fn with_probe(
        root: impl Into<PathBuf>,
        max_bytes: u64,
        min_free_bytes: u64,
        probe: Box<dyn SpaceProbe>,
    ) -> Self {
        Self {
            root: root.into(),
            max_bytes,
            min_free_bytes,
            probe,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage(&self, name: &str, reader: &mut dyn Read) -> Result<StagedVideo, CacheError> {
        fs::create_dir_all(&self.root)?;
        let removed = self.clear()?;
        tracing::debug!(removed, dir = %self.root.display(), "cleared video cache");

        let available = self.probe.available_bytes(&self.root)?;
        if available <= self.min_free_bytes {
            return Err(CacheError::InsufficientSpace {
                dir: self.root.clone(),
                available,
                required: self.min_free_bytes,
            });
        }

        let path = self.root.join(self.staged_name(name));
        let mut file = File::create(&path)?;
        let size = match io::copy(reader, &mut file) {
            Ok(size) => size,
            Err(err) => {
                drop(file);
                let _ = fs::remove_file(&path);
                return Err(err.into());
            }
        };
        file.sync_all()?;
        drop(file);

        self.enforce_cap()?;
        if !path.exists() {
            return Err(CacheError::ExceedsCap {
                name: name.to_string(),
                size,
                cap: self.max_bytes,
            });
        }

        tracing::debug!(path = %path.display(), size, "staged video");
        Ok(StagedVideo { path, size })
    }

    /// Removes every regular file in the cache directory. Returns the count.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for (path, _, _) in self.entries()? {
            fs::remove_file(&path)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Deletes the oldest files until the total size fits within the cap.
    ///
    /// Files are visited newest first and kept until the first one that would
    /// push the running total past `max_bytes`; that file and every older one
    /// are removed. Returns the paths that were deleted.
    pub fn enforce_cap(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut entries = self.entries()?;
        entries.sort_by(|a, b| b.2.cmp(&a.2));

        let mut retained = 0u64;
        let mut full = false;
        let mut evicted = Vec::new();
        for (path, size, _) in entries {
            if !full && retained + size <= self.max_bytes {
                retained += size;
                continue;
            }
            full = true;
            fs::remove_file(&path)?;
            tracing::debug!(path = %path.display(), size, "evicted cached video");
            evicted.push(path);
        }
        Ok(evicted)
    }

    /// Total bytes currently held in the cache directory.
    pub fn total_bytes(&self) -> Result<u64, CacheError> {
        Ok(self.entries()?.iter().map(|(_, size, _)| size).sum())
    }

    fn entries(&self) -> Result<Vec<(PathBuf, u64, SystemTime)>, CacheError> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
            entries.push((entry.path(), metadata.len(), modified));
        }
        Ok(entries)
    }

    fn staged_name(&self, name: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        match Path::new(name).extension().and_then(|ext| ext.to_str()) {
            Some(ext) => format!("temp_{millis}_{sequence}.{}", ext.to_ascii_lowercase()),
            None => format!("temp_{millis}_{sequence}"),
        }
    }
}
