//! Content-addressed cache for optimized images.
//!
//! Each entry is keyed by the SHA-256 of the optimizer fingerprint and the
//! original file contents, so renaming a file keeps its entry and changing
//! the optimizer settings invalidates every entry.
//!
//! # Layout
//!
//! ```text
//! .assetflow-cache/
//!   manifest.json
//!   objects/
//!     3f/3fa9...   optimized bytes
//! ```
//!
//! The manifest is JSON:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "3fa9...": { "source": "logo.png", "original_size": 4096, "optimized_size": 2810 }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Current manifest format version.
const CACHE_VERSION: u32 = 1;

/// Manifest filename inside the cache directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Error during cache operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON error
    #[error("Cache manifest error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Metadata about one cached object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Source path the entry was first created for
    pub source: String,
    pub original_size: u64,
    pub optimized_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheManifest {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

impl Default for CacheManifest {
    fn default() -> Self {
        Self { version: CACHE_VERSION, entries: BTreeMap::new() }
    }
}

/// Image cache rooted at a directory.
#[derive(Debug)]
pub struct ImageCache {
    dir: PathBuf,
    manifest: CacheManifest,
    dirty: bool,
}

impl ImageCache {
    /// Open the cache in `dir`, starting empty if there is none yet.
    ///
    /// A manifest that does not parse, or was written by another format
    /// version, is discarded.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        let path = dir.join(MANIFEST_FILENAME);
        let manifest = if path.exists() {
            match serde_json::from_reader::<_, CacheManifest>(BufReader::new(File::open(&path)?)) {
                Ok(manifest) if manifest.version == CACHE_VERSION => manifest,
                Ok(manifest) => {
                    tracing::warn!(
                        found = manifest.version,
                        expected = CACHE_VERSION,
                        "discarding image cache with unknown version"
                    );
                    CacheManifest::default()
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "discarding unreadable image cache manifest");
                    CacheManifest::default()
                }
            }
        } else {
            CacheManifest::default()
        };

        Ok(Self { dir: dir.to_path_buf(), manifest, dirty: false })
    }

    /// Cache key for `contents` processed by an optimizer with `fingerprint`.
    pub fn key(fingerprint: &str, contents: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        hasher.update([0u8]);
        hasher.update(contents);
        format!("{:x}", hasher.finalize())
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let shard = key.get(..2).unwrap_or(key);
        self.dir.join("objects").join(shard).join(key)
    }

    /// Cached optimized bytes, if present.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.manifest.entries.get(key)?;
        fs::read(self.object_path(key)).ok()
    }

    /// Metadata of an entry.
    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.manifest.entries.get(key)
    }

    /// Store optimized bytes.
    pub fn insert(
        &mut self,
        key: &str,
        source: &str,
        original_size: u64,
        optimized: &[u8],
    ) -> Result<(), CacheError> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, optimized)?;

        self.manifest.entries.insert(
            key.to_string(),
            CacheEntry {
                source: source.to_string(),
                original_size,
                optimized_size: optimized.len() as u64,
            },
        );
        self.dirty = true;
        Ok(())
    }

    /// Write the manifest if entries were added.
    pub fn save(&mut self) -> Result<(), CacheError> {
        if !self.dirty {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        let writer = BufWriter::new(File::create(self.dir.join(MANIFEST_FILENAME))?);
        serde_json::to_writer_pretty(writer, &self.manifest)?;
        self.dirty = false;
        Ok(())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.manifest.entries.len()
    }

    /// Whether the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.manifest.entries.is_empty()
    }

    /// Bytes saved across all entries.
    pub fn bytes_saved(&self) -> u64 {
        self.manifest
            .entries
            .values()
            .map(|e| e.original_size.saturating_sub(e.optimized_size))
            .sum()
    }

    /// Delete the cache directory. Returns whether there was one.
    pub fn clear(dir: &Path) -> Result<bool, CacheError> {
        match fs::remove_dir_all(dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
