//! On-disk cache of load results.
//!
//! A load result is stored next to the root file, at `.<root>.cache`, keyed
//! by a fingerprint of every file in the include closure: its path,
//! modification time and size. A blob is used only while the fingerprint
//! still matches the filesystem and names the root it was built for.
//!
//! # Format
//!
//! A fixed header (magic, format version, SHA-256 of the payload, payload
//! length) followed by the `MessagePack` encoded [`CacheEntry`].
//!
//! Blobs are replaced atomically: the new blob is written to a temporary
//! file in the same directory and renamed over the old one.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

use beanroot_core::{Directive, Options};

use crate::LoadError;

/// Magic bytes at the start of every blob.
const CACHE_MAGIC: &[u8; 8] = b"BEANROOT";

/// Blob format version. Bump when [`CacheEntry`] changes shape.
pub const CACHE_VERSION: u32 = 2;

/// Modification time and size of one file, or `None` for both when it did
/// not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    /// Absolute path.
    pub path: PathBuf,
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Length in bytes.
    pub size: Option<u64>,
}

impl FileStamp {
    /// Stamp `path` as it is now.
    #[must_use]
    pub fn of(path: &Path) -> Self {
        let metadata = fs::metadata(path).ok();
        Self {
            path: path.to_path_buf(),
            modified: metadata.as_ref().and_then(|m| m.modified().ok()),
            size: metadata.as_ref().map(fs::Metadata::len),
        }
    }

    /// True if the file still looks the same.
    #[must_use]
    pub fn is_current(&self) -> bool {
        *self == Self::of(&self.path)
    }
}

/// What a cached result depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Identifies the code that produced the result.
    pub tag: String,
    /// Every file of the closure, including includes that were missing.
    pub files: Vec<FileStamp>,
}

impl Fingerprint {
    /// Stamp `paths` now.
    pub fn capture<'a>(tag: impl Into<String>, paths: impl IntoIterator<Item = &'a Path>) -> Self {
        Self {
            tag: tag.into(),
            files: paths.into_iter().map(FileStamp::of).collect(),
        }
    }

    /// True if the result is still valid for `root` under `tag`.
    #[must_use]
    pub fn is_valid_for(&self, root: &Path, tag: &str) -> bool {
        self.tag == tag
            && self.files.iter().any(|f| f.path == root)
            && self.files.iter().all(FileStamp::is_current)
    }
}

/// A stored load result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// What the result depends on.
    pub fingerprint: Fingerprint,
    /// Directives after the pipeline.
    pub directives: Vec<Directive>,
    /// Errors from every phase.
    pub errors: Vec<LoadError>,
    /// Aggregated options.
    pub options: Options,
}

/// Header stored before the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheHeader {
    magic: [u8; 8],
    version: u32,
    hash: [u8; 32],
    data_len: u64,
}

impl CacheHeader {
    const SIZE: usize = 8 + 4 + 32 + 8;

    fn for_payload(payload: &[u8]) -> Self {
        Self {
            magic: *CACHE_MAGIC,
            version: CACHE_VERSION,
            hash: Sha256::digest(payload).into(),
            data_len: payload.len() as u64,
        }
    }

    fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.magic);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..44].copy_from_slice(&self.hash);
        buf[44..52].copy_from_slice(&self.data_len.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            magic: bytes[0..8].try_into().ok()?,
            version: u32::from_le_bytes(bytes[8..12].try_into().ok()?),
            hash: bytes[12..44].try_into().ok()?,
            data_len: u64::from_le_bytes(bytes[44..52].try_into().ok()?),
        })
    }
}

/// Where the blob for `root` lives.
#[must_use]
pub fn cache_path(root: &Path) -> PathBuf {
    let name = root.file_name().map_or_else(
        || ".ledger.cache".to_string(),
        |n| format!(".{}.cache", n.to_string_lossy()),
    );
    root.with_file_name(name)
}

/// Encode `entry` as a blob.
pub fn encode_entry(entry: &CacheEntry) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    let payload = rmp_serde::to_vec_named(entry)?;
    let mut blob = Vec::with_capacity(CacheHeader::SIZE + payload.len());
    blob.extend_from_slice(&CacheHeader::for_payload(&payload).to_bytes());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Decode a blob, or `None` if it is truncated, corrupt or from another
/// format version.
#[must_use]
pub fn decode_entry(blob: &[u8]) -> Option<CacheEntry> {
    let header = CacheHeader::from_bytes(blob)?;
    if header.magic != *CACHE_MAGIC || header.version != CACHE_VERSION {
        return None;
    }
    let payload = blob.get(CacheHeader::SIZE..)?;
    if payload.len() as u64 != header.data_len || header != CacheHeader::for_payload(payload) {
        return None;
    }
    rmp_serde::from_slice(payload).ok()
}

/// Read the blob for `root`, whatever its fingerprint says.
#[must_use]
pub fn load_cache_entry(root: &Path) -> Option<CacheEntry> {
    let blob = fs::read(cache_path(root)).ok()?;
    decode_entry(&blob)
}

/// Atomically replace the blob for `root`.
pub fn save_cache_entry(root: &Path, entry: &CacheEntry) -> io::Result<()> {
    let blob = encode_entry(entry).map_err(io::Error::other)?;
    let target = cache_path(root);
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&blob)?;
    file.as_file().sync_all()?;
    file.persist(&target).map_err(|e| e.error)?;
    Ok(())
}

/// Remove the blob for `root`, if any.
pub fn invalidate_cache(root: &Path) {
    let _ = fs::remove_file(cache_path(root));
}

/// Digest of the files in `paths` as they are now.
#[must_use]
pub fn compute_input_hash<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for path in paths {
        let stamp = FileStamp::of(Path::new(path));
        hasher.update(path.as_bytes());
        hasher.update([0]);
        if let (Some(modified), Some(size)) = (stamp.modified, stamp.size) {
            if let Ok(since) = modified.duration_since(SystemTime::UNIX_EPOCH) {
                hasher.update(since.as_secs().to_le_bytes());
                hasher.update(since.subsec_nanos().to_le_bytes());
            }
            hasher.update(size.to_le_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// True if the files behind `options` changed since they were loaded.
///
/// Also true when the options carry no digest or no files, as for text
/// loaded from memory, when any file has moved away, and when an include
/// that was missing has since been created.
#[must_use]
pub fn needs_refresh(options: &Options) -> bool {
    let Some(hash) = &options.input_hash else {
        return true;
    };
    if options.include.is_empty() || !options.include.iter().all(|p| Path::new(p).exists()) {
        return true;
    }
    compute_input_hash(watched_paths(options)) != *hash
}

/// The include closure followed by the includes that were missing.
pub(crate) fn watched_paths(options: &Options) -> impl Iterator<Item = &str> {
    options
        .include
        .iter()
        .chain(&options.missing_includes)
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beanroot_core::{Amount, Posting, Transaction};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn entry(root: &Path) -> CacheEntry {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let txn = Transaction::new(date, "Groceries")
            .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(42.10), "USD")))
            .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-42.10), "USD")));
        CacheEntry {
            fingerprint: Fingerprint::capture("test", [root]),
            directives: vec![Directive::Transaction(txn)],
            errors: vec![LoadError::PluginLoad {
                name: "missing".to_string(),
            }],
            options: Options::new(),
        }
    }

    #[test]
    fn test_cache_header_roundtrip() {
        let header = CacheHeader::for_payload(b"payload");
        assert_eq!(CacheHeader::from_bytes(&header.to_bytes()), Some(header));
        assert_eq!(CacheHeader::from_bytes(&[0; 10]), None);
    }

    #[test]
    fn test_cache_path() {
        assert_eq!(
            cache_path(Path::new("/tmp/ledger.beancount")),
            Path::new("/tmp/.ledger.beancount.cache")
        );
        assert_eq!(cache_path(Path::new("/")), Path::new("/.ledger.cache"));
    }

    #[test]
    fn test_blob_is_stable_across_save_and_load() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("main.beancount");
        fs::write(&root, "2024-01-01 open Assets:Cash\n").unwrap();

        let original = entry(&root);
        save_cache_entry(&root, &original).unwrap();
        let first = fs::read(cache_path(&root)).unwrap();

        let loaded = load_cache_entry(&root).unwrap();
        assert_eq!(loaded, original);
        save_cache_entry(&root, &loaded).unwrap();
        assert_eq!(fs::read(cache_path(&root)).unwrap(), first);
    }

    #[test]
    fn test_corrupt_blob_is_rejected() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("main.beancount");
        fs::write(&root, "").unwrap();

        let mut blob = encode_entry(&entry(&root)).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert!(decode_entry(&blob).is_none());
        assert!(decode_entry(&blob[..CacheHeader::SIZE + 3]).is_none());
        blob[0] = b'X';
        assert!(decode_entry(&blob).is_none());
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("main.beancount");
        let missing = dir.path().join("later.beancount");
        fs::write(&root, "").unwrap();

        let fingerprint = Fingerprint::capture("v1", [root.as_path(), missing.as_path()]);
        assert!(fingerprint.is_valid_for(&root, "v1"));
        assert!(!fingerprint.is_valid_for(&root, "v2"));
        assert!(!fingerprint.is_valid_for(&missing.with_file_name("other"), "v1"));

        fs::write(&missing, "").unwrap();
        assert!(!fingerprint.is_valid_for(&root, "v1"));
    }

    #[test]
    fn test_created_include_changes_the_digest() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("main.beancount");
        let later = dir.path().join("later.beancount");
        fs::write(&root, "").unwrap();

        let mut options = Options::new();
        options.add_include(&root.display().to_string());
        options.missing_includes.push(later.display().to_string());
        options.input_hash = Some(compute_input_hash(watched_paths(&options)));
        assert!(!needs_refresh(&options));

        fs::write(&later, "").unwrap();
        assert!(needs_refresh(&options));
    }

    #[test]
    fn test_invalidate_cache() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("main.beancount");
        fs::write(&root, "").unwrap();
        save_cache_entry(&root, &entry(&root)).unwrap();
        assert!(cache_path(&root).exists());
        invalidate_cache(&root);
        assert!(!cache_path(&root).exists());
    }
}
