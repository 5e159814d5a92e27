//! Content-addressed local object vault for downloaded images.
//!
//! Objects are plain files named by their [`ObjectKey`]. An entry is
//! created exactly once per key and never mutated afterwards: writes land
//! in a temp file first and are linked into place, so a partially written
//! object can never surface under its final name, and a second writer of
//! the same key is reported as [`PutOutcome::AlreadyPresent`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use walkdir::WalkDir;

use snapvault_shared::{ObjectKey, Result, SnapvaultError};

use crate::PutOutcome;

/// Extensions recognized when scanning the vault for indexable images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Monotonic suffix so concurrent writers never share a temp file.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Handle on the vault directory.
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    /// Open the vault at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| SnapvaultError::io(&root, e))?;
        Ok(Self { root })
    }

    /// The vault directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a key's object lives at (whether or not it exists yet).
    pub fn object_path(&self, key: &ObjectKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Whether an entry for `key` has been committed, by this process or
    /// any earlier one.
    pub fn exists(&self, key: &ObjectKey) -> bool {
        self.object_path(key).exists()
    }

    /// Commit `bytes` under `key`. An existing entry is left untouched
    /// and reported as [`PutOutcome::AlreadyPresent`]; there is no code
    /// path that overwrites a committed object.
    pub fn put(&self, key: &ObjectKey, bytes: &[u8]) -> Result<PutOutcome> {
        let target = self.object_path(key);
        if target.exists() {
            return Ok(PutOutcome::AlreadyPresent);
        }

        let tmp = self.root.join(format!(
            ".{}.{}.{}.part",
            key.as_str(),
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&tmp, bytes).map_err(|e| SnapvaultError::io(&tmp, e))?;

        // hard_link refuses an existing target, making commit an atomic
        // create-if-absent even across racing processes.
        let linked = std::fs::hard_link(&tmp, &target);
        let _ = std::fs::remove_file(&tmp);

        match linked {
            Ok(()) => Ok(PutOutcome::Created),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(PutOutcome::AlreadyPresent)
            }
            Err(e) => Err(SnapvaultError::io(&target, e)),
        }
    }

    /// Enumerate every image object currently in the vault. Re-run in
    /// full each round; results carry no ordering guarantee.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| {
                SnapvaultError::io(&self.root, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if is_image(&path) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// Extension filter for indexable files.
fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
