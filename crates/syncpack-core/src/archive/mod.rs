//! On-disk store for completed packs.
//!
//! Packs live at `{exports_dir}/{operation_id}.usync`. Fetching a pack copies
//! it into a fresh per-operation working folder under `working_dir`, where
//! the step implementations unpack and read it.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ArchiveError;

/// File extension of archived packs.
pub const PACK_EXTENSION: &str = "usync";

/// Content-addressed pack storage keyed by operation id.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    exports_dir: PathBuf,
    working_dir: PathBuf,
}

impl ArchiveStore {
    pub fn new(exports_dir: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            exports_dir: exports_dir.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Store using the standard layout under a content root.
    pub fn at_root(content_root: &Path) -> Self {
        Self::new(
            content_root.join("uSync").join("Exports"),
            content_root.join("uSync").join("Temp").join("Import"),
        )
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    /// Path of the archived pack for an operation.
    pub fn archive_path(&self, id: Uuid) -> PathBuf {
        self.exports_dir.join(format!("{}.{}", id, PACK_EXTENSION))
    }

    /// Working folder a fetched pack is copied into.
    pub fn working_folder(&self, id: Uuid) -> PathBuf {
        self.working_dir.join(id.to_string())
    }

    pub fn exists(&self, id: Uuid) -> bool {
        self.archive_path(id).is_file()
    }

    /// Write a pack to the exports folder, replacing any earlier archive of the same id.
    pub fn archive(&self, id: Uuid, mut stream: impl Read) -> Result<PathBuf, ArchiveError> {
        fs::create_dir_all(&self.exports_dir)?;

        let path = self.archive_path(id);
        let mut file = fs::File::create(&path)?;
        let bytes = std::io::copy(&mut stream, &mut file)?;
        file.sync_all()?;

        tracing::info!(operation_id = %id, bytes, path = ?path, "Archived pack");
        Ok(path)
    }

    /// Copy an archived pack into a fresh working folder and return the copy's path.
    ///
    /// Nothing is created when the pack does not exist.
    pub fn retrieve(&self, id: Uuid) -> Result<PathBuf, ArchiveError> {
        let source = self.archive_path(id);
        if !source.is_file() {
            return Err(ArchiveError::NotFound(id));
        }

        let folder = self.working_folder(id);
        if folder.exists() {
            fs::remove_dir_all(&folder)?;
        }
        fs::create_dir_all(&folder)?;

        let target = folder.join(format!("{}.{}", id, PACK_EXTENSION));
        fs::copy(&source, &target)?;

        tracing::debug!(operation_id = %id, target = ?target, "Retrieved pack");
        Ok(target)
    }

    /// Names (extension stripped) of every archived pack.
    ///
    /// Re-reads the exports folder on each call. A missing folder lists nothing.
    pub fn list(&self) -> impl Iterator<Item = String> {
        let entries = match fs::read_dir(&self.exports_dir) {
            Ok(entries) => Some(entries),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(dir = ?self.exports_dir, "Failed to list packs: {}", e);
                }
                None
            }
        };

        entries
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().is_some_and(|ext| ext == PACK_EXTENSION))
            .filter_map(|path| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
    }
}
