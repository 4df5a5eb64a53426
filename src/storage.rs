//! Generated-files directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Flat store for rendered workbooks, rooted at one directory. Names are
/// produced by the filename deriver; saving an existing name replaces the
/// previous artifact.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn open(root: &Path) -> AppResult<ArtifactStore> {
        fs::create_dir_all(root)
            .map_err(|err| AppError::Storage(format!("{}: {err}", root.display())))?;
        Ok(ArtifactStore {
            root: root.to_path_buf(),
        })
    }

    pub fn save(&self, name: &str, bytes: &[u8]) -> AppResult<()> {
        fs::write(self.root.join(name), bytes)
            .map_err(|err| AppError::Storage(format!("{name}: {err}")))
    }

    pub fn read(&self, name: &str) -> AppResult<Vec<u8>> {
        fs::read(self.root.join(name)).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound("Fichier Excel non trouvé"),
            _ => AppError::Storage(format!("{name}: {err}")),
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }
}
