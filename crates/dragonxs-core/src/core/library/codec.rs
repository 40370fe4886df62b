use super::model::XsLibrary;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryIoError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse library '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to encode library '{path}': {source}")]
    Encode {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

/// Reads and writes cross-section libraries in one on-disk format.
pub trait LibraryCodec: Send + Sync {
    fn read(&self, path: &Path) -> Result<XsLibrary, LibraryIoError>;
    fn write(&self, library: &XsLibrary, path: &Path) -> Result<(), LibraryIoError>;
}

/// Libraries stored as TOML documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlLibraryCodec;

impl LibraryCodec for TomlLibraryCodec {
    fn read(&self, path: &Path) -> Result<XsLibrary, LibraryIoError> {
        let content = std::fs::read_to_string(path).map_err(|e| LibraryIoError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| LibraryIoError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn write(&self, library: &XsLibrary, path: &Path) -> Result<(), LibraryIoError> {
        let content = toml::to_string(library).map_err(|e| LibraryIoError::Encode {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, content).map_err(|e| LibraryIoError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
