use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("corrupt archive {}: {message}", path.display())]
    CorruptArchive { path: PathBuf, message: String },

    #[error("I/O error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown dataset family tag '{tag}'")]
    UnknownCategory { tag: String },

    #[error("invalid catalog configuration: {message}")]
    InvalidConfig { message: String },
}

impl CatalogError {
    /// Classifies a raw I/O failure at `path` into the catalog taxonomy.
    pub fn from_io(path: impl AsRef<Path>, err: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source: err },
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Short machine-readable label, used in report failure entries.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::CorruptArchive { .. } => "corrupt_archive",
            Self::Io { .. } => "io_error",
            Self::UnknownCategory { .. } => "unknown_category",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::io;

    use super::CatalogError;

    #[test]
    fn io_errors_map_onto_taxonomy() {
        let missing = CatalogError::from_io("/nope", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(missing, CatalogError::NotFound { .. }));

        let denied = CatalogError::from_io(
            "/locked",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(denied.kind_label(), "permission_denied");

        let other = CatalogError::from_io("/full", io::Error::other("disk full"));
        assert!(matches!(other, CatalogError::Io { .. }));
        assert_eq!(other.to_string(), "I/O error at /full");
        assert_eq!(
            other.source().map(ToString::to_string).as_deref(),
            Some("disk full")
        );
    }
}
