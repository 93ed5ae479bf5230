use std::io;
use std::path::PathBuf;

/// Errors reported by the index and catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot open {path}: {source}")]
    BadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("write error: {0}")]
    Write(#[source] io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("premature end of stream")]
    PrematureEof,

    #[error("invalid data: {0}")]
    BadData(&'static str),

    #[error("index capacity exceeded: {0}")]
    Overflow(&'static str),

    #[error("entry is inside an archive and cannot be modified: {0}")]
    ReadOnly(String),
}

/// Outcome of loading a persisted memory index.
///
/// `DoesNotExist` is not fatal; callers use it to trigger a first-time build,
/// while the other variants indicate an index that is present but unusable
/// (prompt for a rebuild).
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("index file does not exist")]
    DoesNotExist,

    #[error("premature end of index file")]
    PrematureEof,

    #[error("unsupported index version {0:#06x}")]
    UnsupportedVersion(u16),

    #[error("corrupted index file: {0}")]
    BadData(&'static str),

    #[error("index larger than the configured arena: {0}")]
    Overflow(&'static str),

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for LoadError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => LoadError::DoesNotExist,
            io::ErrorKind::UnexpectedEof => LoadError::PrematureEof,
            _ => LoadError::Io(error),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
