//! VFS error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use xvfs_kernel::XStatus;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path resolution failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write-class access requested on read-only media.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Out-of-bounds offset/length or other bad argument.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The disc image's on-disc structures could not be parsed.
    #[error("malformed disc image: {0}")]
    MalformedImage(String),

    /// The host mapping could not be established.
    #[error("failed to map {}: {source}", path.display())]
    MappingFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The entry does not support direct mapped access.
    #[error("entry cannot be mapped: {0}")]
    MappingUnsupported(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A device is already registered at this mount point.
    #[error("already mounted: {0}")]
    AlreadyMounted(String),

    /// No device is registered at this mount point.
    #[error("not mounted: {0}")]
    NotMounted(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AccessDenied error.
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a MalformedImage error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedImage(msg.into())
    }

    /// Create a MappingFailed error.
    pub fn mapping_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::MappingFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Fold into the closed status set reported to the guest.
    pub fn status(&self) -> XStatus {
        match self {
            VfsError::NotFound(_) | VfsError::NotADirectory(_) => XStatus::NotFound,
            VfsError::AccessDenied(_) => XStatus::AccessDenied,
            VfsError::InvalidParameter(_)
            | VfsError::MalformedImage(_)
            | VfsError::MappingUnsupported(_)
            | VfsError::AlreadyMounted(_)
            | VfsError::NotMounted(_) => XStatus::InvalidParameter,
            VfsError::MappingFailed { .. } | VfsError::Io(_) => XStatus::NotFound,
        }
    }
}

impl From<VfsError> for XStatus {
    fn from(e: VfsError) -> Self {
        e.status()
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AccessDenied(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            VfsError::InvalidParameter(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::MalformedImage(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            VfsError::MappingFailed { source, .. } => source,
            VfsError::MappingUnsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::AlreadyMounted(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::NotMounted(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::Io(e) => e,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
