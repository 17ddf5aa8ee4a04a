use thiserror::Error;

use crate::dataset::DatasetError;

/// Typed failures of the filesystem engine. The transport adapter maps
/// these onto platform errnos; `InvalidEdit` is recovered inside the engine
/// and never crosses that boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FsError {
    #[error("no such entry")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("operation not supported")]
    Unsupported,
    #[error("edit rejected")]
    InvalidEdit,
    #[error("internal error: {0}")]
    Internal(String),
}

pub type FsResult<T> = Result<T, FsError>;

/// Dataset-level failures never leak raw: unknown names surface as
/// `NotFound`, everything else as `Unsupported`.
impl From<DatasetError> for FsError {
    fn from(e: DatasetError) -> Self {
        match e {
            DatasetError::NoSuchVariable(_)
            | DatasetError::NoSuchAttribute(_)
            | DatasetError::NoSuchDimension(_) => FsError::NotFound,
            DatasetError::NameInUse(_)
            | DatasetError::InvalidName(_)
            | DatasetError::ShapeMismatch { .. } => FsError::Unsupported,
        }
    }
}
