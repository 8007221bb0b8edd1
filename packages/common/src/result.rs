use crate::error::FsError;

/// Common Result type alias
pub type FsResult<T> = Result<T, FsError>;
