/// Errors surfaced by repository and filesystem operations.
///
/// Operations return `anyhow::Result`; a failure that falls into one of these
/// kinds carries the variant in its chain, recoverable with
/// `err.downcast_ref::<RepositoryError>()`. Backing-store failures outside
/// the taxonomy are propagated as plain `anyhow` errors with context.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0} was not found")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("filesystem is read-only")]
    ReadOnly,
}
