use thiserror::Error;

/// Failures raised by the storage backend: opening, closing, building options,
/// constructing contexts and creating schema.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("connection is not open")]
    NotOpen,
    #[error(transparent)]
    External(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl BackendError {
    pub fn external(
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::External(err.into())
    }
}

/// Outcome of a test run. `E` is whatever the setup and body callables fail
/// with; it is handed back untouched in [`Error::Failed`].
#[derive(Error, Debug)]
pub enum Error<E> {
    #[error("a test body is required")]
    MissingTestBody,
    #[error("test run was cancelled")]
    Cancelled,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Failed(E),
}

impl<E> Error<E> {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the setup or body failure, if that is what this is.
    #[must_use]
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

pub type HarnessResult<T, E> = Result<T, Error<E>>;
