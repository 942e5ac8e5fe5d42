use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Error produced by a fetcher.
///
/// Shared by every waiter of an attempt and by [`QueryCache::peek_error`]; the
/// cache hands out the fetcher's own error without wrapping it.
///
/// [`QueryCache::peek_error`]: super::QueryCache::peek_error
pub type FetchError = Arc<dyn StdError + Send + Sync + 'static>;

/// Failures that originate in the cache itself rather than in a fetcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("fetch attempt for `{key}` ended without a result")]
    Abandoned { key: String },
    #[error("cached value for `{key}` has an unexpected type")]
    TypeMismatch { key: String },
}

impl QueryError {
    pub fn abandoned(key: impl Into<String>) -> Self {
        Self::Abandoned { key: key.into() }
    }

    pub fn type_mismatch(key: impl Into<String>) -> Self {
        Self::TypeMismatch { key: key.into() }
    }

    pub(crate) fn shared(self) -> FetchError {
        Arc::new(self)
    }
}
