//! Error taxonomy shared by the resolvers, builder and stores.

use std::sync::Arc;

use thiserror::Error;

/// A failure in an underlying store.
///
/// Cloneable so a single failed build can be reported to every waiter.
#[derive(Debug, Clone, Error)]
#[error("storage error: {message}")]
pub struct StorageError {
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    /// Creates a storage error without an underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage error wrapping its cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced by summary resolution and building.
#[derive(Debug, Clone, Error)]
pub enum SummaryError {
    /// Unrecognized range token or malformed explicit date.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// A non-owner asked for data older than the owner shares.
    #[error("requested range reaches further back than the {max_days} shared days")]
    RangeTooBroad { max_days: i64 },

    /// The referenced user or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
