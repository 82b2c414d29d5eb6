use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use vendedor_core::errors::ApplicationError;

pub mod file;
pub mod memory;
pub mod sql;

pub use file::FileDocumentStore;
pub use memory::InMemoryDocumentStore;
pub use sql::SqlDocumentStore;

/// Top-level partitions of the durable store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Conversations,
    Carts,
    Sessions,
}

impl Namespace {
    pub const ALL: [Namespace; 3] =
        [Namespace::Conversations, Namespace::Carts, Namespace::Sessions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversations => "conversations",
            Self::Carts => "carts",
            Self::Sessions => "sessions",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid document key `{0}`")]
    InvalidKey(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

/// Whole-document JSON storage keyed by `(namespace, key)`.
///
/// There is no partial update: `put` replaces the document. Callers that
/// read-modify-write must serialize per key themselves (see [`crate::locks`]).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>, RepositoryError>;
    async fn put(&self, namespace: Namespace, key: &str, document: &Value)
        -> Result<(), RepositoryError>;
    /// Returns whether a document was removed.
    async fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, RepositoryError>;
    async fn keys(&self, namespace: Namespace) -> Result<Vec<String>, RepositoryError>;
}

pub(crate) fn validate_key(key: &str) -> Result<(), RepositoryError> {
    if key.trim().is_empty() || key.contains('\0') {
        return Err(RepositoryError::InvalidKey(key.to_string()));
    }
    Ok(())
}
