//! Persistence trait for notebook documents.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notebook::{Cell, Notebook, NotebookId};

/// Partial notebook update for `NotebookStorage::update`.
///
/// Absent fields are left unchanged by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotebookPatch {
    /// New title, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Full replacement cell list, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cells: Option<Vec<Cell>>,
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Notebook not found: {0}")]
    NotFound(NotebookId),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for notebook persistence backends.
///
/// Consumed on load/save; not part of the execution path.
#[async_trait]
pub trait NotebookStorage: Send + Sync {
    /// List all notebooks.
    async fn list(&self) -> Result<Vec<Notebook>, StorageError>;

    /// Get a notebook by id.
    async fn get(&self, id: &str) -> Result<Option<Notebook>, StorageError>;

    /// Create a new notebook with the given title.
    async fn create(&self, title: &str) -> Result<Notebook, StorageError>;

    /// Apply a partial update, returning the updated notebook.
    async fn update(&self, id: &str, patch: NotebookPatch) -> Result<Notebook, StorageError>;

    /// Delete a notebook by id.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}
