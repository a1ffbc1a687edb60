//! In-memory notebook storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use cellbook_core::{
    Notebook, NotebookId,
    notebook::now,
    traits::{NotebookPatch, NotebookStorage, StorageError},
};
use uuid::Uuid;

/// In-memory storage implementation.
///
/// Useful for tests and single-process embedding. Data is lost on
/// restart.
pub struct MemoryNotebookStorage {
    notebooks: RwLock<HashMap<NotebookId, Notebook>>,
}

impl MemoryNotebookStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            notebooks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryNotebookStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotebookStorage for MemoryNotebookStorage {
    async fn list(&self) -> Result<Vec<Notebook>, StorageError> {
        let notebooks = self
            .notebooks
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let mut result: Vec<Notebook> = notebooks.values().cloned().collect();
        // Newest first.
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn get(&self, id: &str) -> Result<Option<Notebook>, StorageError> {
        Ok(self
            .notebooks
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(id)
            .cloned())
    }

    async fn create(&self, title: &str) -> Result<Notebook, StorageError> {
        let notebook = Notebook::new(Uuid::new_v4().to_string(), title);

        self.notebooks
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(notebook.id.clone(), notebook.clone());

        Ok(notebook)
    }

    async fn update(&self, id: &str, patch: NotebookPatch) -> Result<Notebook, StorageError> {
        let mut notebooks = self
            .notebooks
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let notebook = notebooks
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        if let Some(title) = patch.title {
            notebook.title = title;
        }
        if let Some(cells) = patch.cells {
            notebook.cells = cells;
        }
        notebook.updated_at = now();

        Ok(notebook.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let removed = self
            .notebooks
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .remove(id);

        match removed {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }
}
