//! Notebook storage over the persistence API.

use async_trait::async_trait;
use cellbook_core::{
    Notebook,
    traits::{NotebookPatch, NotebookStorage, StorageError},
};
use serde::Serialize;

/// Notebook storage backed by the REST persistence API.
pub struct HttpNotebookStorage {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotebookStorage {
    /// Create a storage client rooted at the given API base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn request_error(e: reqwest::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

async fn check_status(
    response: reqwest::Response,
    id: &str,
) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(id.to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StorageError::Internal(format!("status {status}: {body}")));
    }
    Ok(response)
}

#[async_trait]
impl NotebookStorage for HttpNotebookStorage {
    async fn list(&self) -> Result<Vec<Notebook>, StorageError> {
        let response = self
            .client
            .get(self.url("/notebooks"))
            .send()
            .await
            .map_err(request_error)?;
        check_status(response, "")
            .await?
            .json()
            .await
            .map_err(request_error)
    }

    async fn get(&self, id: &str) -> Result<Option<Notebook>, StorageError> {
        let response = self
            .client
            .get(self.url(&format!("/notebooks/{id}")))
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(response, id)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(request_error)
    }

    async fn create(&self, title: &str) -> Result<Notebook, StorageError> {
        #[derive(Serialize)]
        struct CreateBody<'a> {
            title: &'a str,
        }

        let response = self
            .client
            .post(self.url("/notebooks"))
            .json(&CreateBody { title })
            .send()
            .await
            .map_err(request_error)?;
        check_status(response, "")
            .await?
            .json()
            .await
            .map_err(request_error)
    }

    async fn update(&self, id: &str, patch: NotebookPatch) -> Result<Notebook, StorageError> {
        let response = self
            .client
            .put(self.url(&format!("/notebooks/{id}")))
            .json(&patch)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response, id)
            .await?
            .json()
            .await
            .map_err(request_error)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(self.url(&format!("/notebooks/{id}")))
            .send()
            .await
            .map_err(request_error)?;
        check_status(response, id).await?;
        Ok(())
    }
}
