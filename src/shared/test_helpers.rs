use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use fake::faker::filesystem::en::FileName;
use fake::Fake;
use tokio::sync::oneshot;

use crate::core::config::UploadConfig;
use crate::core::error::{AppError, Result};
use crate::features::documents::models::SelectedFile;
use crate::features::documents::store::{DocumentStore, UploadRequest};
use crate::features::documents::DocumentQueueService;

/// In-memory store whose uploads can be held open per file name.
///
/// Uploads for a gated file name wait until the test sends the result through
/// the gate; every other upload succeeds at once with `remote/{document_id}`.
#[derive(Default)]
pub struct GatedDocumentStore {
    gates: Mutex<HashMap<String, oneshot::Receiver<Result<String>>>>,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
}

impl GatedDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the next upload of `file_name` until the returned sender fires
    pub fn gate(&self, file_name: &str) -> oneshot::Sender<Result<String>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(file_name.to_string(), rx);
        tx
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for GatedDocumentStore {
    async fn upload(&self, request: &UploadRequest) -> Result<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);

        let gate = self.gates.lock().unwrap().remove(&request.file_name);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(AppError::Internal("gate dropped".to_string()))),
            None => Ok(format!("remote/{}", request.document_id)),
        }
    }

    async fn delete(&self, _request: &UploadRequest) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn retrieval_url(&self, remote_id: &str) -> Result<String> {
        Ok(format!("https://storage.test/{}?signature=test", remote_id))
    }
}

/// Store that panics on every upload
pub struct PanickingDocumentStore;

#[async_trait]
impl DocumentStore for PanickingDocumentStore {
    async fn upload(&self, _request: &UploadRequest) -> Result<String> {
        panic!("storage client crashed");
    }

    async fn delete(&self, _request: &UploadRequest) -> Result<()> {
        Ok(())
    }

    async fn retrieval_url(&self, _remote_id: &str) -> Result<String> {
        Err(AppError::Internal("unavailable".to_string()))
    }
}

pub fn selected_file(name: &str, size: usize, last_modified: i64) -> SelectedFile {
    SelectedFile::new(
        name,
        "application/pdf",
        last_modified,
        Bytes::from(vec![7u8; size]),
    )
}

/// Selection with a generated name, unlikely to collide with anything else
pub fn fake_selected_file() -> SelectedFile {
    let name: String = FileName().fake();
    let size: usize = (1..4096).fake();
    let last_modified: i64 = (1..i64::MAX).fake();
    selected_file(&name, size, last_modified)
}

pub fn queue_service(store: Arc<GatedDocumentStore>) -> Arc<DocumentQueueService> {
    Arc::new(DocumentQueueService::new(store, &UploadConfig::default()))
}
