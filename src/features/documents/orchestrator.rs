//! Upload orchestration for committed batches.
//!
//! A commit moves a batch into the registry as `uploading` in one replace and
//! spawns one task per document. Each task owns only the document id, the
//! payload handle and the store, and finishes by patching that single
//! document against the registry's state at completion time. Tasks never wait
//! on each other and a failure only ever marks its own document.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::config::UploadConfig;
use crate::features::documents::models::{Document, UploadOutcome};
use crate::features::documents::registry::DocumentRegistry;
use crate::features::documents::store::{DocumentStore, UploadRequest};

pub struct UploadOrchestrator {
    store: Arc<dyn DocumentStore>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

/// Handle on the uploads started by one commit
#[derive(Debug)]
pub struct UploadBatch {
    documents: Vec<Document>,
    handles: Vec<JoinHandle<()>>,
}

impl UploadBatch {
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Documents as they entered the registry (all `uploading`)
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// True once every upload of this batch has run to completion
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Wait until every upload of this batch has patched the registry.
    ///
    /// Dropping the batch instead leaves the uploads running.
    pub async fn settled(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!("Upload task ended abnormally: {}", e);
            }
        }
    }
}

impl UploadOrchestrator {
    pub fn new(store: Arc<dyn DocumentStore>, config: &UploadConfig) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            timeout: config.timeout,
        }
    }

    /// Commit `batch` into `registry` and start one upload per document.
    ///
    /// Only pending documents are committed. An empty batch leaves the
    /// registry untouched.
    pub fn commit(
        &self,
        conversation_id: Uuid,
        registry: &DocumentRegistry,
        batch: Vec<Document>,
    ) -> UploadBatch {
        let uploading: Vec<Document> = batch
            .into_iter()
            .filter_map(|doc| {
                let id = doc.id;
                let next = doc.into_uploading();
                if next.is_none() {
                    warn!("Document {} is not pending, left out of commit", id);
                }
                next
            })
            .collect();

        if uploading.is_empty() {
            return UploadBatch::empty();
        }

        registry.append(uploading.clone());

        info!(
            "Committed {} document(s) for conversation {}",
            uploading.len(),
            conversation_id
        );

        let handles = uploading
            .iter()
            .map(|doc| {
                let request = UploadRequest {
                    conversation_id,
                    document_id: doc.id,
                    file_name: doc.name.clone(),
                    content_type: doc.content_type.clone(),
                    payload: doc.payload.clone(),
                };

                tokio::spawn(Self::run_upload(
                    Arc::clone(&self.store),
                    Arc::clone(&self.permits),
                    self.timeout,
                    registry.clone(),
                    request,
                ))
            })
            .collect();

        UploadBatch {
            documents: uploading,
            handles,
        }
    }

    async fn run_upload(
        store: Arc<dyn DocumentStore>,
        permits: Arc<Semaphore>,
        timeout: Option<Duration>,
        registry: DocumentRegistry,
        request: UploadRequest,
    ) {
        let document_id = request.document_id;
        let outcome = Self::perform_upload(store, permits, timeout, request).await;

        match &outcome {
            UploadOutcome::Uploaded { remote_id } => {
                info!("Document {} uploaded as {}", document_id, remote_id)
            }
            UploadOutcome::Failed { message } => {
                warn!("Document {} failed to upload: {}", document_id, message)
            }
        }

        if !registry.patch(document_id, |doc| doc.resolved(&outcome)) {
            debug!(
                "Document {} no longer awaits an upload result, outcome dropped",
                document_id
            );
        }
    }

    async fn perform_upload(
        store: Arc<dyn DocumentStore>,
        permits: Arc<Semaphore>,
        timeout: Option<Duration>,
        request: UploadRequest,
    ) -> UploadOutcome {
        let _permit = match permits.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return UploadOutcome::Failed {
                    message: "Upload queue is shut down".to_string(),
                }
            }
        };

        debug!(
            "Uploading document {} ({}, {} bytes)",
            request.document_id,
            request.file_name,
            request.payload.len()
        );

        // The store call runs in its own task so a panic inside it still
        // resolves the document
        let mut upload = tokio::spawn({
            let store = Arc::clone(&store);
            let request = request.clone();
            async move { store.upload(&request).await }
        });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut upload).await {
                Ok(joined) => joined,
                Err(_) => {
                    upload.abort();
                    // The write may already have landed; nothing would ever
                    // reference it once the document is marked failed
                    if let Err(e) = store.delete(&request).await {
                        warn!(
                            "Failed to clean up timed out upload of document {}: {}",
                            request.document_id, e
                        );
                    }
                    return UploadOutcome::Failed {
                        message: format!("Upload timed out after {} seconds", limit.as_secs()),
                    };
                }
            },
            None => upload.await,
        };

        match joined {
            Ok(Ok(remote_id)) => UploadOutcome::Uploaded { remote_id },
            Ok(Err(e)) => UploadOutcome::Failed {
                message: e.to_string(),
            },
            Err(e) => {
                error!("Upload task failed: {}", e);
                UploadOutcome::Failed {
                    message: "Upload task failed unexpectedly".to_string(),
                }
            }
        }
    }
}
