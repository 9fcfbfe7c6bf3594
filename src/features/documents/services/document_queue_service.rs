use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::config::UploadConfig;
use crate::core::error::{AppError, Result};
use crate::features::documents::models::{Document, DocumentStatus, SelectedFile};
use crate::features::documents::orchestrator::{UploadBatch, UploadOrchestrator};
use crate::features::documents::registry::DocumentRegistry;
use crate::features::documents::staging::StagingBuffer;
use crate::features::documents::store::DocumentStore;

/// Staging buffer and registry of one conversation
pub struct DocumentQueue {
    conversation_id: Uuid,
    staging: Mutex<StagingBuffer>,
    registry: DocumentRegistry,
}

impl DocumentQueue {
    fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            staging: Mutex::new(StagingBuffer::new()),
            registry: DocumentRegistry::new(),
        }
    }
}

/// Result of a staging request
#[derive(Debug)]
pub struct StageOutcome {
    pub staged: Vec<Document>,
    pub skipped: usize,
}

/// Service owning the in-memory document queues of all conversations
pub struct DocumentQueueService {
    queues: RwLock<HashMap<Uuid, Arc<DocumentQueue>>>,
    orchestrator: UploadOrchestrator,
    store: Arc<dyn DocumentStore>,
    in_flight: Mutex<Vec<UploadBatch>>,
}

impl DocumentQueueService {
    pub fn new(store: Arc<dyn DocumentStore>, config: &UploadConfig) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            orchestrator: UploadOrchestrator::new(Arc::clone(&store), config),
            store,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Get the queue of a conversation, creating it on first use
    async fn queue(&self, conversation_id: Uuid) -> Arc<DocumentQueue> {
        if let Some(queue) = self.queues.read().await.get(&conversation_id) {
            return Arc::clone(queue);
        }

        let mut queues = self.queues.write().await;
        Arc::clone(queues.entry(conversation_id).or_insert_with(|| {
            debug!("Opening document queue for conversation {}", conversation_id);
            Arc::new(DocumentQueue::new(conversation_id))
        }))
    }

    async fn existing_queue(&self, conversation_id: Uuid) -> Option<Arc<DocumentQueue>> {
        self.queues.read().await.get(&conversation_id).cloned()
    }

    async fn is_registered(&self, queue: &Arc<DocumentQueue>) -> bool {
        self.queues
            .read()
            .await
            .get(&queue.conversation_id)
            .is_some_and(|current| Arc::ptr_eq(current, queue))
    }

    async fn existing_document(&self, conversation_id: Uuid, document_id: Uuid) -> Result<Document> {
        self.existing_queue(conversation_id)
            .await
            .and_then(|queue| queue.registry.get(document_id))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Document {} not found in conversation {}",
                    document_id, conversation_id
                ))
            })
    }

    /// Stage selected files, dropping any already staged or committed
    pub async fn stage_files(
        &self,
        conversation_id: Uuid,
        files: Vec<SelectedFile>,
    ) -> StageOutcome {
        let selected = files.len();
        if selected == 0 {
            return StageOutcome {
                staged: Vec::new(),
                skipped: 0,
            };
        }

        // A queue discarded between lookup and locking is no longer reachable,
        // so look it up again until the locked queue is still registered
        let staged = loop {
            let queue = self.queue(conversation_id).await;
            let mut staging = queue.staging.lock().await;
            if !self.is_registered(&queue).await {
                debug!(
                    "Document queue for conversation {} was discarded, retrying",
                    conversation_id
                );
                continue;
            }

            // Commit takes the staging lock too, so the registry cannot gain
            // documents between this read and the append below
            break queue
                .registry
                .with_current(|committed| staging.add(files, committed));
        };

        let skipped = selected - staged.len();
        info!(
            "Staged {} document(s) for conversation {} ({} duplicate(s) skipped)",
            staged.len(),
            conversation_id,
            skipped
        );

        StageOutcome { staged, skipped }
    }

    pub async fn list_staged(&self, conversation_id: Uuid) -> Vec<Document> {
        match self.existing_queue(conversation_id).await {
            Some(queue) => queue.staging.lock().await.list().to_vec(),
            None => Vec::new(),
        }
    }

    /// Remove one staged document; unknown ids are a no-op
    pub async fn remove_staged(&self, conversation_id: Uuid, document_id: Uuid) -> bool {
        match self.existing_queue(conversation_id).await {
            Some(queue) => queue.staging.lock().await.remove(document_id),
            None => false,
        }
    }

    /// Empty the staging buffer; uploads already dispatched keep running
    pub async fn clear_staged(&self, conversation_id: Uuid) {
        if let Some(queue) = self.existing_queue(conversation_id).await {
            queue.staging.lock().await.clear();
        }
    }

    /// Move every staged document into the registry and start their uploads.
    ///
    /// Returns the committed documents. Conversations without a queue have
    /// nothing staged and stay unknown.
    pub async fn commit(&self, conversation_id: Uuid) -> Vec<Document> {
        let Some(queue) = self.existing_queue(conversation_id).await else {
            return Vec::new();
        };
        let mut staging = queue.staging.lock().await;

        // Discarded while waiting for the lock; its staged files went with it
        if staging.is_empty() || !self.is_registered(&queue).await {
            return Vec::new();
        }

        let batch =
            self.orchestrator
                .commit(queue.conversation_id, &queue.registry, staging.take());
        let committed = batch.documents().to_vec();

        if !batch.is_empty() {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.retain(|running| !running.is_finished());
            in_flight.push(batch);
        }

        committed
    }

    pub async fn list_documents(&self, conversation_id: Uuid) -> Vec<Document> {
        match self.existing_queue(conversation_id).await {
            Some(queue) => queue.registry.snapshot(),
            None => Vec::new(),
        }
    }

    /// Include or exclude a committed document from downstream use
    pub async fn set_active(
        &self,
        conversation_id: Uuid,
        document_id: Uuid,
        is_active: bool,
    ) -> Result<Document> {
        let queue = self.existing_queue(conversation_id).await.ok_or_else(|| {
            AppError::NotFound(format!("Conversation {} has no documents", conversation_id))
        })?;

        queue.registry.patch(document_id, |doc| {
            (doc.is_active != is_active).then(|| Document {
                is_active,
                ..doc.clone()
            })
        });

        self.existing_document(conversation_id, document_id).await
    }

    /// Remove a committed document; an upload still in flight for it is
    /// left to finish and its result is dropped
    pub async fn remove_document(&self, conversation_id: Uuid, document_id: Uuid) -> bool {
        let removed = match self.existing_queue(conversation_id).await {
            Some(queue) => queue.registry.remove(document_id),
            None => false,
        };

        if removed {
            info!(
                "Removed document {} from conversation {}",
                document_id, conversation_id
            );
        }
        removed
    }

    /// Download URL for a ready document
    pub async fn retrieval_url(&self, conversation_id: Uuid, document_id: Uuid) -> Result<String> {
        let document = self.existing_document(conversation_id, document_id).await?;

        let remote_id = document.remote_id().ok_or_else(|| {
            AppError::Conflict(format!(
                "Document {} is {}, not ready",
                document_id,
                document.status.as_str()
            ))
        })?;

        self.store.retrieval_url(remote_id).await
    }

    /// Context string describing ready, active documents for agent injection
    ///
    /// Returns None if there is nothing to describe
    pub async fn attachment_context(&self, conversation_id: Uuid) -> Option<String> {
        let documents = self.list_documents(conversation_id).await;
        let usable: Vec<&Document> = documents
            .iter()
            .filter(|doc| doc.is_active && matches!(doc.status, DocumentStatus::Ready { .. }))
            .collect();

        if usable.is_empty() {
            return None;
        }

        let mut context = format!(
            "The user has uploaded {} supporting document{}:\n",
            usable.len(),
            if usable.len() == 1 { "" } else { "s" }
        );

        for (i, doc) in usable.iter().enumerate() {
            context.push_str(&format!(
                "{}. {} ({}, {})\n",
                i + 1,
                doc.name,
                doc.content_type,
                format_file_size(doc.size)
            ));
        }

        context.push_str(
            "\nNote: You cannot view these files directly. Acknowledge that the user has provided supporting documentation.",
        );

        Some(context)
    }

    /// Drop the queue of a conversation; dispatched uploads finish unobserved
    pub async fn discard(&self, conversation_id: Uuid) -> bool {
        let removed = self.queues.write().await.remove(&conversation_id).is_some();
        if removed {
            info!("Discarded document queue for conversation {}", conversation_id);
        }
        removed
    }

    /// Observe registry replacements of a conversation that has a queue
    pub async fn subscribe(&self, conversation_id: Uuid) -> Option<watch::Receiver<Vec<Document>>> {
        self.existing_queue(conversation_id)
            .await
            .map(|queue| queue.registry.subscribe())
    }

    /// Wait for every upload started so far to patch its registry.
    ///
    /// Used on shutdown, and covers uploads of discarded queues too.
    pub async fn drain(&self) {
        let batches = std::mem::take(&mut *self.in_flight.lock().await);
        let uploads: usize = batches.iter().map(|batch| batch.documents().len()).sum();
        info!(
            "Draining {} upload batch(es) with {} document(s)",
            batches.len(),
            uploads
        );

        join_all(batches.into_iter().map(UploadBatch::settled)).await;
    }
}

/// Format file size in human readable format
fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_helpers::{
        fake_selected_file, queue_service, selected_file, GatedDocumentStore,
    };
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 bytes");
        assert_eq!(format_file_size(2048), "2 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }

    #[tokio::test]
    async fn test_report_scenario() {
        let store = Arc::new(GatedDocumentStore::new());
        let gate = store.gate("report.pdf");
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();

        let first = service
            .stage_files(conversation, vec![selected_file("report.pdf", 1024, 100)])
            .await;
        assert_eq!(first.staged.len(), 1);
        assert_eq!(first.staged[0].status, DocumentStatus::Pending);

        let again = service
            .stage_files(conversation, vec![selected_file("report.pdf", 1024, 100)])
            .await;
        assert!(again.staged.is_empty());
        assert_eq!(again.skipped, 1);
        assert_eq!(service.list_staged(conversation).await.len(), 1);

        let committed = service.commit(conversation).await;
        let documents = service.list_documents(conversation).await;
        assert_eq!(committed, documents);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].status, DocumentStatus::Uploading);

        gate.send(Ok("abc123".to_string())).unwrap();
        service.drain().await;

        let documents = service.list_documents(conversation).await;
        assert_eq!(documents[0].remote_id(), Some("abc123"));
        assert!(documents[0].is_ready());
    }

    #[tokio::test]
    async fn test_commit_is_atomic() {
        let store = Arc::new(GatedDocumentStore::new());
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();
        let files: Vec<_> = (0..3).map(|_| fake_selected_file()).collect();
        let gates: Vec<_> = files.iter().map(|f| store.gate(&f.name)).collect();

        let staged = service.stage_files(conversation, files).await.staged.len();
        service.commit(conversation).await;

        let documents = service.list_documents(conversation).await;
        assert_eq!(documents.len(), staged);
        assert!(documents
            .iter()
            .all(|d| d.status == DocumentStatus::Uploading));
        assert!(service.list_staged(conversation).await.is_empty());
        drop(gates);
    }

    #[tokio::test]
    async fn test_empty_commit_is_noop() {
        let store = Arc::new(GatedDocumentStore::new());
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();

        service
            .stage_files(conversation, vec![selected_file("a.pdf", 1, 1)])
            .await;
        service.commit(conversation).await;
        service.drain().await;
        let before = service.list_documents(conversation).await;

        let committed = service.commit(conversation).await;

        assert!(committed.is_empty());
        assert_eq!(service.list_documents(conversation).await, before);
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_before_success_scenario() {
        let store = Arc::new(GatedDocumentStore::new());
        let gate_one = store.gate("one.pdf");
        let gate_two = store.gate("two.pdf");
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();
        service
            .stage_files(
                conversation,
                vec![selected_file("one.pdf", 10, 1), selected_file("two.pdf", 20, 2)],
            )
            .await;
        let mut rx = service.subscribe(conversation).await.unwrap();
        service.commit(conversation).await;

        gate_two
            .send(Err(AppError::ExternalServiceError(
                "Failed to upload file 'two.pdf': 503".to_string(),
            )))
            .unwrap();
        rx.wait_for(|docs| docs.iter().any(|d| d.error_message().is_some()))
            .await
            .unwrap();
        gate_one.send(Ok("remote-one".to_string())).unwrap();
        service.drain().await;

        let documents = service.list_documents(conversation).await;
        assert_eq!(documents[0].remote_id(), Some("remote-one"));
        assert!(documents[1].error_message().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_clear_does_not_abort_dispatched_uploads() {
        let store = Arc::new(GatedDocumentStore::new());
        let gate = store.gate("sent.pdf");
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();

        service
            .stage_files(conversation, vec![selected_file("sent.pdf", 1, 1)])
            .await;
        assert_eq!(service.commit(conversation).await.len(), 1);

        service
            .stage_files(conversation, vec![selected_file("draft.pdf", 1, 1)])
            .await;
        service.clear_staged(conversation).await;

        gate.send(Ok("remote-sent".to_string())).unwrap();
        service.drain().await;

        assert!(service.list_staged(conversation).await.is_empty());
        assert!(service.list_documents(conversation).await[0].is_ready());
    }

    #[tokio::test]
    async fn test_committed_file_cannot_be_staged_again() {
        let store = Arc::new(GatedDocumentStore::new());
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();

        service
            .stage_files(conversation, vec![selected_file("a.pdf", 1, 1)])
            .await;
        service.commit(conversation).await;
        service.drain().await;

        let outcome = service
            .stage_files(conversation, vec![selected_file("a.pdf", 1, 1)])
            .await;

        assert!(outcome.staged.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn test_remove_staged_unknown_is_noop() {
        let store = Arc::new(GatedDocumentStore::new());
        let service = queue_service(store);
        let conversation = Uuid::new_v4();

        assert!(!service.remove_staged(conversation, Uuid::new_v4()).await);

        let staged = service
            .stage_files(conversation, vec![selected_file("a.pdf", 1, 1)])
            .await
            .staged;
        assert!(service.remove_staged(conversation, staged[0].id).await);
        assert!(!service.remove_staged(conversation, staged[0].id).await);
    }

    #[tokio::test]
    async fn test_set_active_and_context() {
        let store = Arc::new(GatedDocumentStore::new());
        let service = queue_service(store);
        let conversation = Uuid::new_v4();

        assert!(service.attachment_context(conversation).await.is_none());

        service
            .stage_files(
                conversation,
                vec![
                    selected_file("report.pdf", 2048, 1),
                    selected_file("photo.pdf", 10, 2),
                ],
            )
            .await;
        let committed = service.commit(conversation).await;
        let photo = committed[1].id;
        service.drain().await;

        let context = service.attachment_context(conversation).await.unwrap();
        assert!(context.starts_with("The user has uploaded 2 supporting documents:"));
        assert!(context.contains("1. report.pdf (application/pdf, 2 KB)"));

        let updated = assert_ok!(service.set_active(conversation, photo, false).await);
        assert!(!updated.is_active);
        assert!(updated.is_ready());

        let context = service.attachment_context(conversation).await.unwrap();
        assert!(context.starts_with("The user has uploaded 1 supporting document:"));
        assert!(!context.contains("photo.pdf"));

        assert_err!(service.set_active(conversation, Uuid::new_v4(), true).await);
    }

    #[tokio::test]
    async fn test_retrieval_url_requires_ready_document() {
        let store = Arc::new(GatedDocumentStore::new());
        let gate = store.gate("a.pdf");
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();

        service
            .stage_files(conversation, vec![selected_file("a.pdf", 1, 1)])
            .await;
        let committed = service.commit(conversation).await;
        let id = committed[0].id;

        let pending = service.retrieval_url(conversation, id).await;
        assert!(matches!(pending, Err(AppError::Conflict(_))));

        gate.send(Ok("private/a".to_string())).unwrap();
        service.drain().await;

        let url = assert_ok!(service.retrieval_url(conversation, id).await);
        assert_eq!(url, "https://storage.test/private/a?signature=test");

        let missing = service.retrieval_url(Uuid::new_v4(), id).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_during_upload() {
        let store = Arc::new(GatedDocumentStore::new());
        let gate = store.gate("a.pdf");
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();

        service
            .stage_files(conversation, vec![selected_file("a.pdf", 1, 1)])
            .await;
        let committed = service.commit(conversation).await;
        let id = committed[0].id;

        assert!(service.remove_document(conversation, id).await);
        assert!(!service.remove_document(conversation, id).await);

        gate.send(Ok("late".to_string())).unwrap();
        service.drain().await;

        assert!(service.list_documents(conversation).await.is_empty());
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let store = Arc::new(GatedDocumentStore::new());
        let service = queue_service(store);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        service
            .stage_files(first, vec![selected_file("a.pdf", 1, 1)])
            .await;
        let outcome = service
            .stage_files(second, vec![selected_file("a.pdf", 1, 1)])
            .await;

        assert_eq!(outcome.staged.len(), 1);
        assert!(service.discard(first).await);
        assert!(!service.discard(first).await);
        assert!(service.list_staged(first).await.is_empty());
        assert_eq!(service.list_staged(second).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_conversations_are_not_registered() {
        let store = Arc::new(GatedDocumentStore::new());
        let service = queue_service(store.clone());

        for _ in 0..100 {
            let conversation = Uuid::new_v4();
            assert!(service.commit(conversation).await.is_empty());
            assert!(service.subscribe(conversation).await.is_none());
            assert!(service.list_documents(conversation).await.is_empty());
            assert!(service.attachment_context(conversation).await.is_none());
        }

        assert!(service.queues.read().await.is_empty());
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_stage_racing_discard_lands_in_live_queue() {
        let service = queue_service(Arc::new(GatedDocumentStore::new()));
        let conversation = Uuid::new_v4();
        let stale = service.queue(conversation).await;
        let held = stale.staging.lock().await;

        let staging = tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                service
                    .stage_files(conversation, vec![selected_file("a.pdf", 1, 1)])
                    .await
            }
        });
        // let the stage call block on the held staging lock
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert!(service.discard(conversation).await);
        drop(held);

        let outcome = staging.await.unwrap();
        assert_eq!(outcome.staged.len(), 1);

        let listed = service.list_staged(conversation).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, outcome.staged[0].id);
        assert!(stale.staging.lock().await.list().is_empty());
    }

    #[tokio::test]
    async fn test_commit_racing_discard_starts_nothing() {
        let store = Arc::new(GatedDocumentStore::new());
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();

        service
            .stage_files(conversation, vec![selected_file("a.pdf", 1, 1)])
            .await;
        let stale = service.queue(conversation).await;
        let held = stale.staging.lock().await;

        let commit = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.commit(conversation).await }
        });
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert!(service.discard(conversation).await);
        drop(held);

        assert!(commit.await.unwrap().is_empty());
        assert_eq!(store.upload_count(), 0);
        assert!(service.queues.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_uploads() {
        let store = Arc::new(GatedDocumentStore::new());
        let gate = store.gate("slow.pdf");
        let service = queue_service(store.clone());
        let conversation = Uuid::new_v4();

        service
            .stage_files(conversation, vec![selected_file("slow.pdf", 1, 1)])
            .await;
        service.commit(conversation).await;

        let drain = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.drain().await }
        });
        tokio::task::yield_now().await;
        assert!(!drain.is_finished());

        gate.send(Ok("remote-slow".to_string())).unwrap();
        drain.await.unwrap();

        assert!(service.list_documents(conversation).await[0].is_ready());
        assert!(service.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_finished_batches_are_pruned_on_commit() {
        let store = Arc::new(GatedDocumentStore::new());
        let service = queue_service(store);
        let conversation = Uuid::new_v4();

        service
            .stage_files(conversation, vec![selected_file("a.pdf", 1, 1)])
            .await;
        service.commit(conversation).await;
        let mut rx = service.subscribe(conversation).await.unwrap();
        rx.wait_for(|docs| docs.iter().all(|d| d.is_ready()))
            .await
            .unwrap();
        // the patch lands just before the task returns
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        service
            .stage_files(conversation, vec![selected_file("b.pdf", 1, 1)])
            .await;
        service.commit(conversation).await;

        assert_eq!(service.in_flight.lock().await.len(), 1);
        service.drain().await;
    }
}
