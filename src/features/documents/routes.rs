use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::features::documents::handlers::{
    clear_staged, commit_documents, discard_queue, get_attachment_context, get_document_url,
    list_documents, list_staged, remove_document, remove_staged, stage_documents,
    stream_documents, update_document,
};
use crate::features::documents::services::DocumentQueueService;

/// Create routes for the documents feature
///
/// `body_limit` caps a whole staging request, which may carry several files.
pub fn routes(service: Arc<DocumentQueueService>, body_limit: usize) -> Router {
    Router::new()
        .route(
            "/api/conversations/{conversation_id}/documents",
            get(list_documents).delete(discard_queue),
        )
        .route(
            "/api/conversations/{conversation_id}/documents/staged",
            post(stage_documents)
                .layer(DefaultBodyLimit::max(body_limit))
                .get(list_staged)
                .delete(clear_staged),
        )
        .route(
            "/api/conversations/{conversation_id}/documents/staged/{document_id}",
            delete(remove_staged),
        )
        .route(
            "/api/conversations/{conversation_id}/documents/commit",
            post(commit_documents),
        )
        .route(
            "/api/conversations/{conversation_id}/documents/context",
            get(get_attachment_context),
        )
        .route(
            "/api/conversations/{conversation_id}/documents/events",
            get(stream_documents),
        )
        .route(
            "/api/conversations/{conversation_id}/documents/{document_id}",
            delete(remove_document).patch(update_document),
        )
        .route(
            "/api/conversations/{conversation_id}/documents/{document_id}/url",
            get(get_document_url),
        )
        .with_state(service)
}
