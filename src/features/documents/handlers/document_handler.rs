use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::debug;
use uuid::Uuid;

use crate::core::error::AppError;
use crate::features::documents::dtos::{
    is_document_mime_type_allowed, AttachmentContextDto, CommitResponseDto, DocumentResponseDto,
    DocumentUrlResponseDto, RemovedResponseDto, StageDocumentsDto, StageDocumentsResponseDto,
    UpdateDocumentDto, ALLOWED_DOCUMENT_MIME_TYPES, MAX_DOCUMENT_SIZE,
};
use crate::features::documents::models::{Document, SelectedFile};
use crate::features::documents::services::DocumentQueueService;
use crate::shared::types::{ApiResponse, Meta};

fn to_dtos<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Vec<DocumentResponseDto> {
    documents.into_iter().map(DocumentResponseDto::from).collect()
}

/// Read every `file` part (and its optional `last_modified`) from the form
async fn read_selection(multipart: &mut Multipart) -> Result<Vec<SelectedFile>, AppError> {
    let mut files: Vec<SelectedFile> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        debug!("Failed to read multipart field: {}", e);
        AppError::BadRequest(format!("Failed to read multipart data: {}", e))
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unnamed".to_string());

                let data = field.bytes().await.map_err(|e| {
                    debug!("Failed to read file bytes: {}", e);
                    AppError::BadRequest(format!("Failed to read file data: {}", e))
                })?;

                if data.len() > MAX_DOCUMENT_SIZE {
                    return Err(AppError::BadRequest(format!(
                        "File '{}' too large. Maximum size is {} bytes ({} MB)",
                        file_name,
                        MAX_DOCUMENT_SIZE,
                        MAX_DOCUMENT_SIZE / 1024 / 1024
                    )));
                }

                if !is_document_mime_type_allowed(&content_type) {
                    return Err(AppError::BadRequest(format!(
                        "File type '{}' is not allowed. Allowed types: images (image/*), video (video/*), {}",
                        content_type,
                        ALLOWED_DOCUMENT_MIME_TYPES
                            .iter()
                            .filter(|t| !t.starts_with("image/") && !t.starts_with("video/"))
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", ")
                    )));
                }

                files.push(SelectedFile::new(file_name, content_type, 0, data));
            }
            "last_modified" => {
                let text = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read last_modified field: {}", e))
                })?;
                let last_modified = text.trim().parse::<i64>().map_err(|_| {
                    AppError::BadRequest(format!("Invalid last_modified value: '{}'", text))
                })?;
                let file = files.last_mut().ok_or_else(|| {
                    AppError::BadRequest("last_modified must follow a file field".to_string())
                })?;
                file.last_modified = last_modified;
            }
            _ => {
                debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    Ok(files)
}

/// Stage files for a conversation
///
/// Accepts multipart/form-data with one or more `file` parts, each optionally
/// followed by a `last_modified` part. Files already staged or attached are
/// skipped silently and counted in `skipped`.
#[utoipa::path(
    post,
    path = "/api/conversations/{conversation_id}/documents/staged",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body(
        content = StageDocumentsDto,
        content_type = "multipart/form-data",
        description = "Files selected by the user"
    ),
    responses(
        (status = 201, description = "Selection staged", body = ApiResponse<StageDocumentsResponseDto>),
        (status = 400, description = "Invalid file, type not allowed, or file too large"),
        (status = 413, description = "Request body too large")
    )
)]
pub async fn stage_documents(
    Path(conversation_id): Path<Uuid>,
    State(service): State<Arc<DocumentQueueService>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<StageDocumentsResponseDto>>), AppError> {
    let files = read_selection(&mut multipart).await?;

    let outcome = service.stage_files(conversation_id, files).await;

    let response = StageDocumentsResponseDto {
        staged: to_dtos(&outcome.staged),
        skipped: outcome.skipped,
    };

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(Some(response), None, None)),
    ))
}

/// List staged documents of a conversation
#[utoipa::path(
    get,
    path = "/api/conversations/{conversation_id}/documents/staged",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Staged documents", body = ApiResponse<Vec<DocumentResponseDto>>)
    )
)]
pub async fn list_staged(
    Path(conversation_id): Path<Uuid>,
    State(service): State<Arc<DocumentQueueService>>,
) -> Result<Json<ApiResponse<Vec<DocumentResponseDto>>>, AppError> {
    let staged = to_dtos(&service.list_staged(conversation_id).await);
    let total = staged.len() as i64;

    Ok(Json(ApiResponse::success(
        Some(staged),
        None,
        Some(Meta { total }),
    )))
}

/// Remove a staged document
///
/// Removing an unknown document is not an error.
#[utoipa::path(
    delete,
    path = "/api/conversations/{conversation_id}/documents/staged/{document_id}",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
        ("document_id" = Uuid, Path, description = "Staged document ID")
    ),
    responses(
        (status = 200, description = "Removal processed", body = ApiResponse<RemovedResponseDto>)
    )
)]
pub async fn remove_staged(
    Path((conversation_id, document_id)): Path<(Uuid, Uuid)>,
    State(service): State<Arc<DocumentQueueService>>,
) -> Result<Json<ApiResponse<RemovedResponseDto>>, AppError> {
    let removed = service.remove_staged(conversation_id, document_id).await;

    Ok(Json(ApiResponse::success(
        Some(RemovedResponseDto { removed }),
        None,
        None,
    )))
}

/// Clear the staging buffer of a conversation
#[utoipa::path(
    delete,
    path = "/api/conversations/{conversation_id}/documents/staged",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 204, description = "Staging buffer cleared")
    )
)]
pub async fn clear_staged(
    Path(conversation_id): Path<Uuid>,
    State(service): State<Arc<DocumentQueueService>>,
) -> StatusCode {
    service.clear_staged(conversation_id).await;
    StatusCode::NO_CONTENT
}

/// Commit staged documents and start their uploads
///
/// Returns immediately; uploads resolve in the background and show up in the
/// document list as `ready` or `error`.
#[utoipa::path(
    post,
    path = "/api/conversations/{conversation_id}/documents/commit",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 202, description = "Batch committed, uploads started", body = ApiResponse<CommitResponseDto>)
    )
)]
pub async fn commit_documents(
    Path(conversation_id): Path<Uuid>,
    State(service): State<Arc<DocumentQueueService>>,
) -> Result<(StatusCode, Json<ApiResponse<CommitResponseDto>>), AppError> {
    let committed = service.commit(conversation_id).await;

    let response = CommitResponseDto {
        committed: to_dtos(&committed),
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(Some(response), None, None)),
    ))
}

/// List committed documents of a conversation
#[utoipa::path(
    get,
    path = "/api/conversations/{conversation_id}/documents",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Committed documents", body = ApiResponse<Vec<DocumentResponseDto>>)
    )
)]
pub async fn list_documents(
    Path(conversation_id): Path<Uuid>,
    State(service): State<Arc<DocumentQueueService>>,
) -> Result<Json<ApiResponse<Vec<DocumentResponseDto>>>, AppError> {
    let documents = to_dtos(&service.list_documents(conversation_id).await);
    let total = documents.len() as i64;

    Ok(Json(ApiResponse::success(
        Some(documents),
        None,
        Some(Meta { total }),
    )))
}

/// Include or exclude a committed document
#[utoipa::path(
    patch,
    path = "/api/conversations/{conversation_id}/documents/{document_id}",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
        ("document_id" = Uuid, Path, description = "Document ID")
    ),
    request_body = UpdateDocumentDto,
    responses(
        (status = 200, description = "Document updated", body = ApiResponse<DocumentResponseDto>),
        (status = 404, description = "Document not found")
    )
)]
pub async fn update_document(
    Path((conversation_id, document_id)): Path<(Uuid, Uuid)>,
    State(service): State<Arc<DocumentQueueService>>,
    Json(dto): Json<UpdateDocumentDto>,
) -> Result<Json<ApiResponse<DocumentResponseDto>>, AppError> {
    let document = service
        .set_active(conversation_id, document_id, dto.is_active)
        .await?;

    Ok(Json(ApiResponse::success(
        Some(DocumentResponseDto::from(&document)),
        None,
        None,
    )))
}

/// Remove a committed document
#[utoipa::path(
    delete,
    path = "/api/conversations/{conversation_id}/documents/{document_id}",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
        ("document_id" = Uuid, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Removal processed", body = ApiResponse<RemovedResponseDto>)
    )
)]
pub async fn remove_document(
    Path((conversation_id, document_id)): Path<(Uuid, Uuid)>,
    State(service): State<Arc<DocumentQueueService>>,
) -> Result<Json<ApiResponse<RemovedResponseDto>>, AppError> {
    let removed = service.remove_document(conversation_id, document_id).await;

    Ok(Json(ApiResponse::success(
        Some(RemovedResponseDto { removed }),
        None,
        None,
    )))
}

/// Get a download URL for a ready document
#[utoipa::path(
    get,
    path = "/api/conversations/{conversation_id}/documents/{document_id}/url",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID"),
        ("document_id" = Uuid, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Presigned URL", body = ApiResponse<DocumentUrlResponseDto>),
        (status = 404, description = "Document not found"),
        (status = 409, description = "Document is not ready")
    )
)]
pub async fn get_document_url(
    Path((conversation_id, document_id)): Path<(Uuid, Uuid)>,
    State(service): State<Arc<DocumentQueueService>>,
) -> Result<Json<ApiResponse<DocumentUrlResponseDto>>, AppError> {
    let url = service.retrieval_url(conversation_id, document_id).await?;

    Ok(Json(ApiResponse::success(
        Some(DocumentUrlResponseDto { url }),
        None,
        None,
    )))
}

/// Get the attachment context passed to the agent
#[utoipa::path(
    get,
    path = "/api/conversations/{conversation_id}/documents/context",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Attachment context", body = ApiResponse<AttachmentContextDto>)
    )
)]
pub async fn get_attachment_context(
    Path(conversation_id): Path<Uuid>,
    State(service): State<Arc<DocumentQueueService>>,
) -> Result<Json<ApiResponse<AttachmentContextDto>>, AppError> {
    let context = service.attachment_context(conversation_id).await;

    Ok(Json(ApiResponse::success(
        Some(AttachmentContextDto { context }),
        None,
        None,
    )))
}

/// Discard the document queue of a conversation
///
/// Uploads already running finish without being observed.
#[utoipa::path(
    delete,
    path = "/api/conversations/{conversation_id}/documents",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Queue discarded", body = ApiResponse<RemovedResponseDto>)
    )
)]
pub async fn discard_queue(
    Path(conversation_id): Path<Uuid>,
    State(service): State<Arc<DocumentQueueService>>,
) -> Result<Json<ApiResponse<RemovedResponseDto>>, AppError> {
    let removed = service.discard(conversation_id).await;

    Ok(Json(ApiResponse::success(
        Some(RemovedResponseDto { removed }),
        None,
        None,
    )))
}

/// Stream committed documents of a conversation as Server-Sent Events
///
/// Emits a `documents` event with the full list on connect and after every
/// change. The stream ends when the queue is discarded.
#[utoipa::path(
    get,
    path = "/api/conversations/{conversation_id}/documents/events",
    tag = "documents",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "SSE stream of document lists", content_type = "text/event-stream"),
        (status = 404, description = "Conversation has no document queue")
    )
)]
pub async fn stream_documents(
    Path(conversation_id): Path<Uuid>,
    State(service): State<Arc<DocumentQueueService>>,
) -> Result<Response, AppError> {
    let rx = service.subscribe(conversation_id).await.ok_or_else(|| {
        AppError::NotFound(format!(
            "Conversation {} has no document queue",
            conversation_id
        ))
    })?;

    debug!("Streaming documents of conversation {}", conversation_id);

    let stream = WatchStream::new(rx).map(|documents| {
        Event::default()
            .event("documents")
            .json_data(to_dtos(&documents))
    });

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    );

    Ok(sse.into_response())
}
