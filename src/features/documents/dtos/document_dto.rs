use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::features::documents::models::{Document, DocumentStatus};

/// Maximum size of a single document in bytes (20MB)
pub const MAX_DOCUMENT_SIZE: usize = 20 * 1024 * 1024;

/// Allowed MIME types for conversation documents
pub const ALLOWED_DOCUMENT_MIME_TYPES: &[&str] = &[
    // Images
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/heic",
    "image/heif",
    // Documents
    "application/pdf",
    "text/plain",
    "text/csv",
    // Video
    "video/mp4",
    "video/mpeg",
    "video/quicktime",
    "video/x-msvideo",
    "video/webm",
];

/// Check if a MIME type is allowed for documents
pub fn is_document_mime_type_allowed(content_type: &str) -> bool {
    if ALLOWED_DOCUMENT_MIME_TYPES.contains(&content_type) {
        return true;
    }

    // Also allow any image/* or video/* type
    content_type.starts_with("image/") || content_type.starts_with("video/")
}

/// Get file extension from content type
pub fn get_extension_from_content_type(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/heif" => Some("heif"),
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        "text/csv" => Some("csv"),
        "video/mp4" => Some("mp4"),
        "video/mpeg" => Some("mpeg"),
        "video/quicktime" => Some("mov"),
        "video/x-msvideo" => Some("avi"),
        "video/webm" => Some("webm"),
        _ => None,
    }
}

/// Document lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatusDto {
    Pending,
    Uploading,
    Ready,
    Error,
}

impl From<&DocumentStatus> for DocumentStatusDto {
    fn from(status: &DocumentStatus) -> Self {
        match status {
            DocumentStatus::Pending => DocumentStatusDto::Pending,
            DocumentStatus::Uploading => DocumentStatusDto::Uploading,
            DocumentStatus::Ready { .. } => DocumentStatusDto::Ready,
            DocumentStatus::Error { .. } => DocumentStatusDto::Error,
        }
    }
}

/// Response DTO for a staged or committed document
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentResponseDto {
    /// Unique identifier, stable for the document's lifetime
    pub id: Uuid,
    /// Original filename
    pub name: String,
    /// MIME type of the file
    pub content_type: String,
    /// Size of the file in bytes
    pub size: u64,
    /// Last-modified time reported at selection (ms since epoch)
    pub last_modified: i64,
    /// Lifecycle state
    pub status: DocumentStatusDto,
    /// Whether the document is used downstream
    pub is_active: bool,
    /// Storage identifier, set only when `status` is `ready`
    pub remote_id: Option<String>,
    /// Failure description, set only when `status` is `error`
    pub error_message: Option<String>,
    /// Timestamp when the document was staged
    pub created_at: DateTime<Utc>,
}

impl From<&Document> for DocumentResponseDto {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name.clone(),
            content_type: doc.content_type.clone(),
            size: doc.size,
            last_modified: doc.last_modified,
            status: DocumentStatusDto::from(&doc.status),
            is_active: doc.is_active,
            remote_id: doc.remote_id().map(str::to_string),
            error_message: doc.error_message().map(str::to_string),
            created_at: doc.created_at,
        }
    }
}

/// Stage documents request DTO for OpenAPI documentation
/// Note: This struct is for Swagger UI documentation only.
/// The actual handler uses axum's Multipart extractor directly.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct StageDocumentsDto {
    /// A file to stage; repeat the field for several files
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// Last-modified time (ms since epoch) of the preceding `file` part
    #[schema(example = 1700000000000_i64)]
    pub last_modified: Option<i64>,
}

/// Response DTO for a staging request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StageDocumentsResponseDto {
    /// Documents newly added to the staging buffer
    pub staged: Vec<DocumentResponseDto>,
    /// Number of selected files dropped as duplicates
    pub skipped: usize,
}

/// Response DTO for a commit
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CommitResponseDto {
    /// Documents moved into the conversation, all `uploading`
    pub committed: Vec<DocumentResponseDto>,
}

/// Request DTO for toggling a document
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateDocumentDto {
    /// Include or exclude the document from downstream use
    pub is_active: bool,
}

/// Response DTO for a document download URL
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentUrlResponseDto {
    /// Presigned URL to download the document
    pub url: String,
}

/// Response DTO for the agent attachment context
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AttachmentContextDto {
    /// Text describing ready, active documents; absent when there are none
    pub context: Option<String>,
}

/// Response DTO for remove operations
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RemovedResponseDto {
    /// Whether something was removed; `false` when it was already gone
    pub removed: bool,
}
