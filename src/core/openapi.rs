use utoipa::{Modify, OpenApi};

use crate::features::documents::{dtos as documents_dtos, handlers as documents_handlers};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Staging
        documents_handlers::stage_documents,
        documents_handlers::list_staged,
        documents_handlers::remove_staged,
        documents_handlers::clear_staged,
        // Committed documents
        documents_handlers::commit_documents,
        documents_handlers::list_documents,
        documents_handlers::update_document,
        documents_handlers::remove_document,
        documents_handlers::get_document_url,
        documents_handlers::get_attachment_context,
        documents_handlers::discard_queue,
        documents_handlers::stream_documents,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Documents
            documents_dtos::DocumentStatusDto,
            documents_dtos::DocumentResponseDto,
            documents_dtos::StageDocumentsDto,
            documents_dtos::StageDocumentsResponseDto,
            documents_dtos::CommitResponseDto,
            documents_dtos::UpdateDocumentDto,
            documents_dtos::DocumentUrlResponseDto,
            documents_dtos::AttachmentContextDto,
            documents_dtos::RemovedResponseDto,
            ApiResponse<documents_dtos::DocumentResponseDto>,
            ApiResponse<Vec<documents_dtos::DocumentResponseDto>>,
            ApiResponse<documents_dtos::StageDocumentsResponseDto>,
            ApiResponse<documents_dtos::CommitResponseDto>,
            ApiResponse<documents_dtos::DocumentUrlResponseDto>,
            ApiResponse<documents_dtos::AttachmentContextDto>,
            ApiResponse<documents_dtos::RemovedResponseDto>,
        )
    ),
    tags(
        (name = "documents", description = "Conversation document staging and upload queue"),
    ),
    info(
        title = "Balungpisah Documents API",
        version = "0.1.0",
        description = "API documentation for the conversation document queue",
    )
)]
pub struct ApiDoc;

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
