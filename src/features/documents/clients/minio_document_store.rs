use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::error::Result;
use crate::features::documents::dtos::get_extension_from_content_type;
use crate::features::documents::store::{DocumentStore, UploadRequest};
use crate::modules::storage::MinIOClient;

/// Document store backed by a private MinIO prefix
///
/// The object key doubles as the remote id.
pub struct MinIODocumentStore {
    minio_client: Arc<MinIOClient>,
}

impl MinIODocumentStore {
    pub fn new(minio_client: Arc<MinIOClient>) -> Self {
        Self { minio_client }
    }
}

/// Path: conversation-documents/{conversation_id}/{document_id}.{extension}
fn object_path(request: &UploadRequest) -> String {
    let extension = get_extension_from_content_type(&request.content_type)
        .or_else(|| {
            request
                .file_name
                .rsplit_once('.')
                .map(|(_, ext)| ext)
                .filter(|ext| !ext.is_empty())
        })
        .unwrap_or("bin");

    format!(
        "conversation-documents/{}/{}.{}",
        request.conversation_id, request.document_id, extension
    )
}

#[async_trait]
impl DocumentStore for MinIODocumentStore {
    async fn upload(&self, request: &UploadRequest) -> Result<String> {
        let key = self.minio_client.private_key(&object_path(request));

        let remote_id = self
            .minio_client
            .upload(&key, &request.payload, &request.content_type)
            .await?;

        debug!(
            "Document {} stored at {}",
            request.document_id, remote_id
        );
        Ok(remote_id)
    }

    async fn delete(&self, request: &UploadRequest) -> Result<()> {
        let key = self.minio_client.private_key(&object_path(request));
        self.minio_client.delete(&key).await
    }

    async fn retrieval_url(&self, remote_id: &str) -> Result<String> {
        self.minio_client.get_presigned_url(remote_id).await
    }
}
