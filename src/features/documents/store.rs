use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::core::error::Result;

/// Everything a store needs to persist one document
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub conversation_id: Uuid,
    pub document_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub payload: Bytes,
}

/// Remote store that documents are uploaded to
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist the payload and return the identifier used to retrieve it later
    async fn upload(&self, request: &UploadRequest) -> Result<String>;

    /// Remove whatever an abandoned upload may have written.
    ///
    /// Succeeds when nothing was written.
    async fn delete(&self, request: &UploadRequest) -> Result<()>;

    /// Temporary download URL for a previously uploaded document
    async fn retrieval_url(&self, remote_id: &str) -> Result<String>;
}
