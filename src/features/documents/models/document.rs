use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::features::documents::signature::{signature, Signature};

/// A file handed over by the selection source, not yet staged
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch, as reported by the selection source
    pub last_modified: i64,
    pub content_type: String,
    pub payload: Bytes,
}

impl SelectedFile {
    /// Build a selection whose size is taken from the payload
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        last_modified: i64,
        payload: Bytes,
    ) -> Self {
        Self {
            name: name.into(),
            size: payload.len() as u64,
            last_modified,
            content_type: content_type.into(),
            payload,
        }
    }

    pub fn signature(&self) -> Signature {
        signature(&self.name, self.size, self.last_modified)
    }
}

/// Lifecycle of a document
///
/// `Pending` and `Uploading` are transient; `Ready` and `Error` are terminal.
/// The remote id only exists on `Ready` and the message only on `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Pending,
    Uploading,
    Ready { remote_id: String },
    Error { message: String },
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Ready { .. } => "ready",
            DocumentStatus::Error { .. } => "error",
        }
    }
}

/// Result of a single upload as reported back to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { remote_id: String },
    Failed { message: String },
}

/// One file attached to a conversation
///
/// The payload is a shared handle on the selected bytes; cloning a document
/// never copies the file content.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub last_modified: i64,
    pub content_type: String,
    pub payload: Bytes,
    pub status: DocumentStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Stage a selected file as a new pending document
    pub fn pending(file: SelectedFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: file.name,
            size: file.size,
            last_modified: file.last_modified,
            content_type: file.content_type,
            payload: file.payload,
            status: DocumentStatus::Pending,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn signature(&self) -> Signature {
        signature(&self.name, self.size, self.last_modified)
    }

    pub fn remote_id(&self) -> Option<&str> {
        match &self.status {
            DocumentStatus::Ready { remote_id } => Some(remote_id),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            DocumentStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status, DocumentStatus::Ready { .. })
    }

    /// `pending -> uploading`; any other starting state is refused
    pub fn into_uploading(self) -> Option<Self> {
        match self.status {
            DocumentStatus::Pending => Some(Self {
                status: DocumentStatus::Uploading,
                ..self
            }),
            _ => None,
        }
    }

    /// `uploading -> ready | error`; returns `None` when the document is not
    /// awaiting an upload result
    pub fn resolved(&self, outcome: &UploadOutcome) -> Option<Self> {
        if self.status != DocumentStatus::Uploading {
            return None;
        }

        let status = match outcome {
            UploadOutcome::Uploaded { remote_id } => DocumentStatus::Ready {
                remote_id: remote_id.clone(),
            },
            UploadOutcome::Failed { message } => DocumentStatus::Error {
                message: message.clone(),
            },
        };

        Some(Self {
            status,
            ..self.clone()
        })
    }
}
