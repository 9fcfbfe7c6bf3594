mod document;

pub use document::{Document, DocumentStatus, SelectedFile, UploadOutcome};
