mod document_queue_service;

pub use document_queue_service::{DocumentQueue, DocumentQueueService, StageOutcome};
