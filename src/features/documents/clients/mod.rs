mod minio_document_store;

pub use minio_document_store::MinIODocumentStore;
