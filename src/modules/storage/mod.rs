//! Storage module for document objects
//!
//! Provides MinIO/S3-compatible storage client for uploads and presigned
//! download URLs.

mod minio_client;

pub use minio_client::MinIOClient;
