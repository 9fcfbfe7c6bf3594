pub mod clients;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod routes;
pub mod services;
pub mod signature;
pub mod staging;
pub mod store;

pub use clients::MinIODocumentStore;
pub use routes::routes;
pub use services::DocumentQueueService;
