pub mod pr_service;
pub mod sigv4;
pub mod storage;
pub mod upload;

pub use pr_service::{PrService, PrServiceError};
pub use storage::{ObjectStorage, R2Storage, StorageError};
