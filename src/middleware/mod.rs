pub mod auth;
pub mod response;

pub use auth::require_capability;
pub use response::{ApiResponse, ApiResult};
