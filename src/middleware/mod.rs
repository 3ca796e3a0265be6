pub mod auth;
pub mod response;

pub use auth::{bearer_token, extract_bearer, require_admin, require_session, CurrentUser};
pub use response::{ApiResponse, ApiResult};
