pub mod auth;

pub use auth::{authenticate, authorize_admin, require_admin, require_token};
