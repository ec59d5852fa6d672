pub mod auth;

pub use auth::{admin_auth_middleware, issue_token, member_auth_middleware, Claims};
