//! Authentication primitives: token issuance/parsing, password hashing and
//! the request-scoped caller context.

pub mod context;
pub mod hashing;
pub mod jwt;

pub use context::{auth_context, AuthContext, AuthInterceptor};
