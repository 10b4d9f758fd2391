//! Domain services: validation, permissions and invariants live here, above
//! the repositories and below the gRPC adapters.

pub mod intersection_service;
pub mod user_service;
pub mod validation;

pub use intersection_service::{IntersectionService, OptimisationOutcome};
pub use user_service::{IssuedToken, UserService};
