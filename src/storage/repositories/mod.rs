//! Repository traits and their SQLx and in-memory implementations.

pub mod intersection;
pub mod memory;
pub mod user;

pub use intersection::{IntersectionRepository, SqlxIntersectionRepository};
pub use memory::{InMemoryIntersectionRepository, InMemoryUserRepository};
pub use user::{SqlxUserRepository, UserRepository};
