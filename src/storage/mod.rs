//! Persistence layer: connection pooling, embedded migrations and the
//! repository implementations.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use migrations::run_migrations;
pub use pool::{check_connection, create_pool, DbPool};
