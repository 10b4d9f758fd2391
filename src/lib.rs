//! Swift-Signals backend services.
//!
//! Two gRPC services built on one library: the user service owns identity,
//! credentials, roles and the user↔intersection association; the intersection
//! service owns intersections and their optimisation lifecycle. The
//! [`clients`] module holds the typed clients the API gateway composes.

pub mod auth;
pub mod clients;
pub mod config;
pub mod domain;
pub mod errors;
pub mod grpc;
pub mod observability;
pub mod services;
pub mod storage;
