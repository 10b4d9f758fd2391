//! gRPC boundary: generated contracts, wire conversion, service adapters and
//! server bootstrap.

pub mod convert;
pub mod intersection;
pub mod server;
pub mod user;

/// Generated types for `swiftsignals.user.v1`.
pub mod user_proto {
    #![allow(clippy::all)]
    tonic::include_proto!("swiftsignals.user.v1");
}

/// Generated types for `swiftsignals.intersection.v1`.
pub mod intersection_proto {
    #![allow(clippy::all)]
    tonic::include_proto!("swiftsignals.intersection.v1");
}

pub use intersection::IntersectionGrpcService;
pub use user::UserGrpcService;
