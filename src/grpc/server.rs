//! Server bootstrap for the two gRPC binaries.
//!
//! The user service carries the authenticating interceptor; the intersection
//! service trusts the gateway, which has already authenticated the caller.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

use crate::auth::AuthInterceptor;
use crate::errors::{Result, ServiceError};
use crate::grpc::intersection_proto::intersection_service_server::IntersectionServiceServer;
use crate::grpc::user_proto::user_service_server::UserServiceServer;
use crate::grpc::{IntersectionGrpcService, UserGrpcService};
use crate::services::{IntersectionService, UserService};

fn server_error(err: tonic::transport::Error) -> ServiceError {
    ServiceError::internal_with_source("gRPC server terminated", Box::new(err))
}

pub async fn serve_user_service(addr: SocketAddr, service: UserService) -> Result<()> {
    info!(%addr, "user service listening");
    Server::builder()
        .add_service(UserServiceServer::with_interceptor(
            UserGrpcService::new(service),
            AuthInterceptor,
        ))
        .serve(addr)
        .await
        .map_err(server_error)
}

/// Serve the user service on an already-bound listener. Used by tests to grab
/// an ephemeral port before starting the server.
pub async fn serve_user_service_on(listener: TcpListener, service: UserService) -> Result<()> {
    Server::builder()
        .add_service(UserServiceServer::with_interceptor(
            UserGrpcService::new(service),
            AuthInterceptor,
        ))
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await
        .map_err(server_error)
}

pub async fn serve_intersection_service(
    addr: SocketAddr,
    service: IntersectionService,
) -> Result<()> {
    info!(%addr, "intersection service listening");
    Server::builder()
        .add_service(IntersectionServiceServer::new(IntersectionGrpcService::new(service)))
        .serve(addr)
        .await
        .map_err(server_error)
}

/// Listener-first variant of [`serve_intersection_service`].
pub async fn serve_intersection_service_on(
    listener: TcpListener,
    service: IntersectionService,
) -> Result<()> {
    Server::builder()
        .add_service(IntersectionServiceServer::new(IntersectionGrpcService::new(service)))
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await
        .map_err(server_error)
}
