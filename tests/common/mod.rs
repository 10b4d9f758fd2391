//! Shared harness for the in-process gRPC integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tonic::transport::Channel;

use swift_signals::auth::jwt;
use swift_signals::grpc::server::{serve_intersection_service_on, serve_user_service_on};
use swift_signals::services::{IntersectionService, UserService};
use swift_signals::storage::create_pool;
use swift_signals::storage::repositories::{
    IntersectionRepository, SqlxIntersectionRepository, SqlxUserRepository,
};

pub const TEST_SECRET: &[u8] = b"integration-test-secret";

pub struct UserHarness {
    pub channel: Channel,
    pub repo: Arc<SqlxUserRepository>,
}

/// Boot a user service over a fresh in-memory database on an ephemeral port.
pub async fn start_user_service() -> UserHarness {
    jwt::init(TEST_SECRET);
    let pool = create_pool("sqlite::memory:").await.expect("pool");
    let repo = Arc::new(SqlxUserRepository::new(pool));
    let service = UserService::new(repo.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = serve_user_service_on(listener, service).await;
    });

    UserHarness { channel: connect(addr).await, repo }
}

/// Boot an intersection service over a fresh in-memory database.
pub async fn start_intersection_service() -> Channel {
    let pool = create_pool("sqlite::memory:").await.expect("pool");
    let repo = Arc::new(SqlxIntersectionRepository::new(pool));
    start_intersection_service_with(repo).await
}

/// Boot an intersection service over an arbitrary repository implementation.
pub async fn start_intersection_service_with(
    repo: Arc<dyn IntersectionRepository>,
) -> Channel {
    let service = IntersectionService::new(repo);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = serve_intersection_service_on(listener, service).await;
    });
    connect(addr).await
}

async fn connect(addr: SocketAddr) -> Channel {
    let endpoint = format!("http://{addr}");
    for _ in 0..40 {
        if let Ok(channel) =
            Channel::from_shared(endpoint.clone()).expect("endpoint").connect().await
        {
            return channel;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("server at {endpoint} did not come up");
}
