//! User service binary.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use swift_signals::auth::jwt;
use swift_signals::config::AppConfig;
use swift_signals::errors::{Result, ServiceError};
use swift_signals::grpc::server::serve_user_service;
use swift_signals::services::UserService;
use swift_signals::storage::repositories::SqlxUserRepository;
use swift_signals::storage::create_pool;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    swift_signals::observability::init_tracing();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "user service exited with error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;
    jwt::init(config.jwt_secret.as_bytes());

    let pool = create_pool(&config.database_url).await?;
    let service = UserService::new(Arc::new(SqlxUserRepository::new(pool)));

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|_| ServiceError::validation("APP_PORT does not form a valid listen address"))?;

    serve_user_service(addr, service).await
}
