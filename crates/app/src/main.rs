mod analytics;
mod auth;
mod cookies;
mod csrf;
mod jobs;
mod org;
mod pages;
mod problem;
mod router;
mod session;
mod telemetry;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;

use tenantdesk_queue::QueueFactory;
use tenantdesk_util::{load_env_file, AppConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    if config.auth.uses_development_secret() {
        warn!(stage = "app", "AUTH_SECRET is not set; using the development secret");
    }
    if config.auth.provider.is_none() {
        warn!(stage = "app", "no sign-in provider configured; set AUTH_CLIENT_ID to enable sign-in");
    }

    let queue_factory = QueueFactory::for_url(&config.queue_url)?;
    let http = reqwest::Client::builder()
        .user_agent(concat!("tenantdesk/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let state = router::AppState::new(metrics, &config, queue_factory, http)?;

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), public_url = %config.public_url, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
