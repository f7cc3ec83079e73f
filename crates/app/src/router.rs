use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use metrics_exporter_prometheus::PrometheusHandle;
use tenantdesk_core::Robots;
use tenantdesk_queue::QueueFactory;
use tenantdesk_util::{AnalyticsConfig, AppConfig};
use thiserror::Error;
use url::Url;

use crate::auth::{self, AuthProvider};
use crate::cookies::CookieSettings;
use crate::csrf::CsrfProtector;
use crate::session::SessionCodec;
use crate::{analytics, jobs, org, pages, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    public_url: Url,
    provider: Option<AuthProvider>,
    sessions: SessionCodec,
    csrf: CsrfProtector,
    cookies: CookieSettings,
    queue_factory: QueueFactory,
    queue_url: Arc<str>,
    analytics: Option<AnalyticsConfig>,
    robots: Arc<str>,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid auth secret: {0}")]
    Secret(#[from] InvalidLength),
    #[error("invalid provider url: {0}")]
    ProviderUrl(#[from] url::ParseError),
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        config: &AppConfig,
        queue_factory: QueueFactory,
        http: reqwest::Client,
    ) -> Result<Self, StateError> {
        let secret = config.auth.secret.as_bytes();
        let provider = config
            .auth
            .provider
            .as_ref()
            .map(|provider| AuthProvider::from_config(provider, &config.public_url, http))
            .transpose()?;
        let robots = Robots::for_site(
            &config.public_url.origin().ascii_serialization(),
            config.robots_indexable,
        )
        .render();

        Ok(Self {
            metrics,
            clock: Arc::new(Utc::now),
            public_url: config.public_url.clone(),
            provider,
            sessions: SessionCodec::new(secret, config.auth.session_max_age),
            csrf: CsrfProtector::new(secret)?,
            cookies: CookieSettings::new(config.public_url.scheme() == "https"),
            queue_factory,
            queue_url: Arc::from(config.queue_url.as_str()),
            analytics: config.analytics.clone(),
            robots: Arc::from(robots),
        })
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn public_url(&self) -> &Url {
        &self.public_url
    }

    pub fn provider(&self) -> Option<&AuthProvider> {
        self.provider.as_ref()
    }

    pub fn sessions(&self) -> &SessionCodec {
        &self.sessions
    }

    pub fn csrf(&self) -> &CsrfProtector {
        &self.csrf
    }

    pub fn cookies(&self) -> CookieSettings {
        self.cookies
    }

    pub fn queue_factory(&self) -> &QueueFactory {
        &self.queue_factory
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    pub fn analytics(&self) -> Option<&AnalyticsConfig> {
        self.analytics.as_ref()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/robots.txt", get(robots_txt))
        .route("/auth/signin", get(pages::signin_page))
        .route("/auth/error", get(pages::error_page))
        .route("/api/auth/providers", get(auth::providers))
        .route("/api/auth/csrf", get(auth::csrf))
        .route("/api/auth/signin", get(auth::signin_redirect))
        .route("/api/auth/signin/:provider", post(auth::signin))
        .route("/api/auth/callback/:provider", get(auth::callback))
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/signout", post(auth::signout))
        .route("/api/org/context", get(org::context))
        .route("/api/queues/:queue/jobs", post(jobs::enqueue))
        .route("/api/queues/:queue/counts", get(jobs::counts))
        .route("/api/analytics/bootstrap", get(analytics::bootstrap))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
}

async fn robots_txt(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.robots.to_string(),
    )
        .into_response()
}
