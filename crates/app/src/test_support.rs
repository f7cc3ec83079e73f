use std::{sync::Arc, time::Duration};

use axum::{
    http::header,
    response::Response,
};
use http_body_util::BodyExt;
use tenantdesk_queue::{MemoryConnector, QueueFactory};
use tenantdesk_util::{AppConfig, AuthConfig, Environment, ProviderConfig};
use url::Url;

use crate::router::AppState;
use crate::telemetry;

pub(crate) struct TestProvider {
    base: String,
}

impl TestProvider {
    pub(crate) fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn into_config(self) -> ProviderConfig {
        let url = |path: &str| Url::parse(&format!("{}{path}", self.base)).expect("provider url");
        ProviderConfig {
            id: "oidc".to_string(),
            name: "Test Provider".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            authorize_url: url("/authorize"),
            token_url: url("/token"),
            userinfo_url: url("/userinfo"),
            scopes: vec!["openid".to_string(), "email".to_string()],
        }
    }
}

pub(crate) fn test_config(provider: Option<TestProvider>) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().expect("addr"),
        environment: Environment::Test,
        public_url: Url::parse("http://localhost:8080").expect("url"),
        auth: AuthConfig {
            secret: "test-secret".to_string(),
            session_max_age: Duration::from_secs(3600),
            provider: provider.map(TestProvider::into_config),
        },
        queue_url: "memory://test".to_string(),
        analytics: None,
        robots_indexable: false,
    }
}

pub(crate) async fn test_state(provider: Option<TestProvider>) -> (AppState, MemoryConnector) {
    test_state_with_config(test_config(provider)).await
}

/// State whose queue factory is backed by an inspectable memory connector.
pub(crate) async fn test_state_with_config(config: AppConfig) -> (AppState, MemoryConnector) {
    let metrics = telemetry::init_metrics().expect("metrics init");
    let connector = MemoryConnector::new();
    let factory = QueueFactory::new(Arc::new(connector.clone()));
    let state = AppState::new(metrics, &config, factory, reqwest::Client::new()).expect("state");
    (state, connector)
}

pub(crate) async fn body_string(response: Response) -> String {
    let collected = response
        .into_body()
        .collect()
        .await
        .expect("body should read");
    String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8")
}

pub(crate) fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().expect("ascii cookie").to_string())
        .collect()
}

/// `name=value` part of a `Set-Cookie` header, usable as a `Cookie` header.
pub(crate) fn cookie_pair(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .expect("ascii location")
        .to_string()
}
