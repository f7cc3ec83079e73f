use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use crate::auth::current_session;
use crate::router::AppState;

/// Client-side analytics init options.
#[derive(Debug, Serialize)]
pub struct AnalyticsBootstrap {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_host: Option<String>,
    person_profiles: &'static str,
    capture_pageview: bool,
    bootstrap: BootstrapIdentity,
}

#[derive(Debug, Serialize)]
struct BootstrapIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    distinct_id: Option<String>,
}

pub async fn bootstrap(State(state): State<AppState>, headers: HeaderMap) -> Json<AnalyticsBootstrap> {
    let analytics = state.analytics();
    let distinct_id = analytics
        .and_then(|_| current_session(&state, &headers))
        .map(|claims| claims.sub);

    Json(AnalyticsBootstrap {
        enabled: analytics.is_some(),
        api_key: analytics.map(|config| config.api_key.clone()),
        api_host: analytics.map(|config| config.api_host.as_str().trim_end_matches('/').to_string()),
        person_profiles: "identified_only",
        capture_pageview: true,
        bootstrap: BootstrapIdentity { distinct_id },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use serde_json::Value;
    use tenantdesk_oauth::UserInfo;
    use tenantdesk_util::AnalyticsConfig;
    use tower::ServiceExt;
    use url::Url;

    use crate::router::app_router;
    use crate::test_support::{body_string, test_config, test_state_with_config};

    #[tokio::test]
    async fn disabled_without_key() {
        let (state, _) = test_state_with_config(test_config(None)).await;
        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/analytics/bootstrap")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        let body: Value = serde_json::from_str(&body_string(response).await).expect("json");
        assert_eq!(body["enabled"], false);
        assert!(body.get("api_key").is_none());
        assert_eq!(body["person_profiles"], "identified_only");
    }

    #[tokio::test]
    async fn bootstraps_identity_from_session() {
        let mut config = test_config(None);
        config.analytics = Some(AnalyticsConfig {
            api_key: "phc_test".to_string(),
            api_host: Url::parse("https://eu.i.posthog.com").expect("url"),
        });
        let (state, _) = test_state_with_config(config).await;
        let (token, _) = state
            .sessions()
            .issue_session(
                &UserInfo {
                    sub: "user-7".to_string(),
                    name: None,
                    email: None,
                    picture: None,
                },
                state.now(),
            )
            .expect("session");

        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/analytics/bootstrap")
                    .header(header::COOKIE, format!("tenantdesk.session-token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        let body: Value = serde_json::from_str(&body_string(response).await).expect("json");
        assert_eq!(body["enabled"], true);
        assert_eq!(body["api_key"], "phc_test");
        assert_eq!(body["api_host"], "https://eu.i.posthog.com");
        assert_eq!(body["capture_pageview"], true);
        assert_eq!(body["bootstrap"]["distinct_id"], "user-7");
    }
}
