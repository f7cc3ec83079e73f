use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Endpoints of an OAuth 2.0 / OpenID Connect provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
}

/// Client for the authorization-code flow against a single provider.
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    endpoints: ProviderEndpoints,
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    /// Creates a new client with the provided HTTP instance and configuration.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        endpoints: ProviderEndpoints,
        http: Client,
    ) -> Self {
        Self {
            http,
            endpoints,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Builds the authorization URL with PKCE parameters.
    ///
    /// Query parameters already present on the configured authorize URL are
    /// preserved.
    pub fn authorize_url(&self, params: &AuthorizeUrlParams<'_>) -> Url {
        let mut url = self.endpoints.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", params.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &params.scopes.join(" "));
            query.append_pair("state", params.state);
            query.append_pair("code_challenge", params.code_challenge);
            query.append_pair("code_challenge_method", "S256");
        }

        url
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let response = self
            .http
            .post(self.endpoints.token_url.clone())
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await?;

        parse_json(response).await
    }

    /// Loads the OpenID Connect userinfo document for an access token.
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, OAuthError> {
        let response = self
            .http
            .get(self.endpoints.userinfo_url.clone())
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        parse_json(response).await
    }
}

/// Parameters required to generate an authorization URL.
pub struct AuthorizeUrlParams<'a> {
    pub state: &'a str,
    pub redirect_uri: &'a str,
    pub code_challenge: &'a str,
    pub scopes: &'a [String],
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Standard OpenID Connect claims returned by the userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Errors that can occur during OAuth interactions.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl OAuthError {
    /// Short reason suitable for logs and metric labels.
    pub fn reason(&self) -> String {
        match self {
            Self::Status { status, .. } => status.as_u16().to_string(),
            Self::Http(err) if err.is_decode() => "decode".to_string(),
            Self::Http(_) => "transport".to_string(),
        }
    }
}

async fn parse_json<T>(response: Response) -> Result<T, OAuthError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(OAuthError::Status { status, body });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::borrow::Cow;

    fn endpoints(base: &str) -> ProviderEndpoints {
        ProviderEndpoints {
            authorize_url: Url::parse(&format!("{base}/authorize")).expect("url"),
            token_url: Url::parse(&format!("{base}/token")).expect("url"),
            userinfo_url: Url::parse(&format!("{base}/userinfo")).expect("url"),
        }
    }

    fn client(base: &str) -> OAuthClient {
        OAuthClient::new(
            "client",
            "secret",
            endpoints(base),
            Client::builder().build().expect("client"),
        )
    }

    #[test]
    fn authorize_url_contains_expected_parameters() {
        let client = client("https://id.example.com/oauth2");
        let scopes = vec!["openid".to_string(), "email".to_string()];
        let url = client.authorize_url(&AuthorizeUrlParams {
            state: "state-123",
            redirect_uri: "https://app.example.com/api/auth/callback/oidc",
            code_challenge: "challenge",
            scopes: &scopes,
        });

        assert!(url
            .as_str()
            .starts_with("https://id.example.com/oauth2/authorize?"));
        let query: Vec<(Cow<'_, str>, Cow<'_, str>)> = url.query_pairs().collect();
        assert!(query.contains(&(Cow::Borrowed("client_id"), Cow::Borrowed("client"))));
        assert!(query.contains(&(Cow::Borrowed("state"), Cow::Borrowed("state-123"))));
        assert!(query.contains(&(Cow::Borrowed("code_challenge"), Cow::Borrowed("challenge"))));
        assert!(query.contains(&(
            Cow::Borrowed("code_challenge_method"),
            Cow::Borrowed("S256")
        )));
        assert!(query
            .iter()
            .any(|(k, v)| k == "scope" && v == "openid email"));
    }

    #[test]
    fn authorize_url_keeps_existing_query() {
        let mut endpoints = endpoints("https://id.example.com");
        endpoints.authorize_url =
            Url::parse("https://id.example.com/authorize?prompt=login").expect("url");
        let client = OAuthClient::new("client", "secret", endpoints, Client::new());

        let url = client.authorize_url(&AuthorizeUrlParams {
            state: "s",
            redirect_uri: "https://app.example.com/cb",
            code_challenge: "c",
            scopes: &[],
        });
        assert!(url.query_pairs().any(|(k, v)| k == "prompt" && v == "login"));
        assert!(url.query_pairs().any(|(k, _)| k == "client_id"));
    }

    #[tokio::test]
    async fn exchange_code_returns_tokens() {
        let server = MockServer::start_async().await;
        let client = client(&server.url("/oauth2"));

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth2/token")
                    .body_contains("code=test-code")
                    .body_contains("code_verifier=verifier")
                    .body_contains("grant_type=authorization_code");
                then.status(200).json_body(json!({
                    "access_token": "access",
                    "refresh_token": "refresh",
                    "expires_in": 3600,
                    "scope": "openid email",
                    "token_type": "Bearer"
                }));
            })
            .await;

        let response = client
            .exchange_code("test-code", "verifier", "https://example.com")
            .await
            .expect("exchange");
        mock.assert_async().await;
        assert_eq!(response.access_token, "access");
        assert_eq!(response.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(response.scope.as_deref(), Some("openid email"));
    }

    #[tokio::test]
    async fn fetch_userinfo_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let client = client(&server.url("/oauth2"));

        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/oauth2/userinfo")
                    .header("Authorization", "Bearer access");
                then.status(200).json_body(json!({
                    "sub": "user-1",
                    "name": "Ada",
                    "email": "ada@example.com"
                }));
            })
            .await;

        let info = client.fetch_userinfo("access").await.expect("userinfo");
        mock.assert_async().await;
        assert_eq!(info.sub, "user-1");
        assert_eq!(info.email.as_deref(), Some("ada@example.com"));
        assert_eq!(info.picture, None);
    }

    #[tokio::test]
    async fn non_success_status_returns_error() {
        let server = MockServer::start_async().await;
        let client = client(&server.url("/oauth2"));

        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(400).body("bad request");
            })
            .await;

        let err = client
            .exchange_code("code", "verifier", "https://example.com")
            .await
            .expect_err("should error");
        assert_eq!(err.reason(), "400");
        match err {
            OAuthError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "bad request");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
