use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Form, Json,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use metrics::counter;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tenantdesk_core::AuthErrorKind;
use tenantdesk_oauth::{AuthorizeUrlParams, OAuthClient, ProviderEndpoints};
use tenantdesk_util::ProviderConfig;
use tracing::{error, info, warn};
use ulid::Ulid;
use url::{form_urlencoded, Position, Url};

use crate::cookies::read_cookie;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::{SessionClaims, LOGIN_STATE_TTL};

const CODE_VERIFIER_LEN: usize = 64;
const SIGNIN_PAGE_PATH: &str = "/auth/signin";
const ERROR_PAGE_PATH: &str = "/auth/error";
const OAUTH_CALLBACK_ERROR: &str = "OAuthCallback";

/// The configured sign-in provider together with its OAuth client.
#[derive(Clone)]
pub struct AuthProvider {
    pub id: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub client: OAuthClient,
    pub signin_url: Url,
    pub callback_url: Url,
}

impl AuthProvider {
    pub fn from_config(
        config: &ProviderConfig,
        public_url: &Url,
        http: reqwest::Client,
    ) -> Result<Self, url::ParseError> {
        let signin_url = public_url.join(&format!("/api/auth/signin/{}", config.id))?;
        let callback_url = public_url.join(&format!("/api/auth/callback/{}", config.id))?;
        let client = OAuthClient::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            ProviderEndpoints {
                authorize_url: config.authorize_url.clone(),
                token_url: config.token_url.clone(),
                userinfo_url: config.userinfo_url.clone(),
            },
            http,
        );
        Ok(Self {
            id: config.id.clone(),
            name: config.name.clone(),
            scopes: config.scopes.clone(),
            client,
            signin_url,
            callback_url,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ProviderSummary {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    signin_url: String,
    callback_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackUrlQuery {
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthForm {
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn providers(State(state): State<AppState>) -> Json<BTreeMap<String, ProviderSummary>> {
    let mut providers = BTreeMap::new();
    if let Some(provider) = state.provider() {
        providers.insert(
            provider.id.clone(),
            ProviderSummary {
                id: provider.id.clone(),
                name: provider.name.clone(),
                kind: "oauth",
                signin_url: provider.signin_url.to_string(),
                callback_url: provider.callback_url.to_string(),
            },
        );
    }
    Json(providers)
}

pub async fn csrf(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookies = state.cookies();
    let token = state
        .csrf()
        .token_for(read_cookie(&headers, cookies.csrf_name()).as_deref());

    let mut set_cookies = Vec::new();
    if token.fresh {
        set_cookies.push(cookies.build_session_scoped(cookies.csrf_name(), token.cookie_value));
    }
    (
        set_cookie_headers(set_cookies),
        Json(json!({ "csrf_token": token.token })),
    )
        .into_response()
}

pub async fn signin_redirect(
    State(state): State<AppState>,
    Query(query): Query<CallbackUrlQuery>,
) -> Response {
    let callback_url = safe_callback_url(state.public_url(), query.callback_url.as_deref());
    let location = with_query(SIGNIN_PAGE_PATH, &[("callback_url", callback_url.as_str())]);
    redirect_found(&location, Vec::new())
}

pub async fn signin(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<AuthForm>,
) -> Response {
    let cookies = state.cookies();
    if let Err(err) = state.csrf().verify(
        read_cookie(&headers, cookies.csrf_name()).as_deref(),
        &form.csrf_token,
    ) {
        counter!("auth_signin_total", "result" => "csrf_failed").increment(1);
        warn!(stage = "auth", provider = %provider_id, error = %err, "sign-in rejected by csrf check");
        return redirect_found(
            &with_query(SIGNIN_PAGE_PATH, &[("csrf", "true")]),
            Vec::new(),
        );
    }

    let Some(provider) = state.provider().filter(|provider| provider.id == provider_id) else {
        counter!("auth_signin_total", "result" => "unknown_provider").increment(1);
        warn!(stage = "auth", provider = %provider_id, "sign-in requested for unknown provider");
        return error_redirect(AuthErrorKind::Configuration.code(), Vec::new());
    };

    let state_value = Ulid::new().to_string();
    let code_verifier = generate_code_verifier();
    let code_challenge = compute_code_challenge(&code_verifier);
    let callback_url = safe_callback_url(state.public_url(), form.callback_url.as_deref());

    let login_state = match state.sessions().issue_login_state(
        &state_value,
        &code_verifier,
        &provider.id,
        &callback_url,
        state.now(),
    ) {
        Ok(token) => token,
        Err(err) => {
            counter!("auth_signin_total", "result" => "error").increment(1);
            error!(stage = "auth", provider = %provider.id, error = %err, "failed to sign oauth state");
            return error_redirect(AuthErrorKind::Configuration.code(), Vec::new());
        }
    };

    let authorize_url = provider.client.authorize_url(&AuthorizeUrlParams {
        state: &state_value,
        redirect_uri: provider.callback_url.as_str(),
        code_challenge: &code_challenge,
        scopes: &provider.scopes,
    });

    counter!("auth_signin_total", "result" => "redirected").increment(1);
    info!(stage = "auth", provider = %provider.id, "redirecting to provider");
    redirect_found(
        authorize_url.as_str(),
        vec![cookies.build(cookies.state_name(), login_state, LOGIN_STATE_TTL)],
    )
}

pub async fn callback(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let cookies = state.cookies();
    let clear_state = cookies.removal(cookies.state_name());

    if let Some(provider_error) = query.error.as_deref() {
        counter!("auth_callback_total", "result" => "provider_error").increment(1);
        warn!(stage = "auth", provider = %provider_id, error = %provider_error, "provider returned an error");
        let code = if provider_error == "access_denied" {
            AuthErrorKind::AccessDenied.code()
        } else {
            OAUTH_CALLBACK_ERROR
        };
        return error_redirect(code, vec![clear_state]);
    }

    let Some(login_state) = read_cookie(&headers, cookies.state_name())
        .and_then(|token| state.sessions().decode_login_state(&token, state.now()).ok())
    else {
        return callback_failure(&provider_id, "invalid_state_cookie", clear_state);
    };

    let Some(provider) = state
        .provider()
        .filter(|provider| provider.id == provider_id && login_state.provider == provider_id)
    else {
        return callback_failure(&provider_id, "provider_mismatch", clear_state);
    };

    let state_matches = query
        .state
        .as_deref()
        .map(|value| bool::from(value.as_bytes().ct_eq(login_state.state.as_bytes())))
        .unwrap_or(false);
    if !state_matches {
        return callback_failure(&provider_id, "state_mismatch", clear_state);
    }

    let Some(code) = query.code.as_deref().filter(|code| !code.is_empty()) else {
        return callback_failure(&provider_id, "missing_code", clear_state);
    };

    let tokens = match provider
        .client
        .exchange_code(code, &login_state.code_verifier, provider.callback_url.as_str())
        .await
    {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!(stage = "auth", provider = %provider_id, reason = %err.reason(), error = %err, "code exchange failed");
            return callback_failure(&provider_id, "token_exchange", clear_state);
        }
    };

    let user = match provider.client.fetch_userinfo(&tokens.access_token).await {
        Ok(user) => user,
        Err(err) => {
            warn!(stage = "auth", provider = %provider_id, reason = %err.reason(), error = %err, "userinfo request failed");
            return callback_failure(&provider_id, "userinfo", clear_state);
        }
    };

    let (session_token, claims) = match state.sessions().issue_session(&user, state.now()) {
        Ok(issued) => issued,
        Err(err) => {
            counter!("auth_callback_total", "result" => "error").increment(1);
            error!(stage = "auth", provider = %provider_id, error = %err, "failed to sign session");
            return error_redirect(AuthErrorKind::Configuration.code(), vec![clear_state]);
        }
    };

    counter!("auth_callback_total", "result" => "success").increment(1);
    info!(stage = "auth", provider = %provider_id, sub = %claims.sub, "user signed in");

    let destination = safe_callback_url(state.public_url(), Some(&login_state.callback_url));
    redirect_found(
        &destination,
        vec![
            clear_state,
            cookies.build(
                cookies.session_name(),
                session_token,
                state.sessions().max_age(),
            ),
        ],
    )
}

pub async fn session(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    match current_session(&state, &headers) {
        Some(claims) => Json(json!({
            "user": {
                "id": claims.sub,
                "name": claims.name,
                "email": claims.email,
                "image": claims.picture,
            },
            "expires": claims.expires_at().to_rfc3339(),
        })),
        None => Json(json!({})),
    }
}

pub async fn signout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AuthForm>,
) -> Result<Response, ProblemResponse> {
    let cookies = state.cookies();
    if let Err(err) = state.csrf().verify(
        read_cookie(&headers, cookies.csrf_name()).as_deref(),
        &form.csrf_token,
    ) {
        counter!("auth_signout_total", "result" => "csrf_failed").increment(1);
        warn!(stage = "auth", error = %err, "sign-out rejected by csrf check");
        return Err(ProblemResponse::new(
            StatusCode::FORBIDDEN,
            "csrf_failed",
            "csrf token is missing or invalid",
        ));
    }

    counter!("auth_signout_total", "result" => "success").increment(1);
    let destination = safe_callback_url(state.public_url(), form.callback_url.as_deref());
    Ok(redirect_found(
        &destination,
        vec![cookies.removal(cookies.session_name())],
    ))
}

/// Returns the claims of a valid, unexpired session cookie.
pub fn current_session(state: &AppState, headers: &HeaderMap) -> Option<SessionClaims> {
    let token = read_cookie(headers, state.cookies().session_name())?;
    match state.sessions().decode_session(&token, state.now()) {
        Ok(claims) => Some(claims),
        Err(err) => {
            info!(stage = "auth", error = %err, "ignoring invalid session cookie");
            None
        }
    }
}

/// Resolves a user-supplied callback URL to a location on this site.
///
/// Root-relative paths and absolute URLs on the public origin are kept;
/// anything else becomes `/`.
pub fn safe_callback_url(public_url: &Url, candidate: Option<&str>) -> String {
    let Some(candidate) = candidate.map(str::trim).filter(|value| !value.is_empty()) else {
        return "/".to_string();
    };

    if candidate.starts_with('/') {
        if candidate.starts_with("//") || candidate.starts_with("/\\") {
            return "/".to_string();
        }
        let path = candidate.split(['?', '#']).next().unwrap_or_default();
        if path.split('/').any(|segment| segment == "..") {
            return "/".to_string();
        }
        return match public_url.join(candidate) {
            Ok(url) if url.origin() == public_url.origin() => url[Position::BeforePath..].to_string(),
            _ => "/".to_string(),
        };
    }

    match Url::parse(candidate) {
        Ok(url) if url.origin() == public_url.origin() => url.to_string(),
        _ => "/".to_string(),
    }
}

pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; CODE_VERIFIER_LEN];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn compute_code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// `302 Found` to `location`, appending the given `Set-Cookie` values.
pub fn redirect_found(location: &str, set_cookies: Vec<String>) -> Response {
    (
        StatusCode::FOUND,
        set_cookie_headers(set_cookies),
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

pub fn error_redirect(code: &str, set_cookies: Vec<String>) -> Response {
    redirect_found(&with_query(ERROR_PAGE_PATH, &[("error", code)]), set_cookies)
}

pub fn set_cookie_headers(values: Vec<String>) -> AppendHeaders<Vec<(HeaderName, String)>> {
    AppendHeaders(
        values
            .into_iter()
            .map(|value| (header::SET_COOKIE, value))
            .collect(),
    )
}

fn callback_failure(provider_id: &str, reason: &'static str, clear_state: String) -> Response {
    counter!("auth_callback_total", "result" => reason).increment(1);
    warn!(stage = "auth", provider = %provider_id, reason, "oauth callback rejected");
    error_redirect(OAUTH_CALLBACK_ERROR, vec![clear_state])
}

fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    format!("{path}?{query}")
}
