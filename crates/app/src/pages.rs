//! Server-rendered auth pages.

use std::fmt::Write as _;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use tenantdesk_core::{escape_html, AuthErrorKind, PageMetadata};

use crate::auth::{safe_callback_url, set_cookie_headers};
use crate::cookies::read_cookie;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct SigninPageQuery {
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub csrf: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorPageQuery {
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn signin_page(
    State(state): State<AppState>,
    Query(query): Query<SigninPageQuery>,
    headers: HeaderMap,
) -> Response {
    let cookies = state.cookies();
    let csrf = state
        .csrf()
        .token_for(read_cookie(&headers, cookies.csrf_name()).as_deref());
    let callback_url = safe_callback_url(state.public_url(), query.callback_url.as_deref());

    let mut main = String::from("<h1>Sign in</h1>");
    if query.csrf.as_deref() == Some("true") {
        main.push_str("<p role=\"alert\">Your sign-in form expired. Please try again.</p>");
    } else if let Some(error) = query.error.as_deref() {
        let kind = AuthErrorKind::from_code(Some(error));
        let _ = write!(main, "<p role=\"alert\">{}</p>", escape_html(kind.message()));
    }

    match state.provider() {
        Some(provider) => {
            let _ = write!(
                main,
                concat!(
                    "<form method=\"post\" action=\"/api/auth/signin/{id}\">",
                    "<input type=\"hidden\" name=\"csrf_token\" value=\"{token}\">",
                    "<input type=\"hidden\" name=\"callback_url\" value=\"{callback}\">",
                    "<button type=\"submit\">Sign in with {name}</button>",
                    "</form>"
                ),
                id = escape_html(&provider.id),
                token = escape_html(&csrf.token),
                callback = escape_html(&callback_url),
                name = escape_html(&provider.name),
            );
        }
        None => main.push_str("<p>No sign-in provider is configured.</p>"),
    }

    let mut set_cookies = Vec::new();
    if csrf.fresh {
        set_cookies.push(cookies.build_session_scoped(cookies.csrf_name(), csrf.cookie_value));
    }

    (
        set_cookie_headers(set_cookies),
        Html(render_page(&PageMetadata::sign_in(), &main)),
    )
        .into_response()
}

pub async fn error_page(Query(query): Query<ErrorPageQuery>) -> Response {
    let kind = AuthErrorKind::from_code(query.error.as_deref());
    let status =
        StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut main = String::new();
    let _ = write!(
        main,
        "<h1>{}</h1><p>{}</p><p><a href=\"/auth/signin\">Sign in</a></p>",
        escape_html(kind.heading()),
        escape_html(kind.message()),
    );

    (status, Html(render_page(&PageMetadata::auth_error(), &main))).into_response()
}

fn render_page(metadata: &PageMetadata, main: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head>{}</head><body><main>{}</main></body></html>",
        metadata.render_head(),
        main
    )
}
