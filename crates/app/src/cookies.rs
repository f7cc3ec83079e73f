use std::time::Duration;

use axum::http::{header, HeaderMap};
use cookie::{time::Duration as CookieDuration, Cookie, SameSite};

const SESSION_COOKIE: &str = "tenantdesk.session-token";
const SECURE_SESSION_COOKIE: &str = "__Secure-tenantdesk.session-token";
const CSRF_COOKIE: &str = "tenantdesk.csrf-token";
const SECURE_CSRF_COOKIE: &str = "__Host-tenantdesk.csrf-token";
const STATE_COOKIE: &str = "tenantdesk.oauth-state";
const SECURE_STATE_COOKIE: &str = "__Secure-tenantdesk.oauth-state";

/// Names and attributes of the auth cookies. `secure` is set when the app is
/// served over https, which also switches to the prefixed cookie names.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    secure: bool,
}

impl CookieSettings {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    pub fn session_name(&self) -> &'static str {
        if self.secure {
            SECURE_SESSION_COOKIE
        } else {
            SESSION_COOKIE
        }
    }

    pub fn csrf_name(&self) -> &'static str {
        if self.secure {
            SECURE_CSRF_COOKIE
        } else {
            CSRF_COOKIE
        }
    }

    pub fn state_name(&self) -> &'static str {
        if self.secure {
            SECURE_STATE_COOKIE
        } else {
            STATE_COOKIE
        }
    }

    /// `Set-Cookie` value for a cookie that expires after `max_age`.
    pub fn build(&self, name: &'static str, value: String, max_age: Duration) -> String {
        let seconds = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        self.base(name, value)
            .max_age(CookieDuration::seconds(seconds))
            .build()
            .to_string()
    }

    /// `Set-Cookie` value for a browser-session cookie without `Max-Age`.
    pub fn build_session_scoped(&self, name: &'static str, value: String) -> String {
        self.base(name, value).build().to_string()
    }

    /// `Set-Cookie` value that removes the cookie.
    pub fn removal(&self, name: &'static str) -> String {
        self.base(name, String::new())
            .max_age(CookieDuration::ZERO)
            .build()
            .to_string()
    }

    fn base(&self, name: &'static str, value: String) -> cookie::CookieBuilder<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
    }
}

/// Returns the value of the named cookie from the request `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_named_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; tenantdesk.csrf-token=tok|sig"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));

        assert_eq!(
            read_cookie(&headers, CSRF_COOKIE).as_deref(),
            Some("tok|sig")
        );
        assert_eq!(read_cookie(&headers, "b").as_deref(), Some("2"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn secure_settings_use_prefixed_names() {
        let secure = CookieSettings::new(true);
        assert_eq!(secure.session_name(), SECURE_SESSION_COOKIE);
        assert_eq!(secure.csrf_name(), SECURE_CSRF_COOKIE);

        let value = secure.build(secure.session_name(), "jwt".to_string(), Duration::from_secs(60));
        assert!(value.starts_with("__Secure-tenantdesk.session-token=jwt"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Secure"));
        assert!(value.contains("Path=/"));
        assert!(value.contains("Max-Age=60"));
    }

    #[test]
    fn removal_expires_cookie() {
        let settings = CookieSettings::new(false);
        let value = settings.removal(settings.state_name());
        assert!(value.starts_with("tenantdesk.oauth-state=;"));
        assert!(value.contains("Max-Age=0"));
        assert!(!value.contains("Secure"));
    }
}
