use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tenantdesk_oauth::UserInfo;
use thiserror::Error;

const SESSION_AUDIENCE: &str = "session";
const LOGIN_STATE_AUDIENCE: &str = "oauth_state";

/// Lifetime of the cookie that carries an in-flight OAuth login.
pub const LOGIN_STATE_TTL: Duration = Duration::from_secs(15 * 60);

/// Signs and verifies the session and login-state cookies (HS256 JWTs).
#[derive(Clone)]
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    max_age: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

/// State carried across the provider redirect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginStateClaims {
    pub aud: String,
    pub state: String,
    pub code_verifier: String,
    pub provider: String,
    pub callback_url: String,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to sign token: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(String),
}

impl SessionCodec {
    pub fn new(secret: &[u8], max_age: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn issue_session(
        &self,
        user: &UserInfo,
        now: DateTime<Utc>,
    ) -> Result<(String, SessionClaims), SessionError> {
        let claims = SessionClaims {
            sub: user.sub.clone(),
            aud: SESSION_AUDIENCE.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            picture: user.picture.clone(),
            iat: now.timestamp(),
            exp: expiry(now, self.max_age),
        };
        let token = self.encode_claims(&claims)?;
        Ok((token, claims))
    }

    pub fn decode_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, SessionError> {
        let claims: SessionClaims = self.decode_claims(token)?;
        check_claims(&claims.aud, SESSION_AUDIENCE, claims.exp, now)?;
        Ok(claims)
    }

    pub fn issue_login_state(
        &self,
        state: &str,
        code_verifier: &str,
        provider: &str,
        callback_url: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        self.encode_claims(&LoginStateClaims {
            aud: LOGIN_STATE_AUDIENCE.to_string(),
            state: state.to_string(),
            code_verifier: code_verifier.to_string(),
            provider: provider.to_string(),
            callback_url: callback_url.to_string(),
            exp: expiry(now, LOGIN_STATE_TTL),
        })
    }

    pub fn decode_login_state(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginStateClaims, SessionError> {
        let claims: LoginStateClaims = self.decode_claims(token)?;
        check_claims(&claims.aud, LOGIN_STATE_AUDIENCE, claims.exp, now)?;
        Ok(claims)
    }

    fn encode_claims<T: Serialize>(&self, claims: &T) -> Result<String, SessionError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(SessionError::Encode)
    }

    fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> Result<T, SessionError> {
        let data = decode::<T>(token, &self.decoding_key, &self.validation)
            .map_err(|err| SessionError::Invalid(format!("{err}")))?;
        Ok(data.claims)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> i64 {
    now.timestamp()
        .saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

fn check_claims(
    audience: &str,
    expected: &str,
    exp: i64,
    now: DateTime<Utc>,
) -> Result<(), SessionError> {
    if audience != expected {
        return Err(SessionError::Invalid("audience_mismatch".to_string()));
    }
    if now.timestamp() >= exp {
        return Err(SessionError::Invalid("token_expired".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn codec() -> SessionCodec {
        SessionCodec::new(b"test-secret", Duration::from_secs(3600))
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn user() -> UserInfo {
        UserInfo {
            sub: "user-1".to_string(),
            name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            picture: None,
        }
    }

    #[test]
    fn session_round_trips_until_expiry() {
        let codec = codec();
        let (token, issued) = codec.issue_session(&user(), now()).expect("issue");
        assert_eq!(issued.exp - issued.iat, 3600);

        let decoded = codec
            .decode_session(&token, now() + ChronoDuration::minutes(59))
            .expect("valid session");
        assert_eq!(decoded, issued);
        assert_eq!(decoded.expires_at(), now() + ChronoDuration::hours(1));

        let err = codec
            .decode_session(&token, now() + ChronoDuration::hours(1))
            .expect_err("expired");
        assert!(matches!(err, SessionError::Invalid(reason) if reason == "token_expired"));
    }

    #[test]
    fn login_state_is_not_accepted_as_session() {
        let codec = codec();
        let token = codec
            .issue_login_state("state", "verifier", "oidc", "/", now())
            .expect("issue");

        let err = codec.decode_session(&token, now()).expect_err("wrong audience");
        assert!(matches!(err, SessionError::Invalid(_)));

        let claims = codec.decode_login_state(&token, now()).expect("login state");
        assert_eq!(claims.code_verifier, "verifier");
        assert_eq!(claims.callback_url, "/");

        let late = now() + ChronoDuration::minutes(16);
        assert!(codec.decode_login_state(&token, late).is_err());
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let (token, _) = SessionCodec::new(b"other", Duration::from_secs(60))
            .issue_session(&user(), now())
            .expect("issue");
        assert!(codec().decode_session(&token, now()).is_err());
    }
}
