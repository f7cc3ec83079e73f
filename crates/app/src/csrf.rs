//! Double-submit CSRF tokens for the auth form posts.
//!
//! The cookie holds `token|signature`, where the signature is an
//! HMAC-SHA256 of the token under the auth secret. A form post is accepted
//! when the cookie signature verifies and the submitted token matches the
//! cookie token.

use hmac::{digest::InvalidLength, Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_BYTES: usize = 32;

#[derive(Clone)]
pub struct CsrfProtector {
    mac: HmacSha256,
}

/// Token handed to the client together with its cookie value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    pub token: String,
    pub cookie_value: String,
    /// `true` when the token was minted for this request and the cookie
    /// still has to be set.
    pub fresh: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsrfError {
    #[error("csrf cookie is missing")]
    MissingCookie,
    #[error("csrf cookie signature is invalid")]
    InvalidCookie,
    #[error("csrf token does not match cookie")]
    Mismatch,
}

impl CsrfProtector {
    pub fn new(secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    /// Re-uses the token of a valid cookie, otherwise mints a new one.
    pub fn token_for(&self, cookie_value: Option<&str>) -> CsrfToken {
        if let Some(value) = cookie_value {
            if let Ok(token) = self.token_from_cookie(value) {
                return CsrfToken {
                    token: token.to_string(),
                    cookie_value: value.to_string(),
                    fresh: false,
                };
            }
        }

        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let cookie_value = format!("{token}|{}", self.sign(&token));
        CsrfToken {
            token,
            cookie_value,
            fresh: true,
        }
    }

    /// Checks a submitted form token against the CSRF cookie.
    pub fn verify(&self, cookie_value: Option<&str>, submitted: &str) -> Result<(), CsrfError> {
        let value = cookie_value.ok_or(CsrfError::MissingCookie)?;
        let token = self.token_from_cookie(value)?;
        if token.as_bytes().ct_eq(submitted.as_bytes()).into() {
            Ok(())
        } else {
            Err(CsrfError::Mismatch)
        }
    }

    fn token_from_cookie<'a>(&self, value: &'a str) -> Result<&'a str, CsrfError> {
        let (token, signature) = value.split_once('|').ok_or(CsrfError::InvalidCookie)?;
        let expected = self.sign(token);
        if expected.as_bytes().ct_eq(signature.as_bytes()).into() {
            Ok(token)
        } else {
            Err(CsrfError::InvalidCookie)
        }
    }

    fn sign(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protector() -> CsrfProtector {
        CsrfProtector::new(b"test-secret").expect("protector")
    }

    #[test]
    fn minted_token_round_trips_through_cookie() {
        let csrf = protector();
        let minted = csrf.token_for(None);
        assert!(minted.fresh);
        assert_eq!(minted.token.len(), TOKEN_BYTES * 2);

        csrf.verify(Some(&minted.cookie_value), &minted.token)
            .expect("token should verify");

        let reused = csrf.token_for(Some(&minted.cookie_value));
        assert!(!reused.fresh);
        assert_eq!(reused.token, minted.token);
    }

    #[test]
    fn rejects_missing_forged_and_mismatched_tokens() {
        let csrf = protector();
        let minted = csrf.token_for(None);

        assert_eq!(csrf.verify(None, &minted.token), Err(CsrfError::MissingCookie));
        assert_eq!(
            csrf.verify(Some(&format!("{}|deadbeef", minted.token)), &minted.token),
            Err(CsrfError::InvalidCookie)
        );
        assert_eq!(
            csrf.verify(Some(&minted.cookie_value), "other-token"),
            Err(CsrfError::Mismatch)
        );

        let other = CsrfProtector::new(b"other-secret").expect("protector");
        assert_eq!(
            other.verify(Some(&minted.cookie_value), &minted.token),
            Err(CsrfError::InvalidCookie)
        );
    }

    #[test]
    fn invalid_cookie_is_replaced_with_fresh_token() {
        let csrf = protector();
        let replaced = csrf.token_for(Some("garbage"));
        assert!(replaced.fresh);
        assert_ne!(replaced.cookie_value, "garbage");
    }
}
