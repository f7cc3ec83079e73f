use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request header carrying the tenant identifier.
pub const ORG_ID_HEADER: &str = "x-org-id";

/// Prefix bound into the additional authenticated data of org-scoped fields.
pub const AAD_PREFIX: &str = "org:";

/// Opaque tenant identifier taken verbatim from a request.
///
/// The only invariant is that the value is non-empty; no trimming or case
/// folding is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    /// Wraps a raw value, returning `None` for the empty string.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Additional authenticated data for fields owned by this organization.
    pub fn aad(&self) -> Vec<u8> {
        aad_for_org_field(&self.0)
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrgAccessError {
    #[error("organization identifier is required")]
    AccessDenied,
}

/// Fails closed when no organization identifier accompanied the request.
pub fn assert_org_access(org_id: Option<OrgId>) -> Result<OrgId, OrgAccessError> {
    org_id.ok_or(OrgAccessError::AccessDenied)
}

/// Returns `"org:" + org_id` as bytes. Defined for every input, including
/// the empty string.
///
/// The output is plain context material; it carries no secret and is not a
/// key derivation on its own.
pub fn aad_for_org_field(org_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_PREFIX.len() + org_id.len());
    aad.extend_from_slice(AAD_PREFIX.as_bytes());
    aad.extend_from_slice(org_id.as_bytes());
    aad
}
