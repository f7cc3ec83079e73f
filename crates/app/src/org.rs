use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
    Json,
};
use metrics::counter;
use serde::Serialize;
use tenantdesk_core::{assert_org_access, OrgId, ORG_ID_HEADER};
use tracing::warn;

use crate::problem::ProblemResponse;

/// Reads the tenant identifier from the `x-org-id` header.
///
/// Only the first value is consulted. Empty values and values that are not
/// visible ASCII are treated as absent.
pub fn org_id_from_request(headers: &HeaderMap) -> Option<OrgId> {
    headers
        .get(ORG_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(OrgId::new)
}

/// Extractor for routes that must be scoped to an organization.
#[derive(Debug, Clone)]
pub struct OrgAccess(pub OrgId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OrgAccess
where
    S: Send + Sync,
{
    type Rejection = ProblemResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match assert_org_access(org_id_from_request(&parts.headers)) {
            Ok(org_id) => Ok(Self(org_id)),
            Err(err) => {
                counter!("org_access_denied_total").increment(1);
                warn!(stage = "org", method = %parts.method, path = %parts.uri.path(), "request without organization identifier rejected");
                Err(err.into())
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrgContext {
    org_id: OrgId,
    aad_hex: String,
}

pub async fn context(OrgAccess(org_id): OrgAccess) -> Json<OrgContext> {
    let aad_hex = hex::encode(org_id.aad());
    Json(OrgContext { org_id, aad_hex })
}
