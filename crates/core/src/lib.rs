//! Domain types shared by the HTTP application: tenant scoping, crawler
//! directives and page metadata. Nothing in this crate performs I/O.

pub mod metadata;
pub mod org;
pub mod robots;

pub use metadata::{escape_html, AuthErrorKind, PageMetadata, RobotsDirective};
pub use org::{aad_for_org_field, assert_org_access, OrgAccessError, OrgId, AAD_PREFIX, ORG_ID_HEADER};
pub use robots::{Robots, RobotsRule};
