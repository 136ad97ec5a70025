//! HTTP middleware.

pub mod api_key_auth;

pub use api_key_auth::{TenantAuth, TenantContext};

use crate::error::ApiError;
use actix_web::HttpMessage;

/// Tenant id resolved by the auth middleware for this request.
pub fn tenant_id(req: &actix_web::HttpRequest) -> Result<String, ApiError> {
    req.extensions()
        .get::<TenantContext>()
        .map(|ctx| ctx.tenant_id.clone())
        .ok_or_else(|| ApiError::Unauthorized("missing tenant context".into()))
}
