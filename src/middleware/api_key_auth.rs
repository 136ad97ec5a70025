//! Tenant authentication middleware.
//!
//! Resolves the calling tenant from `X-API-Key` or `Authorization: Bearer`
//! by SHA-256 digest (plaintext keys are never stored). When no key is
//! presented the request falls back to the `default` tenant, provided that
//! tenant exists, is active, and has no API key configured.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpRequest, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use sha2::{Digest, Sha256};
use std::future::{ready, Ready};
use std::rc::Rc;
use tracing::warn;

use crate::db::DbPool;
use crate::error::ErrorBody;
use crate::models::{Tenant, DEFAULT_TENANT_ID};

/// Attached to request extensions on successful resolution.
#[derive(Clone, Debug)]
pub struct TenantContext {
    pub tenant_id: String,
}

pub struct TenantAuth {
    pool: DbPool,
}

impl TenantAuth {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TenantAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = TenantAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TenantAuthMiddleware {
            service: Rc::new(service),
            pool: self.pool.clone(),
        }))
    }
}

pub struct TenantAuthMiddleware<S> {
    service: Rc<S>,
    pool: DbPool,
}

impl<S, B> Service<ServiceRequest> for TenantAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let pool = self.pool.clone();
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let api_key = extract_api_key(req.request());

            match resolve_tenant(pool, api_key).await {
                Ok(tenant_id) => {
                    req.extensions_mut().insert(TenantContext { tenant_id });
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(response) => Ok(req.into_response(response).map_into_right_body()),
            }
        })
    }
}

fn extract_api_key(req: &HttpRequest) -> Option<String> {
    if let Some(value) = req.headers().get("X-API-Key") {
        if let Ok(key) = value.to_str() {
            let key = key.trim();
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
    }

    let auth = req.headers().get("Authorization")?.to_str().ok()?;
    let key = auth.strip_prefix("Bearer ")?.trim();
    (!key.is_empty()).then(|| key.to_string())
}

async fn resolve_tenant(pool: DbPool, api_key: Option<String>) -> Result<String, HttpResponse> {
    let lookup = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<String>> {
        let mut conn = pool.get()?;
        match api_key {
            Some(key) => {
                let digest = hex::encode(Sha256::digest(key.as_bytes()));
                Ok(Tenant::find_by_api_key_hash(&mut conn, &digest)?.map(|t| t.id))
            }
            None => {
                // Keyless access only reaches a keyless default tenant.
                let default = Tenant::find_by_id(&mut conn, DEFAULT_TENANT_ID)?;
                Ok(default
                    .filter(|t| t.is_active && t.api_key_hash.is_none())
                    .map(|t| t.id))
            }
        }
    })
    .await;

    match lookup {
        Ok(Ok(Some(tenant_id))) => Ok(tenant_id),
        Ok(Ok(None)) => Err(unauthorized("invalid or missing API key")),
        Ok(Err(e)) => {
            warn!(error = %e, "tenant resolution failed");
            Err(internal_error())
        }
        Err(e) => {
            warn!(error = %e, "tenant resolution task panicked");
            Err(internal_error())
        }
    }
}

fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorBody {
        error: "UNAUTHORIZED",
        message: message.to_string(),
        details: None,
    })
}

fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorBody {
        error: "INTERNAL_ERROR",
        message: "An internal error occurred".to_string(),
        details: None,
    })
}
