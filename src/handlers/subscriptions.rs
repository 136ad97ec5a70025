//! Subscription query endpoints.

use actix_web::{get, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::tenant_id;
use crate::services::subscription::SubscriptionView;
use crate::services::SubscriptionEngine;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub external_user_id: String,
}

/// `GET /api/subscriptions/current?externalUserId=...`
#[get("/subscriptions/current")]
pub async fn current_subscription(
    req: HttpRequest,
    subscriptions: web::Data<SubscriptionEngine>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let current = subscriptions
        .current(&tenant, &query.external_user_id)
        .await
        .map_err(ApiError::Internal)?;

    match current {
        Some(view) => Ok(HttpResponse::Ok().json(view)),
        None => Err(ApiError::NotFound("no active subscription".into())),
    }
}

/// `GET /api/subscriptions/history?externalUserId=...`
#[get("/subscriptions/history")]
pub async fn subscription_history(
    req: HttpRequest,
    subscriptions: web::Data<SubscriptionEngine>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let history = subscriptions
        .history(&tenant, &query.external_user_id)
        .await
        .map_err(ApiError::Internal)?;
    let history: Vec<SubscriptionView> = history
        .iter()
        .map(SubscriptionView::from_subscription)
        .collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "subscriptions": history })))
}

/// `GET /api/subscriptions/active?externalUserId=...`
#[get("/subscriptions/active")]
pub async fn subscription_active(
    req: HttpRequest,
    subscriptions: web::Data<SubscriptionEngine>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let active = subscriptions
        .is_active(&tenant, &query.external_user_id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "active": active })))
}
