//! Payment lifecycle endpoints.

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::config::Network;
use crate::crypto::validate_address as validate_chain_address;
use crate::error::ApiError;
use crate::middleware::tenant_id;
use crate::services::PaymentEngine;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub external_user_id: String,
    pub plan_id: String,
    pub network: String,
    pub token: String,
    pub sender_address: String,
}

/// `POST /api/payments`: create a payment and return placement
/// instructions.
#[post("/payments")]
pub async fn initiate_payment(
    req: HttpRequest,
    engine: web::Data<PaymentEngine>,
    body: web::Json<InitiatePaymentRequest>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let placement = engine
        .initiate_payment(
            &tenant,
            &body.external_user_id,
            &body.plan_id,
            &body.network,
            &body.token,
            &body.sender_address,
        )
        .await?;
    Ok(HttpResponse::Created().json(placement))
}

/// `POST /api/payments/{id}/confirm`: caller reports the funds as sent.
#[post("/payments/{id}/confirm")]
pub async fn confirm_payment(
    req: HttpRequest,
    engine: web::Data<PaymentEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let view = engine
        .confirm_payment_sent(&path.into_inner(), &tenant)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// `GET /api/payments/{id}/status`
#[get("/payments/{id}/status")]
pub async fn payment_status(
    req: HttpRequest,
    engine: web::Data<PaymentEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let view = engine.get_payment_status(&path.into_inner(), &tenant).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub external_user_id: String,
    pub limit: Option<i64>,
}

/// `GET /api/payments/history?externalUserId=...&limit=...`
#[get("/payments/history")]
pub async fn payment_history(
    req: HttpRequest,
    engine: web::Data<PaymentEngine>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let payments = engine
        .get_payment_history(&tenant, &query.external_user_id, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "payments": payments })))
}

/// `DELETE /api/payments/{id}`: cancel a pending payment.
#[delete("/payments/{id}")]
pub async fn cancel_payment(
    req: HttpRequest,
    engine: web::Data<PaymentEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let view = engine.cancel_payment(&path.into_inner(), &tenant).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAddressRequest {
    pub network: String,
    pub address: String,
}

/// `POST /api/validate-address`: format validation without side effects.
#[post("/validate-address")]
pub async fn validate_address(
    body: web::Json<ValidateAddressRequest>,
) -> Result<HttpResponse, ApiError> {
    let network = Network::parse(&body.network).ok_or_else(|| {
        ApiError::Validation(format!("unsupported network: {}", body.network))
    })?;

    let response = match validate_chain_address(network, &body.address) {
        Ok(normalized) => serde_json::json!({
            "valid": true,
            "network": network.as_str(),
            "normalizedAddress": normalized,
        }),
        Err(e) => serde_json::json!({
            "valid": false,
            "network": network.as_str(),
            "message": e.to_string(),
        }),
    };

    Ok(HttpResponse::Ok().json(response))
}
