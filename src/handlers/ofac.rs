//! OFAC screening endpoints.

use actix_web::{get, post, web, HttpResponse};

use crate::error::ApiError;
use crate::services::OfacService;

/// `GET /api/ofac/status`
#[get("/ofac/status")]
pub async fn ofac_status(ofac: web::Data<OfacService>) -> Result<HttpResponse, ApiError> {
    let status = ofac.status().await.map_err(ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(status))
}

/// `GET /api/ofac/check/{address}`
#[get("/ofac/check/{address}")]
pub async fn ofac_check(
    ofac: web::Data<OfacService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let result = ofac
        .check_address(&path.into_inner())
        .await
        .map_err(ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(result))
}

/// `POST /api/ofac/update`: force a refresh of the SDN address set.
#[post("/ofac/update")]
pub async fn ofac_update(ofac: web::Data<OfacService>) -> Result<HttpResponse, ApiError> {
    let summary = ofac.update().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "totalAddresses": summary.total,
        "added": summary.added,
        "removed": summary.removed,
    })))
}
