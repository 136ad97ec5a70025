//! Plan management endpoints.

use actix_web::{get, patch, post, web, HttpRequest, HttpResponse};
use serde::Serialize;

use crate::error::ApiError;
use crate::middleware::tenant_id;
use crate::models::Plan;
use crate::services::payment_engine::{PlanSpec, PlanUpdate};
use crate::services::PaymentEngine;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub id: String,
    pub plan_key: String,
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub currency: String,
    pub period_days: Option<i32>,
    pub features: Vec<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl From<&Plan> for PlanResponse {
    fn from(plan: &Plan) -> Self {
        Self {
            id: plan.id.clone(),
            plan_key: plan.plan_key.clone(),
            name: plan.name.clone(),
            description: plan.description.clone(),
            price: plan.price.clone(),
            currency: plan.currency.clone(),
            period_days: plan.period_days,
            features: plan.feature_list(),
            is_active: plan.is_active,
            created_at: plan.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

/// `GET /api/plans`: active plans for the calling tenant.
#[get("/plans")]
pub async fn list_plans(
    req: HttpRequest,
    engine: web::Data<PaymentEngine>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let plans = engine.list_plans(&tenant).await?;
    let plans: Vec<PlanResponse> = plans.iter().map(PlanResponse::from).collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "plans": plans })))
}

/// `POST /api/plans`
#[post("/plans")]
pub async fn create_plan(
    req: HttpRequest,
    engine: web::Data<PaymentEngine>,
    body: web::Json<PlanSpec>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let plan = engine.create_plan(&tenant, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(PlanResponse::from(&plan)))
}

/// `PATCH /api/plans/{id}`: tenant-scoped partial update.
#[patch("/plans/{id}")]
pub async fn update_plan(
    req: HttpRequest,
    engine: web::Data<PaymentEngine>,
    path: web::Path<String>,
    body: web::Json<PlanUpdate>,
) -> Result<HttpResponse, ApiError> {
    let tenant = tenant_id(&req)?;
    let plan = engine
        .update_plan(&tenant, &path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(PlanResponse::from(&plan)))
}
