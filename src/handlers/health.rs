//! Health check endpoint.

use actix_web::{get, web, HttpResponse, Responder};

use crate::services::MonitorQueue;

/// `GET /api/health`
#[get("/health")]
pub async fn health(queue: web::Data<MonitorQueue>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        "monitorQueueSize": queue.len(),
    }))
}
