//! Network enumeration endpoint.

use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;

use crate::config::{AppConfig, ChainConfig, Network, Token};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInfo {
    network: &'static str,
    tokens: Vec<&'static str>,
    fee_hint: &'static str,
    confirmation_time: &'static str,
    min_confirmations: u32,
    recommended: bool,
    /// False when the process lacks the credentials to monitor this chain.
    monitoring_available: bool,
}

/// `GET /api/networks`
#[get("/networks")]
pub async fn list_networks(config: web::Data<AppConfig>) -> impl Responder {
    let networks: Vec<NetworkInfo> = Network::ALL
        .iter()
        .map(|&network| {
            let hint = ChainConfig::network_hint(network);
            NetworkInfo {
                network: network.as_str(),
                tokens: Token::ALL.iter().map(|t| t.as_str()).collect(),
                fee_hint: hint.fee_hint,
                confirmation_time: hint.confirmation_time,
                min_confirmations: ChainConfig::min_confirmations(network),
                recommended: hint.recommended,
                monitoring_available: !network.is_evm() || config.evm_enabled(),
            }
        })
        .collect();

    HttpResponse::Ok().json(serde_json::json!({ "networks": networks }))
}
