//! HTTP handlers for the `/api` surface.

pub mod health;
pub mod networks;
pub mod ofac;
pub mod payments;
pub mod plans;
pub mod subscriptions;

use actix_web::web;

/// Register every route of the public surface on a scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health)
        .service(networks::list_networks)
        .service(plans::list_plans)
        .service(plans::create_plan)
        .service(plans::update_plan)
        .service(payments::initiate_payment)
        .service(payments::confirm_payment)
        .service(payments::payment_history)
        .service(payments::payment_status)
        .service(payments::cancel_payment)
        .service(payments::validate_address)
        .service(subscriptions::current_subscription)
        .service(subscriptions::subscription_history)
        .service(subscriptions::subscription_active)
        .service(ofac::ofac_status)
        .service(ofac::ofac_check)
        .service(ofac::ofac_update);
}
