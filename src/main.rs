use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use stablegate::chains::ChainClients;
use stablegate::config::AppConfig;
use stablegate::crypto::AddressCipher;
use stablegate::db::create_pool;
use stablegate::handlers;
use stablegate::middleware::TenantAuth;
use stablegate::models::Tenant;
use stablegate::services::{
    BlockchainMonitor, MonitorQueue, OfacService, PaymentEngine, Scheduler, SubscriptionEngine,
    WebhookDispatcher,
};
use stablegate::telemetry;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_telemetry().context("Failed to initialize telemetry")?;

    info!("Starting stablegate payment service");

    let config = Arc::new(AppConfig::from_env().context("Failed to load configuration")?);

    let pool = create_pool(&config.database_url).context("Failed to set up database")?;

    // Materialize the default tenant so keyless single-tenant installs work
    // out of the box.
    {
        let mut conn = pool.get().context("Failed to get DB connection")?;
        let tenant = Tenant::ensure_default(
            &mut conn,
            config.payment_address_evm.clone(),
            config.payment_address_tron.clone(),
            config.webhook_url.clone(),
            config.webhook_secret.clone(),
        )?;
        info!(tenant_id = %tenant.id, "default tenant ready");
    }

    let cipher = Arc::new(
        AddressCipher::from_secret(&config.session_secret)
            .context("Failed to derive address encryption key")?,
    );

    // Explicit component wiring: every service is constructed here and
    // injected into its consumers.
    let webhooks = Arc::new(WebhookDispatcher::new(pool.clone()));
    let ofac = Arc::new(OfacService::new(pool.clone()));
    let subscriptions = Arc::new(SubscriptionEngine::new(pool.clone(), Arc::clone(&webhooks)));
    let queue = MonitorQueue::new();
    let engine = Arc::new(PaymentEngine::new(
        pool.clone(),
        Arc::clone(&cipher),
        Arc::clone(&ofac),
        Arc::clone(&webhooks),
        queue.clone(),
        Arc::clone(&config),
    ));
    let chain_clients = Arc::new(ChainClients::new(&config, Arc::clone(&cipher)));
    let monitor = Arc::new(BlockchainMonitor::new(
        pool.clone(),
        chain_clients,
        Arc::clone(&engine),
        Arc::clone(&webhooks),
        queue.clone(),
    ));

    // Re-enrolls in-flight payments, then starts the 30s tick loop.
    Arc::clone(&monitor)
        .start()
        .await
        .context("Failed to start monitor")?;

    // Ingest the SDN list at startup only when the screening set is empty.
    {
        let ofac = Arc::clone(&ofac);
        tokio::spawn(async move {
            let _ = ofac.refresh_if_empty().await;
        });
    }

    let scheduler = Scheduler::start(
        Arc::clone(&engine),
        Arc::clone(&subscriptions),
        Arc::clone(&webhooks),
        Arc::clone(&ofac),
        Arc::clone(&monitor),
    );

    let bind_addr = (config.host.clone(), config.port);
    info!(host = %config.host, port = config.port, "HTTP server listening");

    let server = {
        let pool = pool.clone();
        let config = Arc::clone(&config);
        let engine = Arc::clone(&engine);
        let subscriptions = Arc::clone(&subscriptions);
        let ofac = Arc::clone(&ofac);
        let queue = queue.clone();

        HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .wrap(Cors::permissive())
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::from(Arc::clone(&config)))
                .app_data(web::Data::from(Arc::clone(&engine)))
                .app_data(web::Data::from(Arc::clone(&subscriptions)))
                .app_data(web::Data::from(Arc::clone(&ofac)))
                .app_data(web::Data::new(queue.clone()))
                .service(
                    web::scope("/api")
                        .wrap(TenantAuth::new(pool.clone()))
                        .configure(handlers::configure),
                )
        })
        .bind(bind_addr)
        .context("Failed to bind HTTP server")?
        .run()
    };

    server.await.context("HTTP server failed")?;

    // Orderly shutdown: stop the tick loop, then the periodic tasks.
    monitor.stop().await;
    scheduler.shutdown().await;

    Ok(())
}
