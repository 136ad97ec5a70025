//! Core engine services, wired together explicitly at startup.

pub mod monitor;
pub mod ofac;
pub mod payment_engine;
pub mod scheduler;
pub mod subscription;
pub mod webhook_dispatcher;

pub use monitor::{BlockchainMonitor, MonitorQueue, MAX_RETRY_COUNT};
pub use ofac::OfacService;
pub use payment_engine::PaymentEngine;
pub use scheduler::Scheduler;
pub use subscription::SubscriptionEngine;
pub use webhook_dispatcher::WebhookDispatcher;
