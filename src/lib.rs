pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use db::create_pool;
pub use error::{MatchError, ServiceError};
pub use models::{Hit, Hits, Invoice, Invoices, Payment, PaymentOutcome, ReconciliationReport, TotalCaching};
pub use service::{find_hits, find_hits_with, LedgerReconciler, MatchOptions, Reconciler};
