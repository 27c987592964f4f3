pub mod axum_http;
pub mod billing_portal;
pub mod memory;
pub mod postgres;
pub mod reconciliation_sweep;
