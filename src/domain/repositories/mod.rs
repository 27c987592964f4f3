pub mod audit_sink;
pub mod billing_portal;
pub mod billing_store;
pub mod plans;
