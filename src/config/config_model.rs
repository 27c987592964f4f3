use std::time::Duration;

use crate::config::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub stage: Stage,
    pub auth: Auth,
    pub billing: Billing,
    pub billing_portal: BillingPortal,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub backend: StoreBackend,
    /// Required when `backend` is `Postgres`.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Auth {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct Billing {
    pub lock_timeout: Duration,
    pub reactivation_grace_days: i64,
    pub audit_timeout: Duration,
    /// `None` leaves settlement to the next request touching a subscription.
    pub sweep_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct BillingPortal {
    pub api_base: Option<String>,
    pub api_key: String,
}
