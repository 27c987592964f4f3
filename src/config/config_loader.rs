use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result, bail};

use super::{
    config_model::{Auth, Billing, BillingPortal, Database, DotEnvyConfig, Server, StoreBackend},
    stage::Stage,
};

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} is invalid"))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(value) => value.parse().with_context(|| format!("{key} is invalid")),
        None => Ok(default),
    }
}

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: required("SERVER_PORT")?.parse()?,
        body_limit: required("SERVER_BODY_LIMIT")?.parse()?,
        timeout: required("SERVER_TIMEOUT")?.parse()?,
    };

    let backend = match optional("STORE_BACKEND").as_deref() {
        None | Some("postgres") => StoreBackend::Postgres,
        Some("memory") => StoreBackend::Memory,
        Some(other) => bail!("STORE_BACKEND is invalid: {other}"),
    };
    let url = optional("DATABASE_URL");
    if backend == StoreBackend::Postgres && url.is_none() {
        bail!("DATABASE_URL is invalid");
    }
    let database = Database {
        backend,
        url,
        max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
    };

    let auth = Auth {
        jwt_secret: required("JWT_SECRET")?,
    };

    let sweep_secs: u64 = parsed("BILLING_SWEEP_INTERVAL_SECS", 0)?;
    let billing = Billing {
        lock_timeout: Duration::from_millis(parsed("SUBSCRIPTION_LOCK_TIMEOUT_MS", 5_000)?),
        reactivation_grace_days: parsed("REACTIVATION_GRACE_DAYS", 30)?,
        audit_timeout: Duration::from_millis(parsed("AUDIT_TIMEOUT_MS", 2_000)?),
        sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
    };

    let billing_portal = BillingPortal {
        api_base: optional("BILLING_PORTAL_API_BASE"),
        api_key: optional("BILLING_PORTAL_API_KEY").unwrap_or_default(),
    };

    Ok(DotEnvyConfig {
        server,
        database,
        stage: get_stage(),
        auth,
        billing,
        billing_portal,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(&stage_str).unwrap_or_default()
}
