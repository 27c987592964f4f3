use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the billing core. Only `TransientStore` is safe to
/// retry; every other variant needs the caller to change its input.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied for user {user_id}: requires {required}")]
    PermissionDenied { user_id: Uuid, required: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict on subscription {}: cannot {attempted} while {current} ({reason})", display_subscription(.subscription_id))]
    Conflict {
        subscription_id: Option<Uuid>,
        attempted: String,
        current: String,
        reason: String,
    },

    #[error("transient store failure: {0}")]
    TransientStore(String),

    #[error("external provider error: {0}")]
    ExternalProvider(String),
}

fn display_subscription(subscription_id: &Option<Uuid>) -> String {
    subscription_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "<new>".to_string())
}

impl BillingError {
    pub fn conflict(
        subscription_id: Option<Uuid>,
        attempted: impl Into<String>,
        current: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        BillingError::Conflict {
            subscription_id,
            attempted: attempted.into(),
            current: current.into(),
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::TransientStore(_))
    }

    /// Short machine-readable kind, used in logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::Validation(_) => "validation_error",
            BillingError::PermissionDenied { .. } => "permission_denied",
            BillingError::NotFound(_) => "not_found",
            BillingError::Conflict { .. } => "conflict",
            BillingError::TransientStore(_) => "transient_store_error",
            BillingError::ExternalProvider(_) => "external_provider_error",
        }
    }
}

pub type BillingResult<T> = std::result::Result<T, BillingError>;

/// Errors reported by store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("event {0} already processed")]
    DuplicateEvent(String),

    #[error("subscription {0} was modified concurrently")]
    VersionMismatch(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for BillingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => BillingError::NotFound("record".to_string()),
            StoreError::Conflict(reason) => BillingError::conflict(None, "write", "stored", reason),
            StoreError::DuplicateEvent(event_id) => BillingError::conflict(
                None,
                "record event",
                "already processed",
                format!("event {event_id} already in ledger"),
            ),
            StoreError::VersionMismatch(id) => {
                BillingError::TransientStore(format!("subscription {id} was modified concurrently"))
            }
            StoreError::Unavailable(reason) => BillingError::TransientStore(reason),
            StoreError::Corrupt(reason) => BillingError::TransientStore(format!("corrupt row: {reason}")),
        }
    }
}
