use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::audit_logs::AuditRecord;

/// Append-only destination for audit records.
#[automock]
#[async_trait]
pub trait AuditSink {
    async fn record(&self, record: AuditRecord) -> anyhow::Result<()>;
}
