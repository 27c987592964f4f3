use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::info;

use crate::domain::{
    entities::audit_logs::AuditRecord, repositories::audit_sink::AuditSink,
    value_objects::enums::audit_actions::AuditAction,
};

/// Keeps every record in memory and mirrors it to the log.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.records().iter().map(|record| record.action).collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        info!(
            action = %record.action,
            subscription_id = ?record.subscription_id,
            actor_user_id = ?record.actor_user_id,
            external_event_id = ?record.external_event_id,
            "audit: record"
        );
        self.records
            .lock()
            .map_err(|_| anyhow!("audit sink mutex poisoned"))?
            .push(record);
        Ok(())
    }
}
