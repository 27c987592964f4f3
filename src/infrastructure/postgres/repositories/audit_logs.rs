use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into};

use crate::{
    domain::{
        entities::audit_logs::{AuditRecord, InsertAuditLogEntity},
        repositories::audit_sink::AuditSink,
    },
    infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::billing_audit_logs},
};

pub struct AuditLogPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl AuditLogPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AuditSink for AuditLogPostgres {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        insert_into(billing_audit_logs::table)
            .values(InsertAuditLogEntity::from(&record))
            .execute(&mut conn)?;

        Ok(())
    }
}
