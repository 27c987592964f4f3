use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::audit_actions::AuditAction,
    infrastructure::postgres::schema::billing_audit_logs,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: AuditAction,
    pub subscription_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub actor_user_id: Option<Uuid>,
    pub external_event_id: Option<String>,
    pub change_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(action: AuditAction, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            subscription_id: None,
            organization_id: None,
            actor_user_id: None,
            external_event_id: None,
            change_id: None,
            detail: serde_json::Value::Null,
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = billing_audit_logs)]
pub struct InsertAuditLogEntity {
    pub id: Uuid,
    pub action: String,
    pub subscription_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub actor_user_id: Option<Uuid>,
    pub external_event_id: Option<String>,
    pub change_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl From<&AuditRecord> for InsertAuditLogEntity {
    fn from(value: &AuditRecord) -> Self {
        Self {
            id: value.id,
            action: value.action.as_str().to_string(),
            subscription_id: value.subscription_id,
            organization_id: value.organization_id,
            actor_user_id: value.actor_user_id,
            external_event_id: value.external_event_id.clone(),
            change_id: value.change_id,
            detail: value.detail.clone(),
            occurred_at: value.occurred_at,
        }
    }
}
