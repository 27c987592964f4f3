use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{
        errors::StoreError,
        value_objects::enums::change_actions::{ChangeAction, ChangeStatus},
    },
    infrastructure::postgres::schema::subscription_changes,
};

/// Append-only record of a requested transition. After insert only `status`
/// and `failure_reason` may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionChangeEntity {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub action: ChangeAction,
    pub from_tier: String,
    pub to_tier: String,
    pub seat_limit: Option<i32>,
    pub effective_date: DateTime<Utc>,
    pub status: ChangeStatus,
    pub requested_by: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionChangeEntity {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ChangeStatus::Scheduled && self.effective_date <= now
    }
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable, Insertable)]
#[diesel(table_name = subscription_changes)]
pub struct SubscriptionChangeRow {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub action: String,
    pub from_tier: String,
    pub to_tier: String,
    pub seat_limit: Option<i32>,
    pub effective_date: DateTime<Utc>,
    pub status: String,
    pub requested_by: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionChangeRow> for SubscriptionChangeEntity {
    type Error = StoreError;

    fn try_from(value: SubscriptionChangeRow) -> Result<Self, Self::Error> {
        let action = ChangeAction::from_str(&value.action).ok_or_else(|| {
            StoreError::Corrupt(format!("change {} has unknown action {}", value.id, value.action))
        })?;
        let status = ChangeStatus::from_str(&value.status).ok_or_else(|| {
            StoreError::Corrupt(format!("change {} has unknown status {}", value.id, value.status))
        })?;

        Ok(Self {
            id: value.id,
            subscription_id: value.subscription_id,
            action,
            from_tier: value.from_tier,
            to_tier: value.to_tier,
            seat_limit: value.seat_limit,
            effective_date: value.effective_date,
            status,
            requested_by: value.requested_by,
            failure_reason: value.failure_reason,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl From<&SubscriptionChangeEntity> for SubscriptionChangeRow {
    fn from(value: &SubscriptionChangeEntity) -> Self {
        Self {
            id: value.id,
            subscription_id: value.subscription_id,
            action: value.action.as_str().to_string(),
            from_tier: value.from_tier.clone(),
            to_tier: value.to_tier.clone(),
            seat_limit: value.seat_limit,
            effective_date: value.effective_date,
            status: value.status.as_str().to_string(),
            requested_by: value.requested_by,
            failure_reason: value.failure_reason.clone(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}
