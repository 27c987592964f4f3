use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{
        errors::StoreError,
        value_objects::{
            enums::subscription_statuses::SubscriptionStatus,
            subscription_owners::SubscriptionOwner,
        },
    },
    infrastructure::postgres::schema::subscriptions,
};

/// Canonical subscription state. Only the state machine and seat allocator
/// produce new values of this type; the store persists them with a
/// compare-and-swap on `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub external_ref: Option<String>,
    pub owner: SubscriptionOwner,
    pub status: SubscriptionStatus,
    pub plan_id: String,
    pub seat_limit: i32,
    pub used_seats: i32,
    pub auto_add_seats: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionEntity {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Seat invariant: used seats never exceed the limit unless seats are
    /// added automatically.
    pub fn seats_within_limit(&self) -> bool {
        self.auto_add_seats || self.used_seats <= self.seat_limit
    }
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = subscriptions, treat_none_as_null = true)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub external_ref: Option<String>,
    pub user_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub status: String,
    pub plan_id: String,
    pub seat_limit: i32,
    pub used_seats: i32,
    pub auto_add_seats: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for SubscriptionEntity {
    type Error = StoreError;

    fn try_from(value: SubscriptionRow) -> Result<Self, Self::Error> {
        let owner = SubscriptionOwner::from_columns(value.user_id, value.organization_id)
            .map_err(|reason| StoreError::Corrupt(format!("subscription {}: {reason}", value.id)))?;
        let status = SubscriptionStatus::from_str(&value.status).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "subscription {} has unknown status {}",
                value.id, value.status
            ))
        })?;

        Ok(Self {
            id: value.id,
            external_ref: value.external_ref,
            owner,
            status,
            plan_id: value.plan_id,
            seat_limit: value.seat_limit,
            used_seats: value.used_seats,
            auto_add_seats: value.auto_add_seats,
            trial_ends_at: value.trial_ends_at,
            current_period_start: value.current_period_start,
            current_period_end: value.current_period_end,
            cancel_at_period_end: value.cancel_at_period_end,
            canceled_at: value.canceled_at,
            expires_at: value.expires_at,
            is_active: value.is_active,
            deleted_at: value.deleted_at,
            last_event_at: value.last_event_at,
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl From<&SubscriptionEntity> for SubscriptionRow {
    fn from(value: &SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            external_ref: value.external_ref.clone(),
            user_id: value.owner.user_id(),
            organization_id: value.owner.organization_id(),
            status: value.status.as_str().to_string(),
            plan_id: value.plan_id.clone(),
            seat_limit: value.seat_limit,
            used_seats: value.used_seats,
            auto_add_seats: value.auto_add_seats,
            trial_ends_at: value.trial_ends_at,
            current_period_start: value.current_period_start,
            current_period_end: value.current_period_end,
            cancel_at_period_end: value.cancel_at_period_end,
            canceled_at: value.canceled_at,
            expires_at: value.expires_at,
            is_active: value.is_active,
            deleted_at: value.deleted_at,
            last_event_at: value.last_event_at,
            version: value.version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}
