use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::{
        organization_memberships::OrganizationMembershipEntity, plans::PlanEntity,
        subscription_changes::SubscriptionChangeEntity, subscriptions::SubscriptionEntity,
    },
    value_objects::{
        enums::{
            change_actions::{ChangeAction, ChangeStatus},
            organization_roles::OrganizationRole,
            owner_types::PlanApplicability,
            seat_utilization::SeatUtilization,
            subscription_statuses::SubscriptionStatus,
        },
        permission_sets::PermissionSet,
        subscription_owners::SubscriptionOwner,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnapshot {
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
    pub version: i64,
}

impl From<&SubscriptionEntity> for SubscriptionSnapshot {
    fn from(value: &SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            external_ref: value.external_ref.clone(),
            owner: value.owner,
            status: value.status,
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
            version: value.version,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeatAvailability {
    pub seat_limit: i32,
    pub used_seats: i32,
    pub available: i32,
    pub utilization: SeatUtilization,
    pub auto_add_seats: bool,
    pub can_activate_member: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionChangeDto {
    pub id: Uuid,
    pub action: ChangeAction,
    pub from_tier: String,
    pub to_tier: String,
    pub seat_limit: Option<i32>,
    pub effective_date: DateTime<Utc>,
    pub status: ChangeStatus,
    pub requested_by: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&SubscriptionChangeEntity> for SubscriptionChangeDto {
    fn from(value: &SubscriptionChangeEntity) -> Self {
        Self {
            id: value.id,
            action: value.action,
            from_tier: value.from_tier.clone(),
            to_tier: value.to_tier.clone(),
            seat_limit: value.seat_limit,
            effective_date: value.effective_date,
            status: value.status,
            requested_by: value.requested_by,
            failure_reason: value.failure_reason.clone(),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusView {
    pub subscription: SubscriptionSnapshot,
    pub seats: SeatAvailability,
    pub pending_change: Option<SubscriptionChangeDto>,
    pub history: Vec<SubscriptionChangeDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanDto {
    pub id: String,
    pub tier: String,
    pub version: i32,
    pub name: String,
    pub applicability: PlanApplicability,
    pub per_seat: bool,
    pub min_seats: i32,
    pub max_seats: Option<i32>,
    pub trial_days: i32,
    pub price_minor: i32,
    pub features: BTreeSet<String>,
}

impl From<&PlanEntity> for PlanDto {
    fn from(value: &PlanEntity) -> Self {
        Self {
            id: value.id.clone(),
            tier: value.tier.clone(),
            version: value.version,
            name: value.name.clone(),
            applicability: value.applicability,
            per_seat: value.per_seat,
            min_seats: value.min_seats,
            max_seats: value.max_seats,
            trial_days: value.trial_days,
            price_minor: value.price_minor,
            features: value.features.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipDto {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: OrganizationRole,
    pub custom_permissions: PermissionSet,
    pub effective_permissions: PermissionSet,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl MembershipDto {
    pub fn new(membership: &OrganizationMembershipEntity, effective_permissions: PermissionSet) -> Self {
        Self {
            organization_id: membership.organization_id,
            user_id: membership.user_id,
            role: membership.role,
            custom_permissions: membership.custom_permissions,
            effective_permissions,
            is_active: membership.is_active,
            deactivated_at: membership.deactivated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChangeResult {
    pub membership: MembershipDto,
    /// Absent when the organization has no active subscription.
    pub seats: Option<SeatAvailability>,
}
