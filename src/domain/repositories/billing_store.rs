use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::{
        organization_memberships::OrganizationMembershipEntity,
        processed_events::ProcessedEventEntity, subscription_changes::SubscriptionChangeEntity,
        subscriptions::SubscriptionEntity,
    },
    errors::StoreResult,
    value_objects::{enums::change_actions::ChangeStatus, subscription_owners::SubscriptionOwner},
};

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionWrite {
    Insert(SubscriptionEntity),
    /// Compare-and-swap: fails with `VersionMismatch` unless the stored
    /// version still equals `expected_version`.
    Update {
        expected_version: i64,
        next: SubscriptionEntity,
    },
}

impl SubscriptionWrite {
    pub fn subscription(&self) -> &SubscriptionEntity {
        match self {
            SubscriptionWrite::Insert(subscription) => subscription,
            SubscriptionWrite::Update { next, .. } => next,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeWrite {
    Insert(SubscriptionChangeEntity),
    UpdateStatus {
        change_id: Uuid,
        status: ChangeStatus,
        failure_reason: Option<String>,
        updated_at: DateTime<Utc>,
    },
}

/// Everything one serialized operation writes. A store applies it in a
/// single transaction or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillingCommit {
    pub subscription: Option<SubscriptionWrite>,
    pub changes: Vec<ChangeWrite>,
    pub memberships: Vec<OrganizationMembershipEntity>,
    pub processed_event: Option<ProcessedEventEntity>,
}

impl BillingCommit {
    pub fn is_empty(&self) -> bool {
        self.subscription.is_none()
            && self.changes.is_empty()
            && self.memberships.is_empty()
            && self.processed_event.is_none()
    }
}

#[automock]
#[async_trait]
pub trait BillingStore {
    async fn find_processed_event(&self, external_event_id: &str) -> StoreResult<Option<ProcessedEventEntity>>;

    async fn find_subscription(&self, subscription_id: Uuid) -> StoreResult<Option<SubscriptionEntity>>;

    async fn find_subscription_by_external_ref(
        &self,
        external_ref: &str,
    ) -> StoreResult<Option<SubscriptionEntity>>;

    async fn find_active_subscription_for_owner(
        &self,
        owner: SubscriptionOwner,
    ) -> StoreResult<Option<SubscriptionEntity>>;

    /// Changes for a subscription, oldest first.
    async fn list_subscription_changes(
        &self,
        subscription_id: Uuid,
    ) -> StoreResult<Vec<SubscriptionChangeEntity>>;

    async fn find_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<OrganizationMembershipEntity>>;

    /// Ids of subscriptions with scheduled changes or period-end
    /// cancellations due at `now`.
    async fn list_subscriptions_due(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>>;

    async fn commit(&self, commit: BillingCommit) -> StoreResult<()>;
}
