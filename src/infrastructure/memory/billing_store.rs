use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::{
        organization_memberships::OrganizationMembershipEntity,
        processed_events::ProcessedEventEntity, subscription_changes::SubscriptionChangeEntity,
        subscriptions::SubscriptionEntity,
    },
    errors::{StoreError, StoreResult},
    repositories::billing_store::{BillingCommit, BillingStore, ChangeWrite, SubscriptionWrite},
    value_objects::{enums::subscription_statuses::SubscriptionStatus, subscription_owners::SubscriptionOwner},
};

#[derive(Debug, Default, Clone)]
struct State {
    subscriptions: HashMap<Uuid, SubscriptionEntity>,
    changes: Vec<SubscriptionChangeEntity>,
    memberships: HashMap<(Uuid, Uuid), OrganizationMembershipEntity>,
    processed_events: HashMap<String, ProcessedEventEntity>,
}

/// `BillingStore` over a single mutex. A commit is validated against a copy
/// of the state and swapped in only when every write succeeds.
#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    state: Mutex<State>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memberships are provisioned by the identity side; this stands in for it.
    pub fn seed_membership(&self, membership: OrganizationMembershipEntity) -> StoreResult<()> {
        let mut state = self.lock()?;
        state
            .memberships
            .insert((membership.organization_id, membership.user_id), membership);
        Ok(())
    }

    pub fn subscriptions(&self) -> StoreResult<Vec<SubscriptionEntity>> {
        Ok(self.lock()?.subscriptions.values().cloned().collect())
    }

    pub fn processed_event_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.processed_events.len())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store mutex poisoned".to_string()))
    }
}

fn is_due(state: &State, subscription: &SubscriptionEntity, now: DateTime<Utc>) -> bool {
    if !subscription.is_active || subscription.is_deleted() {
        return false;
    }
    let period_end_cancel = subscription.cancel_at_period_end
        && subscription.status.is_live()
        && subscription.current_period_end <= now;
    let expiry = subscription.status == SubscriptionStatus::Canceled
        && subscription.expires_at.is_some_and(|expires_at| expires_at <= now);
    let scheduled = state
        .changes
        .iter()
        .any(|change| change.subscription_id == subscription.id && change.is_due(now));
    period_end_cancel || expiry || scheduled
}

/// Same rule as the `subscriptions_seats_within_limit` check constraint.
fn ensure_seats_within_limit(subscription: &SubscriptionEntity) -> StoreResult<()> {
    let within = subscription.used_seats <= subscription.seat_limit || subscription.auto_add_seats;
    if subscription.used_seats < 0 || !within {
        return Err(StoreError::Conflict(format!(
            "subscription {} uses {} of {} seats",
            subscription.id, subscription.used_seats, subscription.seat_limit
        )));
    }
    Ok(())
}

fn apply_subscription(state: &mut State, write: SubscriptionWrite) -> StoreResult<()> {
    match write {
        SubscriptionWrite::Insert(subscription) => {
            if state.subscriptions.contains_key(&subscription.id) {
                return Err(StoreError::Conflict(format!("subscription {} exists", subscription.id)));
            }
            ensure_seats_within_limit(&subscription)?;
            if let Some(external_ref) = &subscription.external_ref {
                let taken = state
                    .subscriptions
                    .values()
                    .any(|existing| existing.external_ref.as_ref() == Some(external_ref));
                if taken {
                    return Err(StoreError::Conflict(format!("external ref {external_ref} exists")));
                }
            }
            let owner_taken = state.subscriptions.values().any(|existing| {
                existing.owner == subscription.owner && existing.is_active && !existing.is_deleted()
            });
            if subscription.is_active && owner_taken {
                return Err(StoreError::Conflict(
                    "owner already has an active subscription".to_string(),
                ));
            }
            state.subscriptions.insert(subscription.id, subscription);
        }
        SubscriptionWrite::Update { expected_version, next } => {
            let stored = state.subscriptions.get(&next.id).ok_or(StoreError::NotFound)?;
            if stored.version != expected_version {
                return Err(StoreError::VersionMismatch(next.id));
            }
            ensure_seats_within_limit(&next)?;
            state.subscriptions.insert(next.id, next);
        }
    }
    Ok(())
}

fn apply_change(state: &mut State, write: ChangeWrite) -> StoreResult<()> {
    match write {
        ChangeWrite::Insert(change) => state.changes.push(change),
        ChangeWrite::UpdateStatus {
            change_id,
            status,
            failure_reason,
            updated_at,
        } => {
            let change = state
                .changes
                .iter_mut()
                .find(|change| change.id == change_id)
                .ok_or(StoreError::NotFound)?;
            change.status = status;
            change.failure_reason = failure_reason;
            change.updated_at = updated_at;
        }
    }
    Ok(())
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn find_processed_event(&self, external_event_id: &str) -> StoreResult<Option<ProcessedEventEntity>> {
        Ok(self.lock()?.processed_events.get(external_event_id).cloned())
    }

    async fn find_subscription(&self, subscription_id: Uuid) -> StoreResult<Option<SubscriptionEntity>> {
        Ok(self.lock()?.subscriptions.get(&subscription_id).cloned())
    }

    async fn find_subscription_by_external_ref(
        &self,
        external_ref: &str,
    ) -> StoreResult<Option<SubscriptionEntity>> {
        Ok(self
            .lock()?
            .subscriptions
            .values()
            .find(|subscription| subscription.external_ref.as_deref() == Some(external_ref))
            .cloned())
    }

    async fn find_active_subscription_for_owner(
        &self,
        owner: SubscriptionOwner,
    ) -> StoreResult<Option<SubscriptionEntity>> {
        Ok(self
            .lock()?
            .subscriptions
            .values()
            .find(|subscription| {
                subscription.owner == owner && subscription.is_active && !subscription.is_deleted()
            })
            .cloned())
    }

    async fn list_subscription_changes(
        &self,
        subscription_id: Uuid,
    ) -> StoreResult<Vec<SubscriptionChangeEntity>> {
        let mut changes: Vec<SubscriptionChangeEntity> = self
            .lock()?
            .changes
            .iter()
            .filter(|change| change.subscription_id == subscription_id)
            .cloned()
            .collect();
        changes.sort_by_key(|change| change.created_at);
        Ok(changes)
    }

    async fn find_membership(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<OrganizationMembershipEntity>> {
        Ok(self.lock()?.memberships.get(&(organization_id, user_id)).cloned())
    }

    async fn list_subscriptions_due(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>> {
        let state = self.lock()?;
        let mut due: Vec<&SubscriptionEntity> = state
            .subscriptions
            .values()
            .filter(|subscription| is_due(&state, subscription, now))
            .collect();
        due.sort_by_key(|subscription| subscription.updated_at);
        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|subscription| subscription.id)
            .collect())
    }

    async fn commit(&self, commit: BillingCommit) -> StoreResult<()> {
        let mut state = self.lock()?;
        let mut next = state.clone();

        if let Some(processed) = commit.processed_event {
            if next.processed_events.contains_key(&processed.external_event_id) {
                return Err(StoreError::DuplicateEvent(processed.external_event_id));
            }
            next.processed_events
                .insert(processed.external_event_id.clone(), processed);
        }
        if let Some(write) = commit.subscription {
            apply_subscription(&mut next, write)?;
        }
        for write in commit.changes {
            apply_change(&mut next, write)?;
        }
        for membership in commit.memberships {
            next.memberships
                .insert((membership.organization_id, membership.user_id), membership);
        }

        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::value_objects::{
        billing_events::{EventDisposition, EventOutcome},
        enums::event_types::BillingEventType,
    };

    fn subscription(owner: SubscriptionOwner) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            external_ref: Some(format!("sub_{}", Uuid::new_v4().simple())),
            owner,
            status: SubscriptionStatus::Active,
            plan_id: "pro-v1".to_string(),
            seat_limit: 1,
            used_seats: 1,
            auto_add_seats: false,
            trial_ends_at: None,
            current_period_start: now,
            current_period_end: now + Duration::days(30),
            cancel_at_period_end: false,
            canceled_at: None,
            expires_at: None,
            is_active: true,
            deleted_at: None,
            last_event_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn processed(event_id: &str, subscription_id: Uuid) -> ProcessedEventEntity {
        ProcessedEventEntity {
            external_event_id: event_id.to_string(),
            event_type: BillingEventType::PaymentSucceeded,
            subscription_id: Some(subscription_id),
            outcome: EventOutcome::new(
                subscription_id,
                EventDisposition::Unchanged,
                SubscriptionStatus::Active,
                Vec::new(),
            ),
            provider_timestamp: Utc::now(),
            processed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = InMemoryBillingStore::new();
        let original = subscription(SubscriptionOwner::User(Uuid::new_v4()));
        store
            .commit(BillingCommit {
                subscription: Some(SubscriptionWrite::Insert(original.clone())),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut next = original.clone();
        next.version = 2;
        let result = store
            .commit(BillingCommit {
                subscription: Some(SubscriptionWrite::Update {
                    expected_version: 0,
                    next,
                }),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(StoreError::VersionMismatch(id)) if id == original.id));
    }

    #[tokio::test]
    async fn duplicate_event_rolls_back_the_whole_commit() {
        let store = InMemoryBillingStore::new();
        let original = subscription(SubscriptionOwner::User(Uuid::new_v4()));
        store
            .commit(BillingCommit {
                subscription: Some(SubscriptionWrite::Insert(original.clone())),
                processed_event: Some(processed("evt_1", original.id)),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut next = original.clone();
        next.status = SubscriptionStatus::PastDue;
        next.version = 2;
        let result = store
            .commit(BillingCommit {
                subscription: Some(SubscriptionWrite::Update {
                    expected_version: 1,
                    next,
                }),
                processed_event: Some(processed("evt_1", original.id)),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(StoreError::DuplicateEvent(_))));
        let stored = store.find_subscription(original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(store.processed_event_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn second_active_subscription_for_owner_is_a_conflict() {
        let store = InMemoryBillingStore::new();
        let owner = SubscriptionOwner::Organization(Uuid::new_v4());
        store
            .commit(BillingCommit {
                subscription: Some(SubscriptionWrite::Insert(subscription(owner))),
                ..Default::default()
            })
            .await
            .unwrap();

        let result = store
            .commit(BillingCommit {
                subscription: Some(SubscriptionWrite::Insert(subscription(owner))),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(store.subscriptions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn seats_over_the_limit_need_auto_add() {
        let store = InMemoryBillingStore::new();
        let mut original = subscription(SubscriptionOwner::Organization(Uuid::new_v4()));
        original.seat_limit = 5;
        original.used_seats = 4;
        store
            .commit(BillingCommit {
                subscription: Some(SubscriptionWrite::Insert(original.clone())),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut shrunk = original.clone();
        shrunk.seat_limit = 3;
        shrunk.version = 2;
        let refused = store
            .commit(BillingCommit {
                subscription: Some(SubscriptionWrite::Update {
                    expected_version: 1,
                    next: shrunk.clone(),
                }),
                ..Default::default()
            })
            .await;
        assert!(matches!(refused, Err(StoreError::Conflict(_))));

        shrunk.auto_add_seats = true;
        store
            .commit(BillingCommit {
                subscription: Some(SubscriptionWrite::Update {
                    expected_version: 1,
                    next: shrunk,
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        let stored = store.find_subscription(original.id).await.unwrap().unwrap();
        assert_eq!((stored.used_seats, stored.seat_limit), (4, 3));
    }

    #[tokio::test]
    async fn period_end_cancellation_is_listed_as_due() {
        let store = InMemoryBillingStore::new();
        let mut due = subscription(SubscriptionOwner::User(Uuid::new_v4()));
        due.cancel_at_period_end = true;
        due.current_period_end = Utc::now() - Duration::minutes(1);
        let not_due = subscription(SubscriptionOwner::User(Uuid::new_v4()));
        for entity in [due.clone(), not_due] {
            store
                .commit(BillingCommit {
                    subscription: Some(SubscriptionWrite::Insert(entity)),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let ids = store.list_subscriptions_due(Utc::now(), 10).await.unwrap();

        assert_eq!(ids, vec![due.id]);
    }
}
