//! Single entry point for everything that mutates billing state.
//!
//! Provider events and management requests both resolve a subscription, take
//! its lock, settle anything that became due, run the state machine, commit
//! through the store and emit audit records after the commit.

mod management;
mod memberships;
mod provider_events;

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::usercases::{
        audit_emission::{AuditContext, AuditEmitter, build_records},
        clock::Clock,
        plan_catalog::PlanCatalog,
        rbac::{self, Requirement},
        seat_allocator,
        subscription_locks::SubscriptionLocks,
        subscription_state_machine::{Settlement, SubscriptionStateMachine},
    },
    domain::{
        entities::{
            audit_logs::AuditRecord, organization_memberships::OrganizationMembershipEntity,
            subscriptions::SubscriptionEntity,
        },
        errors::{BillingError, BillingResult},
        repositories::{
            audit_sink::AuditSink,
            billing_portal::BillingPortalGateway,
            billing_store::{BillingCommit, BillingStore, SubscriptionWrite},
        },
        value_objects::{
            enums::{change_actions::ChangeStatus, permissions::Permission},
            management::Principal,
            subscription_owners::SubscriptionOwner,
            subscriptions::{SubscriptionChangeDto, SubscriptionSnapshot, SubscriptionStatusView},
            transitions::TransitionEffect,
        },
    },
};

#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub lock_timeout: Duration,
    pub reactivation_grace: chrono::Duration,
    pub audit_timeout: Duration,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            reactivation_grace: chrono::Duration::days(30),
            audit_timeout: Duration::from_secs(2),
        }
    }
}

pub struct BillingDispatcher<S, A, P>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    store: Arc<S>,
    portal: Arc<P>,
    catalog: Arc<PlanCatalog>,
    state_machine: SubscriptionStateMachine,
    locks: SubscriptionLocks,
    audit: AuditEmitter<A>,
    clock: Arc<dyn Clock>,
}

impl<S, A, P> BillingDispatcher<S, A, P>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<S>,
        audit_sink: Arc<A>,
        portal: Arc<P>,
        catalog: Arc<PlanCatalog>,
        clock: Arc<dyn Clock>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            store,
            portal,
            catalog,
            state_machine: SubscriptionStateMachine::new(settings.reactivation_grace),
            locks: SubscriptionLocks::new(settings.lock_timeout),
            audit: AuditEmitter::new(audit_sink, settings.audit_timeout),
            clock,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Current subscription of the caller (or of `organization_id`), with
    /// seat availability, the pending scheduled change and change history.
    pub async fn get_status(
        &self,
        principal: &Principal,
        organization_id: Option<Uuid>,
    ) -> BillingResult<SubscriptionStatusView> {
        let owner = match organization_id {
            Some(organization_id) => SubscriptionOwner::Organization(organization_id),
            None => SubscriptionOwner::User(principal.user_id),
        };
        let found = self.active_subscription_for(owner).await?;

        let guard = self.locks.acquire(&found.id.to_string()).await?;
        let now = self.clock.now();
        let original = self.load_subscription(found.id).await?;
        self.authorize(principal, &original, Permission::ViewSubscription)
            .await?;

        let settlement = self.load_settled(&original, now).await?;
        let records = self.persist_settlement(&original, &settlement, now).await?;
        drop(guard);
        self.audit.emit(records).await;

        let mut history: Vec<SubscriptionChangeDto> =
            settlement.changes.iter().map(SubscriptionChangeDto::from).collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let pending_change = history
            .iter()
            .find(|change| change.status == ChangeStatus::Scheduled)
            .cloned();

        Ok(SubscriptionStatusView {
            subscription: SubscriptionSnapshot::from(&settlement.subscription),
            seats: seat_allocator::compute_availability(&settlement.subscription),
            pending_change,
            history,
        })
    }

    /// Settles subscriptions whose scheduled work is due. Returns how many
    /// were changed.
    pub async fn settle_due(&self, limit: i64) -> BillingResult<usize> {
        let now = self.clock.now();
        let due = self.store.list_subscriptions_due(now, limit).await?;
        if due.is_empty() {
            return Ok(0);
        }

        info!(due_count = due.len(), "billing_dispatcher: settling due subscriptions");
        let mut settled = 0;
        for subscription_id in due {
            match self.settle_subscription(subscription_id).await {
                Ok(true) => settled += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        %subscription_id,
                        error = %err,
                        "billing_dispatcher: failed to settle subscription"
                    );
                }
            }
        }
        Ok(settled)
    }

    async fn settle_subscription(&self, subscription_id: Uuid) -> BillingResult<bool> {
        let guard = self.locks.acquire(&subscription_id.to_string()).await?;
        let now = self.clock.now();
        let original = self.load_subscription(subscription_id).await?;
        let settlement = self.load_settled(&original, now).await?;
        if settlement.is_noop() {
            return Ok(false);
        }
        let records = self.persist_settlement(&original, &settlement, now).await?;
        drop(guard);
        self.audit.emit(records).await;
        Ok(true)
    }

    async fn persist_settlement(
        &self,
        original: &SubscriptionEntity,
        settlement: &Settlement,
        now: DateTime<Utc>,
    ) -> BillingResult<Vec<AuditRecord>> {
        if settlement.is_noop() {
            return Ok(Vec::new());
        }
        self.commit(BillingCommit {
            subscription: subscription_write(original, settlement.subscription.clone(), now),
            changes: settlement.change_writes.clone(),
            ..Default::default()
        })
        .await?;

        info!(
            subscription_id = %original.id,
            status = %settlement.subscription.status,
            effect_count = settlement.effects.len(),
            "billing_dispatcher: subscription settled"
        );
        Ok(build_records(
            &settlement.subscription,
            &settlement.effects,
            &AuditContext::default(),
            now,
        ))
    }

    async fn load_subscription(&self, subscription_id: Uuid) -> BillingResult<SubscriptionEntity> {
        self.store
            .find_subscription(subscription_id)
            .await?
            .filter(|subscription| !subscription.is_deleted())
            .ok_or_else(|| BillingError::NotFound(format!("subscription {subscription_id}")))
    }

    async fn active_subscription_for(&self, owner: SubscriptionOwner) -> BillingResult<SubscriptionEntity> {
        self.store
            .find_active_subscription_for_owner(owner)
            .await?
            .ok_or_else(|| match owner {
                SubscriptionOwner::User(user_id) => {
                    BillingError::NotFound(format!("active subscription for user {user_id}"))
                }
                SubscriptionOwner::Organization(organization_id) => BillingError::NotFound(format!(
                    "active subscription for organization {organization_id}"
                )),
            })
    }

    async fn load_settled(&self, subscription: &SubscriptionEntity, now: DateTime<Utc>) -> BillingResult<Settlement> {
        let changes = self.store.list_subscription_changes(subscription.id).await?;
        Ok(self.state_machine.settle(&self.catalog, subscription, &changes, now))
    }

    async fn authorize(
        &self,
        principal: &Principal,
        subscription: &SubscriptionEntity,
        permission: Permission,
    ) -> BillingResult<()> {
        let membership = match subscription.owner {
            SubscriptionOwner::User(_) => None,
            SubscriptionOwner::Organization(organization_id) => {
                self.store.find_membership(organization_id, principal.user_id).await?
            }
        };
        rbac::require_for_subscription(principal.user_id, subscription, membership.as_ref(), permission)
            .inspect_err(|err| {
                warn!(
                    user_id = %principal.user_id,
                    subscription_id = %subscription.id,
                    permission = permission.as_str(),
                    error = %err,
                    "billing_dispatcher: request not authorized"
                );
            })
    }

    /// Loads the caller's membership and checks it against `requirement`.
    async fn require_member(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        requirement: Requirement,
    ) -> BillingResult<OrganizationMembershipEntity> {
        let membership = self
            .store
            .find_membership(organization_id, principal.user_id)
            .await?;
        rbac::require(principal.user_id, membership.as_ref(), requirement)?;
        membership.ok_or_else(|| BillingError::PermissionDenied {
            user_id: principal.user_id,
            required: "organization membership".to_string(),
        })
    }

    async fn commit(&self, commit: BillingCommit) -> BillingResult<()> {
        self.store.commit(commit).await.map_err(|err| {
            error!(db_error = ?err, "billing_dispatcher: commit failed");
            BillingError::from(err)
        })
    }

    fn records(
        &self,
        subscription: &SubscriptionEntity,
        effects: &[TransitionEffect],
        context: &AuditContext,
        now: DateTime<Utc>,
    ) -> Vec<AuditRecord> {
        build_records(subscription, effects, context, now)
    }
}

/// Compare-and-swap write of `next` over `original`, or nothing when the
/// subscription did not change.
fn subscription_write(
    original: &SubscriptionEntity,
    mut next: SubscriptionEntity,
    now: DateTime<Utc>,
) -> Option<SubscriptionWrite> {
    if &next == original {
        return None;
    }
    next.version = original.version + 1;
    next.updated_at = now;
    Some(SubscriptionWrite::Update {
        expected_version: original.version,
        next,
    })
}
