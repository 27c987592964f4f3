use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::{BillingDispatcher, subscription_write};
use crate::{
    application::usercases::{
        audit_emission::AuditContext,
        plan_catalog::PlanComparison,
        rbac::Requirement,
        seat_allocator,
        subscription_state_machine::{NewSubscription, Settlement},
    },
    domain::{
        entities::{
            audit_logs::AuditRecord, subscription_changes::SubscriptionChangeEntity,
            subscriptions::SubscriptionEntity,
        },
        errors::{BillingError, BillingResult},
        repositories::{
            audit_sink::AuditSink,
            billing_portal::{BillingPortalGateway, BillingPortalRequest},
            billing_store::{BillingCommit, BillingStore, ChangeWrite, SubscriptionWrite},
        },
        value_objects::{
            enums::{
                audit_actions::AuditAction,
                change_actions::{ChangeAction, ChangeStatus},
                permissions::Permission,
            },
            management::{
                BillingPortalSession, CreateSubscriptionRequest, ManageSubscriptionRequest,
                ManageSubscriptionResponse, OpenBillingPortalRequest, OrganizationSubscriptionAction,
                Principal,
            },
            subscription_owners::SubscriptionOwner,
            subscriptions::SubscriptionSnapshot,
            transitions::{Transition, TransitionEffect},
        },
    },
};

impl<S, A, P> BillingDispatcher<S, A, P>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    /// Records a requested upgrade, downgrade, cancellation or reactivation.
    /// Applies it immediately unless its effective date is in the future.
    pub async fn request_change(
        &self,
        principal: &Principal,
        request: ManageSubscriptionRequest,
    ) -> BillingResult<ManageSubscriptionResponse> {
        info!(
            user_id = %principal.user_id,
            subscription_id = %request.subscription_id,
            action = %request.action,
            "billing_dispatcher: subscription change requested"
        );

        let guard = self.locks.acquire(&request.subscription_id.to_string()).await?;
        let now = self.clock.now();
        let original = self.load_subscription(request.subscription_id).await?;
        if let Some(organization_id) = request.organization_id {
            if original.owner.organization_id() != Some(organization_id) {
                return Err(BillingError::Validation(format!(
                    "subscription {} does not belong to organization {organization_id}",
                    original.id
                )));
            }
        }
        self.authorize(principal, &original, Permission::ManagePlan).await?;

        let settlement = self.load_settled(&original, now).await?;
        let current_plan = self.catalog.get(&settlement.subscription.plan_id)?;
        if request.from_tier != current_plan.tier && request.from_tier != current_plan.id {
            return Err(BillingError::conflict(
                Some(original.id),
                format!("{} from {}", request.action, request.from_tier),
                settlement.subscription.status.as_str(),
                format!("current tier is {}", current_plan.tier),
            ));
        }

        let (to_tier, default_effective) = match request.action {
            ChangeAction::Upgrade | ChangeAction::Downgrade => {
                let target = self.catalog.resolve(&request.to_tier)?;
                let comparison = self.catalog.compare(&current_plan, &target);
                let matches_action = match comparison {
                    PlanComparison::Upgrade => request.action == ChangeAction::Upgrade,
                    PlanComparison::Downgrade => request.action == ChangeAction::Downgrade,
                    PlanComparison::SameTier => true,
                };
                if !matches_action {
                    return Err(BillingError::Validation(format!(
                        "{} to {} is not a {}",
                        current_plan.tier, target.tier, request.action
                    )));
                }
                let effective = match request.action {
                    ChangeAction::Downgrade => settlement.subscription.current_period_end,
                    _ => now,
                };
                (request.to_tier.clone(), effective)
            }
            ChangeAction::Cancellation => (current_plan.tier.clone(), now),
            ChangeAction::Reactivation => {
                if request.effective_date.is_some_and(|effective| effective > now) {
                    return Err(BillingError::Validation(
                        "reactivation cannot be scheduled".to_string(),
                    ));
                }
                (current_plan.tier.clone(), now)
            }
        };

        let change = SubscriptionChangeEntity {
            id: Uuid::new_v4(),
            subscription_id: original.id,
            action: request.action,
            from_tier: current_plan.tier.clone(),
            to_tier,
            seat_limit: request.seat_change,
            effective_date: request.effective_date.unwrap_or(default_effective),
            status: ChangeStatus::Pending,
            requested_by: Some(principal.user_id),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        let result = self
            .record_change(&original, settlement, change, principal.user_id, now)
            .await;
        drop(guard);
        let (records, outcome) = result?;
        self.audit.emit(records).await;
        let (_, change) = outcome?;

        info!(
            change_id = %change.id,
            status = %change.status,
            effective_date = %change.effective_date,
            "billing_dispatcher: subscription change recorded"
        );
        Ok(ManageSubscriptionResponse {
            success: true,
            change_id: change.id,
            status: change.status,
        })
    }

    /// Inserts `change` as applied, scheduled or failed. A conflicting change
    /// is still committed as failed; its error comes back in the inner result
    /// so the audit records can be emitted first.
    #[allow(clippy::type_complexity)]
    async fn record_change(
        &self,
        original: &SubscriptionEntity,
        settlement: Settlement,
        mut change: SubscriptionChangeEntity,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> BillingResult<(
        Vec<AuditRecord>,
        BillingResult<(SubscriptionEntity, SubscriptionChangeEntity)>,
    )> {
        let current = settlement.subscription.clone();
        let mut change_writes = settlement.change_writes.clone();
        let mut records = self.records(&current, &settlement.effects, &AuditContext::default(), now);
        let context = AuditContext {
            actor_user_id: Some(actor),
            change_id: Some(change.id),
            ..Default::default()
        };

        let scheduled = change.effective_date > now;
        let attempt = self
            .state_machine
            .apply_change(&self.catalog, &current, &change, now);

        let transition = match attempt {
            Ok(_) if scheduled => {
                change.status = ChangeStatus::Scheduled;
                Transition {
                    next: current.clone(),
                    effects: vec![TransitionEffect::new(
                        AuditAction::ChangeScheduled,
                        json!({
                            "changeId": change.id,
                            "action": change.action,
                            "toTier": change.to_tier,
                            "effectiveDate": change.effective_date,
                        }),
                    )],
                }
            }
            Ok(transition) => {
                change.status = ChangeStatus::Applied;
                transition
            }
            Err(err @ BillingError::Conflict { .. }) => {
                let reason = err.to_string();
                warn!(
                    change_id = %change.id,
                    subscription_id = %original.id,
                    reason = %reason,
                    "billing_dispatcher: subscription change failed"
                );
                change.status = ChangeStatus::Failed;
                change.failure_reason = Some(reason.clone());
                change_writes.push(ChangeWrite::Insert(change.clone()));

                self.commit(BillingCommit {
                    subscription: subscription_write(original, current.clone(), now),
                    changes: change_writes,
                    ..Default::default()
                })
                .await?;

                records.extend(self.records(
                    &current,
                    &[TransitionEffect::new(
                        AuditAction::ChangeFailed,
                        json!({ "changeId": change.id, "action": change.action, "reason": reason }),
                    )],
                    &context,
                    now,
                ));
                return Ok((records, Err(err)));
            }
            Err(err) => return Err(err),
        };

        let mut effects = transition.effects;
        if change.action.is_plan_change() {
            for older in settlement.changes.iter().filter(|older| {
                older.status == ChangeStatus::Scheduled && older.action.is_plan_change()
            }) {
                let reason = format!("superseded by change {}", change.id);
                change_writes.push(ChangeWrite::UpdateStatus {
                    change_id: older.id,
                    status: ChangeStatus::Failed,
                    failure_reason: Some(reason.clone()),
                    updated_at: now,
                });
                effects.push(TransitionEffect::new(
                    AuditAction::ChangeFailed,
                    json!({ "changeId": older.id, "action": older.action, "reason": reason }),
                ));
            }
        }
        change_writes.push(ChangeWrite::Insert(change.clone()));

        let next = transition.next;
        self.commit(BillingCommit {
            subscription: subscription_write(original, next.clone(), now),
            changes: change_writes,
            ..Default::default()
        })
        .await?;

        records.extend(self.records(&next, &effects, &context, now));
        Ok((records, Ok((next, change))))
    }

    /// Organization-level billing actions: seats, plan and billing settings.
    pub async fn manage_organization(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        action: OrganizationSubscriptionAction,
    ) -> BillingResult<SubscriptionSnapshot> {
        info!(
            user_id = %principal.user_id,
            %organization_id,
            ?action,
            "billing_dispatcher: organization subscription action requested"
        );

        let found = self
            .active_subscription_for(SubscriptionOwner::Organization(organization_id))
            .await?;
        let guard = self.locks.acquire(&found.id.to_string()).await?;
        let now = self.clock.now();
        let original = self.load_subscription(found.id).await?;

        let permission = match &action {
            OrganizationSubscriptionAction::AddSeats { .. }
            | OrganizationSubscriptionAction::RemoveSeats { .. } => Permission::ManageSeats,
            OrganizationSubscriptionAction::ChangePlan { .. } => Permission::ManagePlan,
            OrganizationSubscriptionAction::UpdateBilling { .. } => Permission::ManageBilling,
        };
        self.authorize(principal, &original, permission).await?;

        let settlement = self.load_settled(&original, now).await?;
        let current = settlement.subscription.clone();
        let plan = self.catalog.get(&current.plan_id)?;

        let transition = match action {
            OrganizationSubscriptionAction::ChangePlan {
                plan: requested,
                effective_date,
                seat_limit,
            } => {
                let target = self.catalog.resolve(&requested)?;
                let change_action = match self.catalog.compare(&plan, &target) {
                    PlanComparison::Upgrade => ChangeAction::Upgrade,
                    PlanComparison::Downgrade => ChangeAction::Downgrade,
                    PlanComparison::SameTier if target.version >= plan.version => ChangeAction::Upgrade,
                    PlanComparison::SameTier => ChangeAction::Downgrade,
                };
                let default_effective = match change_action {
                    ChangeAction::Downgrade => current.current_period_end,
                    _ => now,
                };
                let change = SubscriptionChangeEntity {
                    id: Uuid::new_v4(),
                    subscription_id: original.id,
                    action: change_action,
                    from_tier: plan.tier.clone(),
                    to_tier: target.id.clone(),
                    seat_limit,
                    effective_date: effective_date.unwrap_or(default_effective),
                    status: ChangeStatus::Pending,
                    requested_by: Some(principal.user_id),
                    failure_reason: None,
                    created_at: now,
                    updated_at: now,
                };

                let result = self
                    .record_change(&original, settlement, change, principal.user_id, now)
                    .await;
                drop(guard);
                let (records, outcome) = result?;
                self.audit.emit(records).await;
                let (next, _) = outcome?;
                return Ok(SubscriptionSnapshot::from(&next));
            }
            OrganizationSubscriptionAction::AddSeats { seats, approved_limit } => {
                seat_allocator::add_seats(&current, &plan, seats, approved_limit)?
            }
            OrganizationSubscriptionAction::RemoveSeats { seats } => {
                seat_allocator::remove_seats(&current, seats)?
            }
            OrganizationSubscriptionAction::UpdateBilling {
                auto_add_seats,
                cancel_at_period_end,
                seat_limit,
            } => {
                if auto_add_seats.is_none() && cancel_at_period_end.is_none() && seat_limit.is_none() {
                    return Err(BillingError::Validation(
                        "update_billing needs at least one setting".to_string(),
                    ));
                }
                let mut transition = Transition::unchanged(&current);
                if let Some(auto_add_seats) = auto_add_seats {
                    if auto_add_seats != transition.next.auto_add_seats {
                        let mut next = transition.next.clone();
                        next.auto_add_seats = auto_add_seats;
                        transition = transition.then(Transition {
                            next,
                            effects: vec![TransitionEffect::new(
                                AuditAction::BillingSettingsUpdated,
                                json!({ "autoAddSeats": auto_add_seats }),
                            )],
                        });
                    }
                }
                if let Some(seat_limit) = seat_limit {
                    let resize = seat_allocator::resize_limit(&transition.next, &plan, seat_limit)?;
                    transition = transition.then(resize);
                }
                if let Some(cancel_at_period_end) = cancel_at_period_end {
                    let update = self
                        .state_machine
                        .set_cancel_at_period_end(&transition.next, cancel_at_period_end)?;
                    transition = transition.then(update);
                }
                transition
            }
        };

        let mut effects = settlement.effects.clone();
        effects.extend(transition.effects.iter().cloned());
        let next = transition.next;
        self.commit(BillingCommit {
            subscription: subscription_write(&original, next.clone(), now),
            changes: settlement.change_writes,
            ..Default::default()
        })
        .await?;
        drop(guard);

        let mut records = self.records(&next, &settlement.effects, &AuditContext::default(), now);
        records.extend(self.records(
            &next,
            &transition.effects,
            &AuditContext {
                actor_user_id: Some(principal.user_id),
                ..Default::default()
            },
            now,
        ));
        self.audit.emit(records).await;

        info!(
            subscription_id = %next.id,
            used_seats = next.used_seats,
            seat_limit = next.seat_limit,
            effect_count = effects.len(),
            "billing_dispatcher: organization subscription updated"
        );
        Ok(SubscriptionSnapshot::from(&next))
    }

    /// Management-initiated subscription for a user or an organization.
    pub async fn create_subscription(
        &self,
        principal: &Principal,
        request: CreateSubscriptionRequest,
    ) -> BillingResult<SubscriptionSnapshot> {
        let (owner_key, not_owner) = match request.owner {
            SubscriptionOwner::User(user_id) => (user_id, user_id != principal.user_id),
            SubscriptionOwner::Organization(organization_id) => (organization_id, false),
        };
        if not_owner {
            return Err(BillingError::PermissionDenied {
                user_id: principal.user_id,
                required: "subscription owner".to_string(),
            });
        }
        if let SubscriptionOwner::Organization(organization_id) = request.owner {
            self.require_member(
                principal,
                organization_id,
                Requirement::Permission(Permission::ManagePlan),
            )
            .await?;
        }

        let guard = self.locks.acquire(&format!("owner:{owner_key}")).await?;
        let now = self.clock.now();
        if let Some(existing) = self
            .store
            .find_active_subscription_for_owner(request.owner)
            .await?
        {
            return Err(BillingError::conflict(
                Some(existing.id),
                "create subscription",
                existing.status.as_str(),
                "owner already has an active subscription",
            ));
        }

        let plan = self.catalog.resolve(&request.plan)?;
        let transition = self.state_machine.create(
            &self.catalog,
            &plan,
            NewSubscription {
                owner: request.owner,
                external_ref: request.external_ref,
                seat_limit: request.seat_limit,
                auto_add_seats: request.auto_add_seats,
                status: None,
                trial_ends_at: None,
                current_period_start: None,
                current_period_end: None,
            },
            now,
        )?;
        let subscription = transition.next;

        self.commit(BillingCommit {
            subscription: Some(SubscriptionWrite::Insert(subscription.clone())),
            ..Default::default()
        })
        .await?;
        drop(guard);

        let context = AuditContext {
            actor_user_id: Some(principal.user_id),
            ..Default::default()
        };
        self.audit
            .emit(self.records(&subscription, &transition.effects, &context, now))
            .await;

        info!(
            subscription_id = %subscription.id,
            plan_id = %subscription.plan_id,
            status = %subscription.status,
            owner_type = %subscription.owner.owner_type(),
            "billing_dispatcher: subscription created"
        );
        Ok(SubscriptionSnapshot::from(&subscription))
    }

    pub async fn open_billing_portal(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        request: OpenBillingPortalRequest,
    ) -> BillingResult<BillingPortalSession> {
        if !(request.return_url.starts_with("https://") || request.return_url.starts_with("http://")) {
            return Err(BillingError::Validation(
                "returnUrl must be an absolute http(s) URL".to_string(),
            ));
        }

        let subscription = self
            .active_subscription_for(SubscriptionOwner::Organization(organization_id))
            .await?;
        self.authorize(principal, &subscription, Permission::AccessBillingPortal)
            .await?;

        let session = self
            .portal
            .create_session(BillingPortalRequest {
                subscription_id: subscription.id,
                external_ref: subscription.external_ref.clone(),
                organization_id,
                requested_by: principal.user_id,
                return_url: request.return_url,
            })
            .await
            .map_err(|err| {
                warn!(
                    subscription_id = %subscription.id,
                    provider_error = ?err,
                    "billing_dispatcher: billing portal session failed"
                );
                BillingError::ExternalProvider(err.to_string())
            })?;

        let context = AuditContext {
            actor_user_id: Some(principal.user_id),
            ..Default::default()
        };
        self.audit
            .emit(self.records(
                &subscription,
                &[TransitionEffect::new(AuditAction::BillingPortalOpened, json!({}))],
                &context,
                self.clock.now(),
            ))
            .await;

        Ok(session)
    }
}
