//! Lifecycle rules for a single subscription.
//!
//! `trialing -> active <-> past_due -> canceled -> expired`, with plan
//! substitution inside `trialing`/`active`. Every function here is pure: it
//! takes the current state and returns a candidate [`Transition`] or a
//! `Conflict`. The dispatcher decides what gets committed.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    application::usercases::{
        plan_catalog::{PlanCatalog, PlanComparison},
        seat_allocator,
    },
    domain::{
        entities::{
            plans::PlanEntity, subscription_changes::SubscriptionChangeEntity,
            subscriptions::SubscriptionEntity,
        },
        errors::{BillingError, BillingResult},
        repositories::billing_store::ChangeWrite,
        value_objects::{
            billing_events::{
                BillingEventKind, PaymentPayload, SubscriptionDeletedPayload,
                SubscriptionUpdatedPayload,
            },
            enums::{
                audit_actions::AuditAction,
                change_actions::{ChangeAction, ChangeStatus},
                owner_types::OwnerType,
                subscription_statuses::SubscriptionStatus,
            },
            subscription_owners::SubscriptionOwner,
            transitions::{Transition, TransitionEffect},
        },
    },
};

const DEFAULT_PERIOD_DAYS: i64 = 30;

/// Input for a brand-new subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub owner: SubscriptionOwner,
    pub external_ref: Option<String>,
    pub seat_limit: Option<i32>,
    pub auto_add_seats: bool,
    pub status: Option<SubscriptionStatus>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Result of lazily catching a subscription up with the clock.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub subscription: SubscriptionEntity,
    pub effects: Vec<TransitionEffect>,
    pub change_writes: Vec<ChangeWrite>,
    /// Change history with the settled statuses applied.
    pub changes: Vec<SubscriptionChangeEntity>,
}

impl Settlement {
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty() && self.change_writes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionStateMachine {
    reactivation_grace: Duration,
}

fn status_detail(from: SubscriptionStatus, to: SubscriptionStatus) -> serde_json::Value {
    json!({ "from": from, "to": to })
}

fn invalid(subscription: &SubscriptionEntity, attempted: impl Into<String>, reason: impl Into<String>) -> BillingError {
    BillingError::conflict(Some(subscription.id), attempted, subscription.status.as_str(), reason)
}

impl SubscriptionStateMachine {
    pub fn new(reactivation_grace: Duration) -> Self {
        Self { reactivation_grace }
    }

    pub fn reactivation_grace(&self) -> Duration {
        self.reactivation_grace
    }

    pub fn create(
        &self,
        catalog: &PlanCatalog,
        plan: &PlanEntity,
        request: NewSubscription,
        now: DateTime<Utc>,
    ) -> BillingResult<Transition> {
        let owner_type = request.owner.owner_type();
        catalog.ensure_applicable(plan, owner_type)?;

        let seat_limit = match owner_type {
            OwnerType::Individual => {
                if request.seat_limit.is_some_and(|limit| limit != 1) {
                    return Err(BillingError::Validation(
                        "individual subscriptions have exactly one seat".to_string(),
                    ));
                }
                1
            }
            OwnerType::Organization => {
                let seat_limit = request.seat_limit.unwrap_or(plan.min_seats.max(1));
                catalog.ensure_seat_range(plan, seat_limit)?;
                seat_limit
            }
        };

        let status = match request.status {
            None if plan.trial_days > 0 => SubscriptionStatus::Trialing,
            None => SubscriptionStatus::Active,
            Some(status @ (SubscriptionStatus::Trialing | SubscriptionStatus::Active)) => status,
            Some(other) => {
                return Err(BillingError::Validation(format!(
                    "a subscription cannot start as {other}"
                )));
            }
        };

        let period_start = request.current_period_start.unwrap_or(now);
        let period_end = request
            .current_period_end
            .unwrap_or(period_start + Duration::days(DEFAULT_PERIOD_DAYS));
        if period_end <= period_start {
            return Err(BillingError::Validation(
                "currentPeriodEnd must be after currentPeriodStart".to_string(),
            ));
        }
        let trial_ends_at = match status {
            SubscriptionStatus::Trialing => Some(
                request
                    .trial_ends_at
                    .unwrap_or(period_start + Duration::days(i64::from(plan.trial_days))),
            ),
            _ => None,
        };

        let subscription = SubscriptionEntity {
            id: Uuid::new_v4(),
            external_ref: request.external_ref,
            owner: request.owner,
            status,
            plan_id: plan.id.clone(),
            seat_limit,
            used_seats: 1,
            auto_add_seats: request.auto_add_seats && owner_type == OwnerType::Organization,
            trial_ends_at,
            current_period_start: period_start,
            current_period_end: period_end,
            cancel_at_period_end: false,
            canceled_at: None,
            expires_at: None,
            is_active: true,
            deleted_at: None,
            last_event_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        Ok(Transition {
            effects: vec![TransitionEffect::new(
                AuditAction::SubscriptionCreated,
                json!({ "planId": plan.id, "status": status, "seatLimit": seat_limit }),
            )],
            next: subscription,
        })
    }

    /// Applies everything that became due at `now`: scheduled changes in
    /// effective order, then a period-end cancellation, then expiry.
    pub fn settle(
        &self,
        catalog: &PlanCatalog,
        subscription: &SubscriptionEntity,
        changes: &[SubscriptionChangeEntity],
        now: DateTime<Utc>,
    ) -> Settlement {
        let mut next = subscription.clone();
        let mut effects = Vec::new();
        let mut change_writes = Vec::new();
        let mut changes = changes.to_vec();

        let mut due: Vec<usize> = changes
            .iter()
            .enumerate()
            .filter(|(_, change)| change.is_due(now))
            .map(|(index, _)| index)
            .collect();
        due.sort_by_key(|index| changes[*index].effective_date);

        for index in due {
            let change = &changes[index];
            let (status, failure_reason) = match self.apply_change(catalog, &next, change, change.effective_date) {
                Ok(transition) => {
                    next = transition.next;
                    effects.extend(transition.effects);
                    (ChangeStatus::Applied, None)
                }
                Err(err) => {
                    let reason = err.to_string();
                    effects.push(TransitionEffect::new(
                        AuditAction::ChangeFailed,
                        json!({ "changeId": change.id, "action": change.action, "reason": reason }),
                    ));
                    (ChangeStatus::Failed, Some(reason))
                }
            };
            change_writes.push(ChangeWrite::UpdateStatus {
                change_id: change.id,
                status,
                failure_reason: failure_reason.clone(),
                updated_at: now,
            });
            let change = &mut changes[index];
            change.status = status;
            change.failure_reason = failure_reason;
            change.updated_at = now;
        }

        if next.status.is_live() && next.cancel_at_period_end && next.current_period_end <= now {
            let at = next.current_period_end;
            if let Ok(transition) = self.cancel(&next, at) {
                next = transition.next;
                effects.extend(transition.effects);
            }
        }

        if next.status == SubscriptionStatus::Canceled {
            if let Some(expires_at) = next.expires_at.filter(|expires_at| *expires_at <= now) {
                let transition = self.expire(&next, expires_at);
                next = transition.next;
                effects.extend(transition.effects);

                for change in changes.iter_mut().filter(|change| change.status == ChangeStatus::Scheduled) {
                    let reason = "subscription expired".to_string();
                    change_writes.push(ChangeWrite::UpdateStatus {
                        change_id: change.id,
                        status: ChangeStatus::Failed,
                        failure_reason: Some(reason.clone()),
                        updated_at: now,
                    });
                    change.status = ChangeStatus::Failed;
                    change.failure_reason = Some(reason);
                    change.updated_at = now;
                }
            }
        }

        Settlement {
            subscription: next,
            effects,
            change_writes,
            changes,
        }
    }

    pub fn apply_change(
        &self,
        catalog: &PlanCatalog,
        subscription: &SubscriptionEntity,
        change: &SubscriptionChangeEntity,
        at: DateTime<Utc>,
    ) -> BillingResult<Transition> {
        match change.action {
            ChangeAction::Upgrade | ChangeAction::Downgrade => {
                let target = catalog.resolve(&change.to_tier)?;
                self.change_plan(catalog, subscription, &target, change.seat_limit, at)
            }
            ChangeAction::Cancellation => self.cancel(subscription, at),
            ChangeAction::Reactivation => self.reactivate(subscription, at),
        }
    }

    /// Drives a provider event. Expired subscriptions are filtered out by the
    /// caller before this is reached.
    pub fn apply_event(
        &self,
        catalog: &PlanCatalog,
        subscription: &SubscriptionEntity,
        kind: &BillingEventKind,
        at: DateTime<Utc>,
    ) -> BillingResult<Transition> {
        match kind {
            BillingEventKind::SubscriptionCreated(_) => Ok(Transition::unchanged(subscription)),
            BillingEventKind::SubscriptionUpdated(payload) => {
                self.provider_update(catalog, subscription, payload, at)
            }
            BillingEventKind::SubscriptionDeleted(payload) => self.provider_delete(subscription, payload, at),
            BillingEventKind::PaymentSucceeded(payload) => self.payment_succeeded(subscription, payload),
            BillingEventKind::PaymentFailed(payload) => self.payment_failed(subscription, payload),
        }
    }

    pub fn payment_succeeded(
        &self,
        subscription: &SubscriptionEntity,
        payload: &PaymentPayload,
    ) -> BillingResult<Transition> {
        let mut transition = match subscription.status {
            SubscriptionStatus::Trialing => self.activate(subscription, AuditAction::TrialToPaidUpgrade),
            SubscriptionStatus::PastDue => self.activate(subscription, AuditAction::PaymentRecovered),
            SubscriptionStatus::Active => Transition::unchanged(subscription),
            SubscriptionStatus::Canceled | SubscriptionStatus::Expired => {
                return Err(invalid(subscription, "record successful payment", "subscription is not live"));
            }
        };

        if let Some(period_end) = payload.period_end {
            let renewal = self.renew(&transition.next, payload.period_start, period_end)?;
            transition = transition.then(renewal);
        }
        Ok(transition)
    }

    pub fn payment_failed(
        &self,
        subscription: &SubscriptionEntity,
        payload: &PaymentPayload,
    ) -> BillingResult<Transition> {
        match subscription.status {
            SubscriptionStatus::Active => {
                let mut next = subscription.clone();
                next.status = SubscriptionStatus::PastDue;
                let mut detail = status_detail(subscription.status, next.status);
                if let Some(reason) = &payload.failure_reason {
                    detail["reason"] = json!(reason);
                }
                Ok(Transition {
                    next,
                    effects: vec![TransitionEffect::new(AuditAction::PaymentFailed, detail)],
                })
            }
            SubscriptionStatus::PastDue => Ok(Transition::unchanged(subscription)),
            _ => Err(invalid(subscription, "record failed payment", "only active subscriptions can become past due")),
        }
    }

    pub fn cancel(&self, subscription: &SubscriptionEntity, at: DateTime<Utc>) -> BillingResult<Transition> {
        if !subscription.status.is_live() {
            return Err(invalid(subscription, "cancel", "subscription is not live"));
        }

        let mut next = subscription.clone();
        next.status = SubscriptionStatus::Canceled;
        next.canceled_at = Some(at);
        next.cancel_at_period_end = false;
        next.expires_at = Some(subscription.current_period_end.max(at) + self.reactivation_grace);

        Ok(Transition {
            effects: vec![TransitionEffect::new(
                AuditAction::SubscriptionCanceled,
                json!({ "from": subscription.status, "to": next.status, "expiresAt": next.expires_at }),
            )],
            next,
        })
    }

    /// Reactivates a canceled subscription inside its window, or withdraws a
    /// pending period-end cancellation.
    pub fn reactivate(&self, subscription: &SubscriptionEntity, at: DateTime<Utc>) -> BillingResult<Transition> {
        match subscription.status {
            SubscriptionStatus::Canceled => {
                if subscription.expires_at.is_some_and(|expires_at| expires_at <= at) {
                    return Err(invalid(subscription, "reactivate", "reactivation window has elapsed"));
                }
                let mut next = subscription.clone();
                next.status = SubscriptionStatus::Active;
                next.canceled_at = None;
                next.expires_at = None;
                next.cancel_at_period_end = false;
                Ok(Transition {
                    effects: vec![TransitionEffect::new(
                        AuditAction::SubscriptionReactivated,
                        status_detail(subscription.status, next.status),
                    )],
                    next,
                })
            }
            status if status.is_live() && subscription.cancel_at_period_end => {
                let mut next = subscription.clone();
                next.cancel_at_period_end = false;
                Ok(Transition {
                    effects: vec![TransitionEffect::new(
                        AuditAction::SubscriptionReactivated,
                        json!({ "cancelAtPeriodEnd": false }),
                    )],
                    next,
                })
            }
            _ => Err(invalid(subscription, "reactivate", "subscription is not canceled")),
        }
    }

    pub fn expire(&self, subscription: &SubscriptionEntity, at: DateTime<Utc>) -> Transition {
        let mut next = subscription.clone();
        next.status = SubscriptionStatus::Expired;
        next.is_active = false;
        Transition {
            effects: vec![TransitionEffect::new(
                AuditAction::SubscriptionExpired,
                json!({ "from": subscription.status, "to": next.status, "at": at }),
            )],
            next,
        }
    }

    pub fn set_cancel_at_period_end(
        &self,
        subscription: &SubscriptionEntity,
        cancel_at_period_end: bool,
    ) -> BillingResult<Transition> {
        if !subscription.status.is_live() {
            return Err(invalid(subscription, "update cancelAtPeriodEnd", "subscription is not live"));
        }
        if subscription.cancel_at_period_end == cancel_at_period_end {
            return Ok(Transition::unchanged(subscription));
        }
        let mut next = subscription.clone();
        next.cancel_at_period_end = cancel_at_period_end;
        Ok(Transition {
            next,
            effects: vec![TransitionEffect::new(
                AuditAction::CancelAtPeriodEndUpdated,
                json!({ "cancelAtPeriodEnd": cancel_at_period_end }),
            )],
        })
    }

    /// Substitutes the plan of a trialing or active subscription. An upgrade
    /// out of a trial also converts it to paid.
    pub fn change_plan(
        &self,
        catalog: &PlanCatalog,
        subscription: &SubscriptionEntity,
        target: &PlanEntity,
        seat_limit: Option<i32>,
        _at: DateTime<Utc>,
    ) -> BillingResult<Transition> {
        let attempted = format!("change plan to {}", target.id);
        if !matches!(subscription.status, SubscriptionStatus::Active | SubscriptionStatus::Trialing) {
            return Err(invalid(subscription, attempted, "plan changes need an active or trialing subscription"));
        }
        if target.id == subscription.plan_id {
            return Err(invalid(subscription, attempted, "subscription is already on this plan"));
        }
        let current = catalog.get(&subscription.plan_id)?;
        let owner_type = subscription.owner.owner_type();
        catalog.ensure_applicable(target, owner_type)?;

        let new_limit = match (owner_type, seat_limit) {
            (OwnerType::Individual, _) => subscription.seat_limit,
            (OwnerType::Organization, Some(limit)) => {
                catalog.ensure_seat_range(target, limit)?;
                limit
            }
            (OwnerType::Organization, None) => {
                let floor = subscription.seat_limit.max(target.min_seats);
                target.max_seats.map_or(floor, |max_seats| floor.min(max_seats))
            }
        };
        if subscription.used_seats > new_limit {
            return Err(invalid(
                subscription,
                attempted,
                format!("{} seats in use exceed the {new_limit} seats of {}", subscription.used_seats, target.id),
            ));
        }

        let comparison = catalog.compare(&current, target);
        let action = match comparison {
            PlanComparison::Upgrade => AuditAction::PlanUpgraded,
            PlanComparison::Downgrade => AuditAction::PlanDowngraded,
            PlanComparison::SameTier if target.version > current.version => AuditAction::PlanUpgraded,
            PlanComparison::SameTier => AuditAction::PlanDowngraded,
        };

        let mut next = subscription.clone();
        next.plan_id = target.id.clone();
        next.seat_limit = new_limit;

        let mut effects = Vec::new();
        if subscription.status == SubscriptionStatus::Trialing && comparison == PlanComparison::Upgrade {
            next.status = SubscriptionStatus::Active;
            effects.push(TransitionEffect::new(
                AuditAction::TrialToPaidUpgrade,
                status_detail(subscription.status, next.status),
            ));
        }
        effects.push(TransitionEffect::new(
            action,
            json!({ "fromPlan": current.id, "toPlan": target.id, "seatLimit": new_limit }),
        ));

        Ok(Transition { next, effects })
    }

    fn activate(&self, subscription: &SubscriptionEntity, action: AuditAction) -> Transition {
        let mut next = subscription.clone();
        next.status = SubscriptionStatus::Active;
        Transition {
            effects: vec![TransitionEffect::new(action, status_detail(subscription.status, next.status))],
            next,
        }
    }

    fn renew(
        &self,
        subscription: &SubscriptionEntity,
        period_start: Option<DateTime<Utc>>,
        period_end: DateTime<Utc>,
    ) -> BillingResult<Transition> {
        if period_end <= subscription.current_period_end {
            return Ok(Transition::unchanged(subscription));
        }
        let period_start = period_start.unwrap_or(subscription.current_period_end);
        if period_end <= period_start {
            return Err(BillingError::Validation("period end must be after period start".to_string()));
        }
        let mut next = subscription.clone();
        next.current_period_start = period_start;
        next.current_period_end = period_end;
        Ok(Transition {
            next,
            effects: vec![TransitionEffect::new(
                AuditAction::PeriodRenewed,
                json!({ "periodStart": period_start, "periodEnd": period_end }),
            )],
        })
    }

    fn provider_delete(
        &self,
        subscription: &SubscriptionEntity,
        payload: &SubscriptionDeletedPayload,
        at: DateTime<Utc>,
    ) -> BillingResult<Transition> {
        if subscription.status == SubscriptionStatus::Canceled {
            return Ok(Transition::unchanged(subscription));
        }
        self.cancel(subscription, payload.canceled_at.unwrap_or(at))
    }

    fn provider_update(
        &self,
        catalog: &PlanCatalog,
        subscription: &SubscriptionEntity,
        payload: &SubscriptionUpdatedPayload,
        at: DateTime<Utc>,
    ) -> BillingResult<Transition> {
        if payload.is_empty() {
            return Ok(Transition::unchanged(subscription));
        }
        let mut transition = Transition::unchanged(subscription);

        if let Some(plan) = &payload.plan {
            let target = catalog.resolve(plan)?;
            if target.id != transition.next.plan_id {
                let change = self.change_plan(catalog, &transition.next, &target, payload.seat_limit, at)?;
                transition = transition.then(change);
            }
        }
        if let Some(seat_limit) = payload.seat_limit {
            if seat_limit != transition.next.seat_limit {
                let plan = catalog.get(&transition.next.plan_id)?;
                let resize = seat_allocator::resize_limit(&transition.next, &plan, seat_limit)?;
                transition = transition.then(resize);
            }
        }
        if let Some(auto_add_seats) = payload.auto_add_seats {
            if auto_add_seats != transition.next.auto_add_seats {
                if transition.next.owner.owner_type() == OwnerType::Individual {
                    return Err(BillingError::Validation(
                        "autoAddSeats only applies to organization subscriptions".to_string(),
                    ));
                }
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
        if let Some(cancel_at_period_end) = payload.cancel_at_period_end {
            let update = self.set_cancel_at_period_end(&transition.next, cancel_at_period_end)?;
            transition = transition.then(update);
        }
        if let Some(period_end) = payload.current_period_end {
            let renewal = self.renew(&transition.next, payload.current_period_start, period_end)?;
            transition = transition.then(renewal);
        }
        if let Some(status) = payload.status {
            let moved = self.transition_to(&transition.next, status, at)?;
            transition = transition.then(moved);
        }

        Ok(transition)
    }

    /// Moves to `target` along one of the allowed edges.
    pub fn transition_to(
        &self,
        subscription: &SubscriptionEntity,
        target: SubscriptionStatus,
        at: DateTime<Utc>,
    ) -> BillingResult<Transition> {
        use SubscriptionStatus::*;

        match (subscription.status, target) {
            (from, to) if from == to => Ok(Transition::unchanged(subscription)),
            (Trialing, Active) => Ok(self.activate(subscription, AuditAction::TrialToPaidUpgrade)),
            (PastDue, Active) => Ok(self.activate(subscription, AuditAction::PaymentRecovered)),
            (Active, PastDue) => self.payment_failed(subscription, &PaymentPayload::default()),
            (Trialing | Active | PastDue, Canceled) => self.cancel(subscription, at),
            (Canceled, Active) => self.reactivate(subscription, at),
            (Canceled, Expired) if subscription.expires_at.is_some_and(|expires_at| expires_at <= at) => {
                Ok(self.expire(subscription, at))
            }
            (_, to) => Err(invalid(subscription, format!("move to {to}"), "transition is not allowed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn machine() -> SubscriptionStateMachine {
        SubscriptionStateMachine::new(Duration::days(30))
    }

    fn create(catalog: &PlanCatalog, owner: SubscriptionOwner, plan: &str, seat_limit: Option<i32>) -> SubscriptionEntity {
        let plan = catalog.resolve(plan).unwrap();
        machine()
            .create(
                catalog,
                &plan,
                NewSubscription {
                    owner,
                    external_ref: None,
                    seat_limit,
                    auto_add_seats: false,
                    status: None,
                    trial_ends_at: None,
                    current_period_start: None,
                    current_period_end: None,
                },
                t0(),
            )
            .unwrap()
            .next
    }

    fn scheduled(subscription: &SubscriptionEntity, action: ChangeAction, to_tier: &str, at: DateTime<Utc>) -> SubscriptionChangeEntity {
        SubscriptionChangeEntity {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            action,
            from_tier: "pro".to_string(),
            to_tier: to_tier.to_string(),
            seat_limit: None,
            effective_date: at,
            status: ChangeStatus::Scheduled,
            requested_by: None,
            failure_reason: None,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    #[test]
    fn plan_with_trial_starts_trialing() {
        let catalog = PlanCatalog::builtin();
        let subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "basic", None);
        assert_eq!(subscription.status, SubscriptionStatus::Trialing);
        assert_eq!(subscription.trial_ends_at, Some(t0() + Duration::days(14)));
        assert_eq!(subscription.seat_limit, 1);
        assert_eq!(subscription.used_seats, 1);
    }

    #[test]
    fn organization_subscription_needs_organization_plan() {
        let catalog = PlanCatalog::builtin();
        let plan = catalog.resolve("basic").unwrap();
        let err = machine()
            .create(
                &catalog,
                &plan,
                NewSubscription {
                    owner: SubscriptionOwner::Organization(Uuid::new_v4()),
                    external_ref: None,
                    seat_limit: Some(3),
                    auto_add_seats: false,
                    status: None,
                    trial_ends_at: None,
                    current_period_start: None,
                    current_period_end: None,
                },
                t0(),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[test]
    fn trial_converts_on_payment() {
        let catalog = PlanCatalog::builtin();
        let subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "basic", None);

        let transition = machine().payment_succeeded(&subscription, &PaymentPayload::default()).unwrap();
        assert_eq!(transition.next.status, SubscriptionStatus::Active);
        let actions: Vec<AuditAction> = transition.effects.iter().map(|effect| effect.action).collect();
        assert_eq!(actions, vec![AuditAction::TrialToPaidUpgrade]);
    }

    #[test]
    fn payment_cycle_between_active_and_past_due() {
        let machine = machine();
        let catalog = PlanCatalog::builtin();
        let mut subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "free", None);
        assert_eq!(subscription.status, SubscriptionStatus::Active);

        subscription = machine.payment_failed(&subscription, &PaymentPayload::default()).unwrap().next;
        assert_eq!(subscription.status, SubscriptionStatus::PastDue);

        let again = machine.payment_failed(&subscription, &PaymentPayload::default()).unwrap();
        assert!(again.is_noop());

        let recovered = machine.payment_succeeded(&subscription, &PaymentPayload::default()).unwrap();
        assert_eq!(recovered.next.status, SubscriptionStatus::Active);
        assert_eq!(recovered.effects[0].action, AuditAction::PaymentRecovered);
    }

    #[test]
    fn payment_on_active_with_new_period_renews() {
        let catalog = PlanCatalog::builtin();
        let mut subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "free", None);
        subscription.status = SubscriptionStatus::Active;
        let period_end = subscription.current_period_end + Duration::days(30);

        let transition = machine()
            .payment_succeeded(
                &subscription,
                &PaymentPayload {
                    period_end: Some(period_end),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(transition.next.current_period_start, subscription.current_period_end);
        assert_eq!(transition.next.current_period_end, period_end);
        assert_eq!(transition.effects[0].action, AuditAction::PeriodRenewed);
    }

    #[test]
    fn cancel_sets_reactivation_window() {
        let catalog = PlanCatalog::builtin();
        let subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "free", None);
        let canceled = machine().cancel(&subscription, t0()).unwrap().next;

        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert_eq!(canceled.expires_at, Some(subscription.current_period_end + Duration::days(30)));
        assert!(canceled.is_active);

        let reactivated = machine().reactivate(&canceled, t0() + Duration::days(1)).unwrap().next;
        assert_eq!(reactivated.status, SubscriptionStatus::Active);
        assert_eq!(reactivated.expires_at, None);

        let late = canceled.expires_at.unwrap() + Duration::seconds(1);
        assert!(matches!(machine().reactivate(&canceled, late), Err(BillingError::Conflict { .. })));
    }

    #[test]
    fn invalid_edges_conflict() {
        let catalog = PlanCatalog::builtin();
        let subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "basic", None);
        assert!(matches!(
            machine().payment_failed(&subscription, &PaymentPayload::default()),
            Err(BillingError::Conflict { .. })
        ));
        assert!(matches!(
            machine().transition_to(&subscription, SubscriptionStatus::Expired, t0()),
            Err(BillingError::Conflict { .. })
        ));
        assert!(matches!(
            machine().reactivate(&subscription, t0()),
            Err(BillingError::Conflict { .. })
        ));
    }

    #[test]
    fn trial_upgrade_converts_to_paid() {
        let catalog = PlanCatalog::builtin();
        let subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "basic", None);
        let pro = catalog.resolve("pro").unwrap();

        let transition = machine().change_plan(&catalog, &subscription, &pro, None, t0()).unwrap();
        assert_eq!(transition.next.plan_id, "pro-v1");
        assert_eq!(transition.next.status, SubscriptionStatus::Active);
        let actions: Vec<AuditAction> = transition.effects.iter().map(|effect| effect.action).collect();
        assert_eq!(actions, vec![AuditAction::TrialToPaidUpgrade, AuditAction::PlanUpgraded]);
    }

    #[test]
    fn downgrade_below_used_seats_conflicts() {
        let catalog = PlanCatalog::builtin();
        let mut subscription = create(&catalog, SubscriptionOwner::Organization(Uuid::new_v4()), "team", Some(40));
        subscription.used_seats = 30;
        let pro = catalog.resolve("pro").unwrap();

        let err = machine().change_plan(&catalog, &subscription, &pro, None, t0()).unwrap_err();
        assert!(matches!(err, BillingError::Conflict { .. }));
    }

    #[test]
    fn settle_applies_due_downgrade_only_after_effective_date() {
        let catalog = PlanCatalog::builtin();
        let mut subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "pro", None);
        subscription.status = SubscriptionStatus::Active;
        let change = scheduled(&subscription, ChangeAction::Downgrade, "basic", subscription.current_period_end);

        let early = machine().settle(&catalog, &subscription, &[change.clone()], t0() + Duration::days(1));
        assert!(early.is_noop());
        assert_eq!(early.subscription.plan_id, "pro-v1");

        let late = machine().settle(&catalog, &subscription, &[change], subscription.current_period_end);
        assert_eq!(late.subscription.plan_id, "basic-v1");
        assert_eq!(late.changes[0].status, ChangeStatus::Applied);
        assert_eq!(late.change_writes.len(), 1);
    }

    #[test]
    fn settle_cancels_at_period_end_then_expires() {
        let catalog = PlanCatalog::builtin();
        let mut subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "free", None);
        subscription.cancel_at_period_end = true;
        let period_end = subscription.current_period_end;

        let canceled = machine().settle(&catalog, &subscription, &[], period_end + Duration::hours(1));
        assert_eq!(canceled.subscription.status, SubscriptionStatus::Canceled);
        assert_eq!(canceled.subscription.canceled_at, Some(period_end));

        let expired = machine().settle(&catalog, &subscription, &[], period_end + Duration::days(31));
        assert_eq!(expired.subscription.status, SubscriptionStatus::Expired);
        assert!(!expired.subscription.is_active);
        let actions: Vec<AuditAction> = expired.effects.iter().map(|effect| effect.action).collect();
        assert_eq!(actions, vec![AuditAction::SubscriptionCanceled, AuditAction::SubscriptionExpired]);
    }

    #[test]
    fn settle_fails_due_change_on_canceled_subscription() {
        let catalog = PlanCatalog::builtin();
        let subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "pro", None);
        let canceled = machine().cancel(&subscription, t0()).unwrap().next;
        let change = scheduled(&canceled, ChangeAction::Downgrade, "basic", t0() + Duration::days(2));

        let settled = machine().settle(&catalog, &canceled, &[change], t0() + Duration::days(3));
        assert_eq!(settled.changes[0].status, ChangeStatus::Failed);
        assert_eq!(settled.effects[0].action, AuditAction::ChangeFailed);
        assert_eq!(settled.subscription.plan_id, "pro-v1");
    }

    #[test]
    fn provider_update_applies_fields_in_order() {
        let catalog = PlanCatalog::builtin();
        let mut subscription = create(&catalog, SubscriptionOwner::Organization(Uuid::new_v4()), "team", Some(5));
        subscription.status = SubscriptionStatus::Active;

        let payload = SubscriptionUpdatedPayload {
            seat_limit: Some(8),
            cancel_at_period_end: Some(true),
            ..Default::default()
        };
        let transition = machine()
            .apply_event(&catalog, &subscription, &BillingEventKind::SubscriptionUpdated(payload), t0())
            .unwrap();
        assert_eq!(transition.next.seat_limit, 8);
        assert!(transition.next.cancel_at_period_end);
        assert_eq!(transition.effects.len(), 2);
    }

    #[test]
    fn expired_absorbs_every_status_change() {
        let catalog = PlanCatalog::builtin();
        let subscription = create(&catalog, SubscriptionOwner::User(Uuid::new_v4()), "free", None);
        let canceled = machine().cancel(&subscription, t0()).unwrap().next;
        let expired = machine().expire(&canceled, t0());

        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
        ] {
            assert!(machine().transition_to(&expired.next, status, t0()).is_err());
        }
        assert!(machine().payment_succeeded(&expired.next, &PaymentPayload::default()).is_err());
    }
}
