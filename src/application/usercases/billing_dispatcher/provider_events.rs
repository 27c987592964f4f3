use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{BillingDispatcher, subscription_write};
use crate::{
    application::usercases::{
        audit_emission::AuditContext, subscription_state_machine::NewSubscription,
    },
    domain::{
        entities::{
            audit_logs::AuditRecord, processed_events::ProcessedEventEntity,
            subscriptions::SubscriptionEntity,
        },
        errors::{BillingError, BillingResult, StoreError},
        repositories::{
            audit_sink::AuditSink,
            billing_portal::BillingPortalGateway,
            billing_store::{BillingCommit, BillingStore, SubscriptionWrite},
        },
        value_objects::billing_events::{
            BillingEvent, BillingEventKind, EventDisposition, EventOutcome, InboundBillingEvent,
            SubscriptionCreatedPayload,
        },
    },
};

struct PreparedEvent {
    commit: BillingCommit,
    records: Vec<AuditRecord>,
    outcome: EventOutcome,
}

impl<S, A, P> BillingDispatcher<S, A, P>
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    pub async fn handle_inbound(&self, event: InboundBillingEvent) -> BillingResult<EventOutcome> {
        self.handle(BillingEvent::try_from(event)?).await
    }

    /// Applies one provider event at most once. A replayed event id returns
    /// the outcome recorded the first time, with no side effects.
    pub async fn handle(&self, event: BillingEvent) -> BillingResult<EventOutcome> {
        let event_id = event.external_event_id.clone();
        let event_type = event.event_type();
        info!(
            external_event_id = %event_id,
            %event_type,
            subject_reference = %event.subject_reference,
            "billing_dispatcher: handling provider event"
        );

        if let Some(outcome) = self.recorded_outcome(&event_id).await? {
            return Ok(outcome);
        }

        let lock_key = match self
            .store
            .find_subscription_by_external_ref(&event.subject_reference)
            .await?
        {
            Some(subscription) => subscription.id.to_string(),
            None if matches!(event.kind, BillingEventKind::SubscriptionCreated(_)) => {
                format!("external:{}", event.subject_reference)
            }
            None => {
                warn!(
                    external_event_id = %event_id,
                    subject_reference = %event.subject_reference,
                    "billing_dispatcher: event references unknown subscription"
                );
                return Err(BillingError::NotFound(format!(
                    "subscription {}",
                    event.subject_reference
                )));
            }
        };

        let guard = self.locks.acquire(&lock_key).await?;
        if let Some(outcome) = self.recorded_outcome(&event_id).await? {
            return Ok(outcome);
        }

        let now = self.clock.now();
        let existing = self
            .store
            .find_subscription_by_external_ref(&event.subject_reference)
            .await?;
        let prepared = match (existing, &event.kind) {
            (Some(subscription), _) => self.prepare_existing(&event, subscription, now).await,
            (None, BillingEventKind::SubscriptionCreated(payload)) => {
                self.prepare_created(&event, payload, now).await
            }
            (None, _) => Err(BillingError::NotFound(format!(
                "subscription {}",
                event.subject_reference
            ))),
        }
        .inspect_err(|err| {
            warn!(
                external_event_id = %event_id,
                %event_type,
                error = %err,
                "billing_dispatcher: provider event rejected"
            );
        })?;

        match self.store.commit(prepared.commit).await {
            Ok(()) => {}
            Err(StoreError::DuplicateEvent(_)) => {
                drop(guard);
                info!(
                    external_event_id = %event_id,
                    "billing_dispatcher: event committed concurrently, returning recorded outcome"
                );
                return self.recorded_outcome(&event_id).await?.ok_or_else(|| {
                    BillingError::TransientStore(format!("event {event_id} is recorded but unreadable"))
                });
            }
            Err(err) => {
                warn!(external_event_id = %event_id, db_error = ?err, "billing_dispatcher: event commit failed");
                return Err(err.into());
            }
        }
        drop(guard);

        self.audit.emit(prepared.records).await;
        info!(
            external_event_id = %event_id,
            %event_type,
            disposition = ?prepared.outcome.disposition,
            status = ?prepared.outcome.status,
            "billing_dispatcher: provider event processed"
        );
        Ok(prepared.outcome)
    }

    async fn recorded_outcome(&self, external_event_id: &str) -> BillingResult<Option<EventOutcome>> {
        let recorded = self.store.find_processed_event(external_event_id).await?;
        Ok(recorded.map(|processed| {
            info!(
                %external_event_id,
                processed_at = %processed.processed_at,
                "billing_dispatcher: event already processed"
            );
            processed.outcome.as_replay()
        }))
    }

    async fn prepare_existing(
        &self,
        event: &BillingEvent,
        original: SubscriptionEntity,
        now: DateTime<Utc>,
    ) -> BillingResult<PreparedEvent> {
        let settlement = self.load_settled(&original, now).await?;
        let mut next = settlement.subscription.clone();
        let mut effects = settlement.effects.clone();

        let disposition = if next.status.is_terminal() {
            info!(
                subscription_id = %next.id,
                external_event_id = %event.external_event_id,
                "billing_dispatcher: subscription expired, event ignored"
            );
            EventDisposition::Ignored
        } else if next
            .last_event_at
            .is_some_and(|last_event_at| event.provider_timestamp < last_event_at)
        {
            info!(
                subscription_id = %next.id,
                external_event_id = %event.external_event_id,
                provider_timestamp = %event.provider_timestamp,
                "billing_dispatcher: stale event recorded without changes"
            );
            EventDisposition::Stale
        } else {
            let transition = self.state_machine.apply_event(
                &self.catalog,
                &next,
                &event.kind,
                event.provider_timestamp,
            )?;
            let disposition = if transition.is_noop() {
                EventDisposition::Unchanged
            } else {
                EventDisposition::Applied
            };
            effects.extend(transition.effects);
            next = transition.next;
            next.last_event_at = Some(event.provider_timestamp);
            disposition
        };

        let outcome = EventOutcome::new(
            next.id,
            disposition,
            next.status,
            effects.iter().map(|effect| effect.action).collect(),
        );
        let context = AuditContext {
            external_event_id: Some(event.external_event_id.clone()),
            ..Default::default()
        };
        let records = self.records(&next, &effects, &context, now);

        Ok(PreparedEvent {
            commit: BillingCommit {
                subscription: subscription_write(&original, next, now),
                changes: settlement.change_writes,
                memberships: Vec::new(),
                processed_event: Some(processed(event, &outcome, now)),
            },
            records,
            outcome,
        })
    }

    /// First checkout for an unknown subscription reference.
    async fn prepare_created(
        &self,
        event: &BillingEvent,
        payload: &SubscriptionCreatedPayload,
        now: DateTime<Utc>,
    ) -> BillingResult<PreparedEvent> {
        let plan = self.catalog.resolve(&payload.plan)?;
        if let Some(existing) = self
            .store
            .find_active_subscription_for_owner(payload.owner)
            .await?
        {
            return Err(BillingError::conflict(
                Some(existing.id),
                "create subscription",
                existing.status.as_str(),
                "owner already has an active subscription",
            ));
        }

        let transition = self.state_machine.create(
            &self.catalog,
            &plan,
            NewSubscription {
                owner: payload.owner,
                external_ref: Some(event.subject_reference.clone()),
                seat_limit: payload.seat_limit,
                auto_add_seats: payload.auto_add_seats,
                status: payload.status,
                trial_ends_at: payload.trial_ends_at,
                current_period_start: payload.current_period_start,
                current_period_end: payload.current_period_end,
            },
            now,
        )?;
        let mut subscription = transition.next;
        subscription.last_event_at = Some(event.provider_timestamp);

        let outcome = EventOutcome::new(
            subscription.id,
            EventDisposition::Applied,
            subscription.status,
            transition.effects.iter().map(|effect| effect.action).collect(),
        );
        let context = AuditContext {
            external_event_id: Some(event.external_event_id.clone()),
            ..Default::default()
        };
        let records = self.records(&subscription, &transition.effects, &context, now);

        Ok(PreparedEvent {
            commit: BillingCommit {
                subscription: Some(SubscriptionWrite::Insert(subscription)),
                processed_event: Some(processed(event, &outcome, now)),
                ..Default::default()
            },
            records,
            outcome,
        })
    }
}

fn processed(event: &BillingEvent, outcome: &EventOutcome, now: DateTime<Utc>) -> ProcessedEventEntity {
    ProcessedEventEntity {
        external_event_id: event.external_event_id.clone(),
        event_type: event.event_type(),
        subscription_id: outcome.subscription_id,
        outcome: outcome.clone(),
        provider_timestamp: event.provider_timestamp,
        processed_at: now,
    }
}
