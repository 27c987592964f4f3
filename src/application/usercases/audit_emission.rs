use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    entities::{audit_logs::AuditRecord, subscriptions::SubscriptionEntity},
    repositories::audit_sink::AuditSink,
    value_objects::transitions::TransitionEffect,
};

/// Context shared by every record produced by one committed operation.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub actor_user_id: Option<Uuid>,
    pub external_event_id: Option<String>,
    pub change_id: Option<Uuid>,
}

pub fn build_records(
    subscription: &SubscriptionEntity,
    effects: &[TransitionEffect],
    context: &AuditContext,
    occurred_at: DateTime<Utc>,
) -> Vec<AuditRecord> {
    effects
        .iter()
        .map(|effect| AuditRecord {
            subscription_id: Some(subscription.id),
            organization_id: subscription.owner.organization_id(),
            actor_user_id: context.actor_user_id,
            external_event_id: context.external_event_id.clone(),
            change_id: context.change_id,
            detail: effect.detail.clone(),
            ..AuditRecord::new(effect.action, occurred_at)
        })
        .collect()
}

/// Best-effort writer: runs after commit, so a failing sink is logged and
/// never turned into an error for the caller.
pub struct AuditEmitter<A>
where
    A: AuditSink + Send + Sync + 'static,
{
    sink: Arc<A>,
    timeout: Duration,
}

impl<A> AuditEmitter<A>
where
    A: AuditSink + Send + Sync + 'static,
{
    pub fn new(sink: Arc<A>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    pub async fn emit(&self, records: Vec<AuditRecord>) {
        for record in records {
            let action = record.action;
            let subscription_id = record.subscription_id;
            match tokio::time::timeout(self.timeout, self.sink.record(record)).await {
                Ok(Ok(())) => {
                    debug!(%action, ?subscription_id, "audit_emission: record written");
                }
                Ok(Err(err)) => {
                    warn!(
                        %action,
                        ?subscription_id,
                        sink_error = ?err,
                        "audit_emission: failed to write audit record"
                    );
                }
                Err(_) => {
                    warn!(
                        %action,
                        ?subscription_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "audit_emission: audit sink timed out"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use mockall::Sequence;

    use super::*;
    use crate::domain::{
        repositories::audit_sink::MockAuditSink,
        value_objects::enums::audit_actions::AuditAction,
    };

    fn record(action: AuditAction) -> AuditRecord {
        AuditRecord::new(action, Utc::now())
    }

    #[tokio::test]
    async fn failing_sink_does_not_stop_later_records() {
        let mut sink = MockAuditSink::new();
        let mut sequence = Sequence::new();
        sink.expect_record()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Err(anyhow!("sink offline")));
        sink.expect_record()
            .withf(|record| record.action == AuditAction::PaymentRecovered)
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));

        let emitter = AuditEmitter::new(Arc::new(sink), Duration::from_millis(100));
        emitter
            .emit(vec![record(AuditAction::PaymentFailed), record(AuditAction::PaymentRecovered)])
            .await;
    }

    #[test]
    fn records_carry_subscription_context() {
        let organization_id = Uuid::new_v4();
        let now = Utc::now();
        let subscription = SubscriptionEntity {
            id: Uuid::new_v4(),
            external_ref: None,
            owner: crate::domain::value_objects::subscription_owners::SubscriptionOwner::Organization(organization_id),
            status: Default::default(),
            plan_id: "team-v1".to_string(),
            seat_limit: 5,
            used_seats: 1,
            auto_add_seats: false,
            trial_ends_at: None,
            current_period_start: now,
            current_period_end: now,
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
        let context = AuditContext {
            external_event_id: Some("evt_9".to_string()),
            ..Default::default()
        };

        let records = build_records(
            &subscription,
            &[TransitionEffect::new(AuditAction::SeatsAdded, serde_json::json!({ "seats": 1 }))],
            &context,
            now,
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].organization_id, Some(organization_id));
        assert_eq!(records[0].external_event_id.as_deref(), Some("evt_9"));
        assert_eq!(records[0].action, AuditAction::SeatsAdded);
    }
}
