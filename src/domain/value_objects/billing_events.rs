use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::domain::{
    errors::BillingError,
    value_objects::{
        enums::{
            audit_actions::AuditAction, event_types::BillingEventType,
            subscription_statuses::SubscriptionStatus,
        },
        subscription_owners::SubscriptionOwner,
    },
};

/// Normalized provider event as delivered by the webhook transport. The
/// signature has already been verified upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundBillingEvent {
    pub external_event_id: String,
    #[serde(rename = "type")]
    pub event_type: BillingEventType,
    pub subject_reference: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub provider_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingEvent {
    pub external_event_id: String,
    pub subject_reference: String,
    pub provider_timestamp: DateTime<Utc>,
    pub kind: BillingEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BillingEventKind {
    SubscriptionCreated(SubscriptionCreatedPayload),
    SubscriptionUpdated(SubscriptionUpdatedPayload),
    SubscriptionDeleted(SubscriptionDeletedPayload),
    PaymentSucceeded(PaymentPayload),
    PaymentFailed(PaymentPayload),
}

impl BillingEventKind {
    pub fn event_type(&self) -> BillingEventType {
        match self {
            BillingEventKind::SubscriptionCreated(_) => BillingEventType::SubscriptionCreated,
            BillingEventKind::SubscriptionUpdated(_) => BillingEventType::SubscriptionUpdated,
            BillingEventKind::SubscriptionDeleted(_) => BillingEventType::SubscriptionDeleted,
            BillingEventKind::PaymentSucceeded(_) => BillingEventType::PaymentSucceeded,
            BillingEventKind::PaymentFailed(_) => BillingEventType::PaymentFailed,
        }
    }
}

impl BillingEvent {
    pub fn event_type(&self) -> BillingEventType {
        self.kind.event_type()
    }
}

/// First successful checkout. `plan` accepts a versioned plan id or a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCreatedPayload {
    pub owner: SubscriptionOwner,
    pub plan: String,
    #[serde(default)]
    pub seat_limit: Option<i32>,
    #[serde(default)]
    pub auto_add_seats: bool,
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
    #[serde(default)]
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_period_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUpdatedPayload {
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub seat_limit: Option<i32>,
    #[serde(default)]
    pub auto_add_seats: Option<bool>,
    #[serde(default)]
    pub cancel_at_period_end: Option<bool>,
    #[serde(default)]
    pub current_period_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionUpdatedPayload {
    pub fn is_empty(&self) -> bool {
        self == &SubscriptionUpdatedPayload::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDeletedPayload {
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    #[serde(default)]
    pub amount_minor: Option<i64>,
    #[serde(default)]
    pub period_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

fn decode_payload<T: DeserializeOwned>(
    event_type: BillingEventType,
    payload: serde_json::Value,
) -> Result<T, BillingError> {
    let payload = if payload.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        payload
    };
    serde_json::from_value(payload)
        .map_err(|err| BillingError::Validation(format!("invalid {event_type} payload: {err}")))
}

impl TryFrom<InboundBillingEvent> for BillingEvent {
    type Error = BillingError;

    fn try_from(value: InboundBillingEvent) -> Result<Self, Self::Error> {
        if value.external_event_id.trim().is_empty() {
            return Err(BillingError::Validation("externalEventId is required".to_string()));
        }
        if value.subject_reference.trim().is_empty() {
            return Err(BillingError::Validation("subjectReference is required".to_string()));
        }

        let event_type = value.event_type;
        let kind = match event_type {
            BillingEventType::SubscriptionCreated => {
                BillingEventKind::SubscriptionCreated(decode_payload(event_type, value.payload)?)
            }
            BillingEventType::SubscriptionUpdated => {
                BillingEventKind::SubscriptionUpdated(decode_payload(event_type, value.payload)?)
            }
            BillingEventType::SubscriptionDeleted => {
                BillingEventKind::SubscriptionDeleted(decode_payload(event_type, value.payload)?)
            }
            BillingEventType::PaymentSucceeded => {
                BillingEventKind::PaymentSucceeded(decode_payload(event_type, value.payload)?)
            }
            BillingEventType::PaymentFailed => {
                BillingEventKind::PaymentFailed(decode_payload(event_type, value.payload)?)
            }
        };

        Ok(Self {
            external_event_id: value.external_event_id,
            subject_reference: value.subject_reference,
            provider_timestamp: value.provider_timestamp,
            kind,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventDisposition {
    /// At least one transition was committed.
    Applied,
    /// Valid event that did not change state.
    Unchanged,
    /// Older than the last applied event for the subscription.
    Stale,
    /// Target subscription is expired.
    Ignored,
}

/// Outcome recorded in the idempotency ledger and returned to the caller.
/// Replays return the recorded value with `replayed` set. The flag is
/// delivery metadata and is left out of equality, so a replay compares
/// equal to the first delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    pub subscription_id: Option<Uuid>,
    pub disposition: EventDisposition,
    pub status: Option<SubscriptionStatus>,
    #[serde(default)]
    pub transitions: Vec<AuditAction>,
    #[serde(default)]
    pub replayed: bool,
}

impl EventOutcome {
    pub fn new(
        subscription_id: Uuid,
        disposition: EventDisposition,
        status: SubscriptionStatus,
        transitions: Vec<AuditAction>,
    ) -> Self {
        Self {
            subscription_id: Some(subscription_id),
            disposition,
            status: Some(status),
            transitions,
            replayed: false,
        }
    }

    pub fn as_replay(mut self) -> Self {
        self.replayed = true;
        self
    }
}

impl PartialEq for EventOutcome {
    fn eq(&self, other: &Self) -> bool {
        self.subscription_id == other.subscription_id
            && self.disposition == other.disposition
            && self.status == other.status
            && self.transitions == other.transitions
    }
}

impl Eq for EventOutcome {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn inbound(event_type: &str, payload: serde_json::Value) -> InboundBillingEvent {
        serde_json::from_value(json!({
            "externalEventId": "evt_1",
            "type": event_type,
            "subjectReference": "sub_ext_1",
            "payload": payload,
            "providerTimestamp": "2026-03-01T10:00:00Z",
        }))
        .unwrap()
    }

    #[test]
    fn created_event_decodes_owner_and_plan() {
        let organization_id = Uuid::new_v4();
        let event = BillingEvent::try_from(inbound(
            "subscription.created",
            json!({ "owner": { "organizationId": organization_id }, "plan": "team", "seatLimit": 5 }),
        ))
        .unwrap();

        match event.kind {
            BillingEventKind::SubscriptionCreated(payload) => {
                assert_eq!(payload.owner, SubscriptionOwner::Organization(organization_id));
                assert_eq!(payload.plan, "team");
                assert_eq!(payload.seat_limit, Some(5));
                assert!(!payload.auto_add_seats);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn created_event_with_two_owners_is_rejected() {
        let err = BillingEvent::try_from(inbound(
            "subscription.created",
            json!({
                "owner": { "organizationId": Uuid::new_v4(), "userId": Uuid::new_v4() },
                "plan": "team",
            }),
        ))
        .unwrap_err();

        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[test]
    fn payment_event_without_payload_uses_defaults() {
        let event = BillingEvent::try_from(inbound("payment.failed", serde_json::Value::Null)).unwrap();
        assert_eq!(event.event_type(), BillingEventType::PaymentFailed);
        assert_eq!(event.kind, BillingEventKind::PaymentFailed(PaymentPayload::default()));
    }

    #[test]
    fn unknown_event_type_fails_to_parse() {
        let parsed = serde_json::from_value::<InboundBillingEvent>(json!({
            "externalEventId": "evt_1",
            "type": "invoice.created",
            "subjectReference": "sub_ext_1",
            "providerTimestamp": "2026-03-01T10:00:00Z",
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn blank_event_id_is_rejected() {
        let mut raw = inbound("payment.succeeded", json!({}));
        raw.external_event_id = "  ".to_string();
        assert!(matches!(BillingEvent::try_from(raw), Err(BillingError::Validation(_))));
    }

    #[test]
    fn replay_compares_equal_to_the_first_delivery() {
        let first = EventOutcome::new(
            Uuid::new_v4(),
            EventDisposition::Applied,
            SubscriptionStatus::PastDue,
            vec![AuditAction::PaymentFailed],
        );
        let replay = first.clone().as_replay();

        assert!(replay.replayed);
        assert_eq!(replay, first);
        assert_ne!(
            replay,
            EventOutcome::new(
                first.subscription_id.unwrap(),
                EventDisposition::Unchanged,
                SubscriptionStatus::PastDue,
                Vec::new(),
            )
        );
        assert_eq!(serde_json::to_value(&replay).unwrap()["replayed"], json!(true));
    }
}
