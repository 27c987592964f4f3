use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::{
        errors::StoreError,
        value_objects::{billing_events::EventOutcome, enums::event_types::BillingEventType},
    },
    infrastructure::postgres::schema::processed_events,
};

/// Idempotency ledger entry keyed by the provider's event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEventEntity {
    pub external_event_id: String,
    pub event_type: BillingEventType,
    pub subscription_id: Option<Uuid>,
    pub outcome: EventOutcome,
    pub provider_timestamp: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable, Insertable)]
#[diesel(table_name = processed_events, primary_key(external_event_id))]
pub struct ProcessedEventRow {
    pub external_event_id: String,
    pub event_type: String,
    pub subscription_id: Option<Uuid>,
    pub outcome: serde_json::Value,
    pub provider_timestamp: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

impl TryFrom<ProcessedEventRow> for ProcessedEventEntity {
    type Error = StoreError;

    fn try_from(value: ProcessedEventRow) -> Result<Self, Self::Error> {
        let event_type = BillingEventType::from_str(&value.event_type).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "processed event {} has unknown type {}",
                value.external_event_id, value.event_type
            ))
        })?;
        let outcome = serde_json::from_value(value.outcome).map_err(|err| {
            StoreError::Corrupt(format!(
                "processed event {} has invalid outcome: {err}",
                value.external_event_id
            ))
        })?;

        Ok(Self {
            external_event_id: value.external_event_id,
            event_type,
            subscription_id: value.subscription_id,
            outcome,
            provider_timestamp: value.provider_timestamp,
            processed_at: value.processed_at,
        })
    }
}

impl TryFrom<&ProcessedEventEntity> for ProcessedEventRow {
    type Error = StoreError;

    fn try_from(value: &ProcessedEventEntity) -> Result<Self, Self::Error> {
        let outcome = serde_json::to_value(&value.outcome)
            .map_err(|err| StoreError::Corrupt(format!("outcome is not serializable: {err}")))?;

        Ok(Self {
            external_event_id: value.external_event_id.clone(),
            event_type: value.event_type.as_str().to_string(),
            subscription_id: value.subscription_id,
            outcome,
            provider_timestamp: value.provider_timestamp,
            processed_at: value.processed_at,
        })
    }
}
