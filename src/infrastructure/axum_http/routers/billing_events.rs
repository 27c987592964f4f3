use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};

use crate::{
    application::usercases::billing_dispatcher::BillingDispatcher,
    domain::{
        repositories::{
            audit_sink::AuditSink, billing_portal::BillingPortalGateway, billing_store::BillingStore,
        },
        value_objects::billing_events::InboundBillingEvent,
    },
    infrastructure::axum_http::error_responses::AppError,
};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT/api/v1/billing/events" \
//     -H "Content-Type: application/json" \
//     -d '{"externalEventId":"evt_1","type":"payment.succeeded","subjectReference":"sub_ext_1","providerTimestamp":"2026-03-01T10:00:00Z","payload":{}}'

pub fn routes<S, A, P>(dispatcher: Arc<BillingDispatcher<S, A, P>>) -> Router
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/events", post(receive_event))
        .with_state(dispatcher)
}

/// Provider deliveries are already verified upstream. Replays answer 200 with
/// the recorded outcome so the provider stops redelivering.
pub async fn receive_event<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    Json(event): Json<InboundBillingEvent>,
) -> Response
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    match dispatcher.handle_inbound(event).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::{
        application::usercases::{
            billing_dispatcher::BillingSettings,
            clock::{Clock, ManualClock},
            plan_catalog::PlanCatalog,
        },
        domain::repositories::billing_portal::MockBillingPortalGateway,
        infrastructure::memory::{audit_sink::InMemoryAuditSink, billing_store::InMemoryBillingStore},
    };

    type Dispatcher = BillingDispatcher<InMemoryBillingStore, InMemoryAuditSink, MockBillingPortalGateway>;

    fn dispatcher() -> Arc<Dispatcher> {
        let clock: Arc<dyn Clock> =
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()));
        Arc::new(BillingDispatcher::new(
            Arc::new(InMemoryBillingStore::new()),
            Arc::new(InMemoryAuditSink::new()),
            Arc::new(MockBillingPortalGateway::new()),
            Arc::new(PlanCatalog::builtin()),
            clock,
            BillingSettings::default(),
        ))
    }

    fn created_event(event_id: &str, reference: &str) -> InboundBillingEvent {
        serde_json::from_value(json!({
            "externalEventId": event_id,
            "type": "subscription.created",
            "subjectReference": reference,
            "providerTimestamp": "2026-03-01T09:00:00Z",
            "payload": { "owner": { "userId": Uuid::new_v4() }, "plan": "pro" },
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn delivered_event_answers_ok_and_replay_answers_ok() {
        let dispatcher = dispatcher();

        let first = receive_event(State(Arc::clone(&dispatcher)), Json(created_event("evt_1", "sub_ext_1"))).await;
        assert_eq!(first.status(), StatusCode::OK);

        let replay = receive_event(State(Arc::clone(&dispatcher)), Json(created_event("evt_1", "sub_ext_1"))).await;
        assert_eq!(replay.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn event_for_unknown_subscription_is_not_found() {
        let event: InboundBillingEvent = serde_json::from_value(json!({
            "externalEventId": "evt_2",
            "type": "payment.failed",
            "subjectReference": "sub_missing",
            "providerTimestamp": "2026-03-01T09:00:00Z",
        }))
        .unwrap();

        let response = receive_event(State(dispatcher()), Json(event)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
