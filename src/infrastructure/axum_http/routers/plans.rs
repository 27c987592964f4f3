use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use crate::{
    application::usercases::billing_dispatcher::BillingDispatcher,
    domain::{
        repositories::{
            audit_sink::AuditSink, billing_portal::BillingPortalGateway, billing_store::BillingStore,
        },
        value_objects::{enums::owner_types::OwnerType, subscriptions::PlanDto},
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlansQuery {
    #[serde(default)]
    pub owner_type: Option<OwnerType>,
}

pub fn routes<S, A, P>(dispatcher: Arc<BillingDispatcher<S, A, P>>) -> Router
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(list_plans))
        .with_state(dispatcher)
}

/// Current offered version of each tier, optionally filtered by owner type.
pub async fn list_plans<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    Query(query): Query<PlansQuery>,
) -> impl IntoResponse
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    let plans: Vec<PlanDto> = dispatcher
        .catalog()
        .list(query.owner_type)
        .iter()
        .map(PlanDto::from)
        .collect();
    Json(plans)
}
