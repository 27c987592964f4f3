use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
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
        value_objects::management::{CreateSubscriptionRequest, ManageSubscriptionRequest, StatusQuery},
    },
    infrastructure::axum_http::{auth::AuthUser, error_responses::AppError},
};

pub fn routes<S, A, P>(dispatcher: Arc<BillingDispatcher<S, A, P>>) -> Router
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/", post(create_subscription))
        .route("/manage", post(request_change).get(get_status))
        .with_state(dispatcher)
}

pub async fn create_subscription<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    auth: AuthUser,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Response
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    match dispatcher.create_subscription(&auth.principal(), request).await {
        Ok(snapshot) => (StatusCode::CREATED, Json(snapshot)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn request_change<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    auth: AuthUser,
    Json(request): Json<ManageSubscriptionRequest>,
) -> Response
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    match dispatcher.request_change(&auth.principal(), request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn get_status<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    auth: AuthUser,
    Query(query): Query<StatusQuery>,
) -> Response
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    match dispatcher.get_status(&auth.principal(), query.organization_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
