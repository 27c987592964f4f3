use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{patch, post},
};
use uuid::Uuid;

use crate::{
    application::usercases::billing_dispatcher::BillingDispatcher,
    domain::{
        repositories::{
            audit_sink::AuditSink, billing_portal::BillingPortalGateway, billing_store::BillingStore,
        },
        value_objects::management::{
            ActivateMemberRequest, ChangeMemberRoleRequest, OpenBillingPortalRequest,
            OrganizationSubscriptionAction,
        },
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
        .route("/:organization_id/subscriptions", patch(manage_subscription))
        .route("/:organization_id/members", post(activate_member))
        .route(
            "/:organization_id/members/:user_id",
            patch(change_member_role).delete(remove_member),
        )
        .route("/:organization_id/billing-portal", post(open_billing_portal))
        .with_state(dispatcher)
}

pub async fn manage_subscription<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    auth: AuthUser,
    Path(organization_id): Path<Uuid>,
    Json(action): Json<OrganizationSubscriptionAction>,
) -> Response
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    match dispatcher
        .manage_organization(&auth.principal(), organization_id, action)
        .await
    {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn activate_member<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    auth: AuthUser,
    Path(organization_id): Path<Uuid>,
    Json(request): Json<ActivateMemberRequest>,
) -> Response
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    match dispatcher
        .activate_member(&auth.principal(), organization_id, request)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn change_member_role<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    auth: AuthUser,
    Path((organization_id, user_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<ChangeMemberRoleRequest>,
) -> Response
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    match dispatcher
        .change_member_role(&auth.principal(), organization_id, user_id, request)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn remove_member<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    auth: AuthUser,
    Path((organization_id, user_id)): Path<(Uuid, Uuid)>,
) -> Response
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    match dispatcher
        .remove_member(&auth.principal(), organization_id, user_id)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

pub async fn open_billing_portal<S, A, P>(
    State(dispatcher): State<Arc<BillingDispatcher<S, A, P>>>,
    auth: AuthUser,
    Path(organization_id): Path<Uuid>,
    Json(request): Json<OpenBillingPortalRequest>,
) -> Response
where
    S: BillingStore + Send + Sync + 'static,
    A: AuditSink + Send + Sync + 'static,
    P: BillingPortalGateway + Send + Sync + 'static,
{
    match dispatcher
        .open_billing_portal(&auth.principal(), organization_id, request)
        .await
    {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
