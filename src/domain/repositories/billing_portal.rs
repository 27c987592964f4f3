use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::management::BillingPortalSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingPortalRequest {
    pub subscription_id: Uuid,
    pub external_ref: Option<String>,
    pub organization_id: Uuid,
    pub requested_by: Uuid,
    pub return_url: String,
}

/// Hosted billing portal of the payment provider.
#[automock]
#[async_trait]
pub trait BillingPortalGateway {
    async fn create_session(&self, request: BillingPortalRequest) -> anyhow::Result<BillingPortalSession>;
}
