use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{
    repositories::billing_portal::{BillingPortalGateway, BillingPortalRequest},
    value_objects::management::BillingPortalSession,
};

/// Creates hosted billing-portal sessions through the provider's HTTP API.
/// Without a configured base URL every request fails, which surfaces as a
/// 502 to the caller.
pub struct PortalClient {
    http: reqwest::Client,
    api_base: Option<String>,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody<'a> {
    subscription_ref: Option<&'a str>,
    subscription_id: Uuid,
    organization_id: Uuid,
    requested_by: Uuid,
    return_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResp {
    url: String,
}

impl PortalClient {
    pub fn new(api_base: Option<String>, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.map(|base| base.trim_end_matches('/').to_string()),
            api_key,
        }
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        error!(
            status = %status,
            provider_request_id = ?request_id,
            response_body = %body,
            context = %context,
            "billing_portal: provider request failed"
        );
        bail!("billing portal request failed: {context} (status {status}, request_id={request_id:?})");
    }
}

#[async_trait]
impl BillingPortalGateway for PortalClient {
    async fn create_session(&self, request: BillingPortalRequest) -> Result<BillingPortalSession> {
        let Some(api_base) = &self.api_base else {
            bail!("billing portal is not configured");
        };

        let resp = self
            .http
            .post(format!("{api_base}/portal/sessions"))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&CreateSessionBody {
                subscription_ref: request.external_ref.as_deref(),
                subscription_id: request.subscription_id,
                organization_id: request.organization_id,
                requested_by: request.requested_by,
                return_url: &request.return_url,
            })
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create portal session").await?;
        let parsed: CreateSessionResp = resp.json().await?;

        info!(
            subscription_id = %request.subscription_id,
            organization_id = %request.organization_id,
            "billing_portal: session created"
        );
        Ok(BillingPortalSession { url: parsed.url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_portal_fails_without_network() {
        let client = PortalClient::new(None, String::new());
        let err = client
            .create_session(BillingPortalRequest {
                subscription_id: Uuid::new_v4(),
                external_ref: None,
                organization_id: Uuid::new_v4(),
                requested_by: Uuid::new_v4(),
                return_url: "https://app.example.com".to_string(),
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base() {
        let client = PortalClient::new(Some("https://billing.example.com/".to_string()), "key".to_string());
        assert_eq!(client.api_base.as_deref(), Some("https://billing.example.com"));
    }
}
