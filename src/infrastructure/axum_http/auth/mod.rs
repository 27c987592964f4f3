use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::value_objects::{enums::organization_roles::OrganizationRole, management::Principal},
    infrastructure::axum_http::error_responses::AppError,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct BillingClaims {
    pub sub: String,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub org_role: Option<String>,
    pub exp: usize,
}

/// HS256 verification key, installed on the router as an `Extension`.
#[derive(Clone)]
pub struct AuthKeys {
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub org_role: Option<OrganizationRole>,
}

impl AuthUser {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            organization_id: self.organization_id,
            role_claim: self.org_role,
        }
    }
}

pub fn validate_jwt(token: &str, keys: &AuthKeys) -> Result<BillingClaims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<BillingClaims>(token, &keys.decoding, &validation)
        .map_err(|e| AppError::Unauthorized(format!("JWT validation failed: {e}")))?;

    Ok(token_data.claims)
}

impl TryFrom<BillingClaims> for AuthUser {
    type Error = AppError;

    fn try_from(claims: BillingClaims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))?;

        let organization_id = claims
            .org_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| AppError::Unauthorized("Invalid organization ID in token".to_string()))?;

        // An unknown role claim is dropped; authorization reads the stored membership.
        let org_role = claims.org_role.as_deref().and_then(OrganizationRole::from_str);

        Ok(AuthUser {
            user_id,
            organization_id,
            org_role,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let keys = parts
            .extensions
            .get::<Arc<AuthKeys>>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("auth keys are not installed")))?;

        let auth_str = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

        let claims = validate_jwt(token, &keys)?;
        AuthUser::try_from(claims)
    }
}

#[cfg(test)]
mod tests;
