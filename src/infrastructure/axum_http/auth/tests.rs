use axum::http::Request;
use jsonwebtoken::{EncodingKey, Header, encode};

use super::*;

const SECRET: &str = "supersecretjwtsecretforunittesting123";

fn sign(claims: &BillingClaims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn claims(exp: usize) -> BillingClaims {
    BillingClaims {
        sub: "123e4567-e89b-12d3-a456-426614174000".to_string(),
        org_id: Some("0b8f4a52-1c1d-4a8e-9c55-3d1f2b6c7e90".to_string()),
        org_role: Some("billing_manager".to_string()),
        exp,
    }
}

async fn extract(authorization: Option<String>) -> Result<AuthUser, AppError> {
    let mut builder = Request::builder()
        .uri("/api/v1/subscriptions/manage")
        .extension(Arc::new(AuthKeys::new(SECRET)));
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    let (mut parts, _) = builder.body(()).unwrap().into_parts();
    AuthUser::from_request_parts(&mut parts, &()).await
}

#[test]
fn test_validate_jwt_success() {
    let token = sign(&claims(9999999999), SECRET);

    let decoded = validate_jwt(&token, &AuthKeys::new(SECRET)).expect("Valid token should pass");
    assert_eq!(decoded.sub, "123e4567-e89b-12d3-a456-426614174000");
    assert_eq!(decoded.org_role.as_deref(), Some("billing_manager"));
}

#[test]
fn test_validate_jwt_expired() {
    let token = sign(&claims(1), SECRET);
    assert!(validate_jwt(&token, &AuthKeys::new(SECRET)).is_err());
}

#[test]
fn test_validate_jwt_invalid_signature() {
    let token = sign(&claims(9999999999), "wrongsecret");
    assert!(validate_jwt(&token, &AuthKeys::new(SECRET)).is_err());
}

#[tokio::test]
async fn bearer_token_becomes_principal() {
    let token = sign(&claims(9999999999), SECRET);

    let user = extract(Some(format!("Bearer {token}"))).await.unwrap();
    let principal = user.principal();

    assert_eq!(principal.user_id.to_string(), "123e4567-e89b-12d3-a456-426614174000");
    assert_eq!(
        principal.organization_id.map(|id| id.to_string()).as_deref(),
        Some("0b8f4a52-1c1d-4a8e-9c55-3d1f2b6c7e90")
    );
    assert_eq!(principal.role_claim, Some(OrganizationRole::BillingManager));
}

#[tokio::test]
async fn unknown_role_claim_is_dropped() {
    let mut raw = claims(9999999999);
    raw.org_role = Some("superuser".to_string());
    let token = sign(&raw, SECRET);

    let user = extract(Some(format!("Bearer {token}"))).await.unwrap();
    assert_eq!(user.org_role, None);
}

#[tokio::test]
async fn missing_or_malformed_header_is_unauthorized() {
    assert!(matches!(extract(None).await, Err(AppError::Unauthorized(_))));
    assert!(matches!(
        extract(Some("Token abc".to_string())).await,
        Err(AppError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn non_uuid_subject_is_unauthorized() {
    let mut raw = claims(9999999999);
    raw.sub = "service-account".to_string();
    let token = sign(&raw, SECRET);

    assert!(matches!(
        extract(Some(format!("Bearer {token}"))).await,
        Err(AppError::Unauthorized(_))
    ));
}
