use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
#[cfg(test)]
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use civiclens_common::Role;

use crate::AppState;

#[cfg(test)]
const TOKEN_DURATION_SECS: i64 = 24 * 3600; // 24 hours
const COOKIE_NAME: &str = "auth_token";

/// JWT Claims stored in the token. Identity fields are carried in the token
/// so the API can mirror users into the graph without a separate lookup.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
}

/// JWT service for creating and verifying tokens.
#[derive(Clone)]
pub struct JwtService {
    #[cfg(test)]
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    pub fn new(secret: &str, issuer: String) -> Self {
        Self {
            #[cfg(test)]
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    /// Mint a token in the same shape the identity provider issues. The API
    /// only verifies tokens, so issuance exists solely for the tests below.
    #[cfg(test)]
    pub fn create_token(
        &self,
        user_id: Uuid,
        email: &str,
        first_name: &str,
        last_name: &str,
        role: Role,
    ) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::seconds(TOKEN_DURATION_SECS);

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role: role.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify and decode a JWT token. Returns claims if valid and not expired.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

/// Authenticated caller. Extract this in handlers that require auth.
/// Accepts `Authorization: Bearer <token>` or the auth_token cookie.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// The graph mirror of this caller's identity.
    pub fn record(&self) -> civiclens_common::UserRecord {
        civiclens_common::UserRecord {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).or_else(|| {
            parts
                .headers
                .get(axum::http::header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_auth_cookie)
                .map(str::to_string)
        });

        let Some(token) = token else {
            return Err(unauthorized("Authentication required"));
        };

        let claims = state
            .jwt
            .verify_token(&token)
            .map_err(|_| unauthorized("Invalid or expired token"))?;

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| unauthorized("Invalid token subject"))?;

        Ok(AuthUser {
            id,
            email: claims.email,
            first_name: claims.first_name,
            last_name: claims.last_name,
            role: Role::from_str_loose(&claims.role),
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

/// Parse the auth_token cookie value from a Cookie header string.
fn parse_auth_cookie(header: &str) -> Option<&str> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix(COOKIE_NAME) {
            if let Some(value) = value.strip_prefix('=') {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> JwtService {
        JwtService::new("test-secret-key", "civiclens".to_string())
    }

    #[test]
    fn roundtrip_token() {
        let svc = test_service();
        let id = Uuid::new_v4();
        let token = svc
            .create_token(id, "ada@example.com", "Ada", "Lee", Role::Admin)
            .unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(Role::from_str_loose(&claims.role), Role::Admin);
        assert_eq!(claims.iss, "civiclens");
    }

    #[test]
    fn rejects_invalid_token() {
        let svc = test_service();
        assert!(svc.verify_token("garbage").is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let svc1 = JwtService::new("secret-a", "civiclens".to_string());
        let svc2 = JwtService::new("secret-b", "civiclens".to_string());
        let token = svc1
            .create_token(Uuid::new_v4(), "a@b.c", "A", "B", Role::User)
            .unwrap();
        assert!(svc2.verify_token(&token).is_err());
    }

    #[test]
    fn rejects_wrong_issuer() {
        let svc1 = JwtService::new("secret", "other-service".to_string());
        let svc2 = JwtService::new("secret", "civiclens".to_string());
        let token = svc1
            .create_token(Uuid::new_v4(), "a@b.c", "A", "B", Role::User)
            .unwrap();
        assert!(svc2.verify_token(&token).is_err());
    }

    #[test]
    fn token_expiry_is_24h() {
        let svc = test_service();
        let token = svc
            .create_token(Uuid::new_v4(), "a@b.c", "A", "B", Role::User)
            .unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn parse_cookie() {
        assert_eq!(
            parse_auth_cookie("auth_token=abc123; other=xyz"),
            Some("abc123")
        );
        assert_eq!(
            parse_auth_cookie("other=xyz; auth_token=abc123"),
            Some("abc123")
        );
        assert_eq!(parse_auth_cookie("other=xyz"), None);
    }
}
