/*!
 * # Authentication and Authorization
 *
 * JWT validation and permission checks for the staff API. Tokens are
 * issued by the operator identity system (or by `issue_token` for local
 * tooling); this module only validates them and gates routes on the
 * permissions they carry.
 *
 * Guest riders never hold a JWT; they authenticate with per-booking
 * access tokens handled in `services::guests`.
 */

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Claim structure for staff JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,              // Subject (staff user ID)
    pub name: Option<String>,     // Display name
    pub roles: Vec<String>,       // Roles (admin, driver, ops)
    pub permissions: Vec<String>, // Explicit permissions
    pub jti: String,              // JWT ID
    pub iat: i64,                 // Issued at time
    pub exp: i64,                 // Expiration time
    pub nbf: i64,                 // Not valid before time
    pub iss: String,              // Issuer
    pub aud: String,              // Audience
}

/// Authenticated staff user extracted from a validated token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }
}

/// Validates staff tokens and issues them for local tooling.
#[derive(Clone)]
pub struct AuthService {
    secret: String,
    issuer: String,
    audience: String,
}

impl AuthService {
    pub fn new(secret: String, issuer: String, audience: String) -> Self {
        Self {
            secret,
            issuer,
            audience,
        }
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        Ok(claims)
    }

    /// Issue a signed token. Production tokens come from the operator
    /// identity system; this exists for local tooling and tests.
    pub fn issue_token(
        &self,
        subject: &str,
        name: Option<String>,
        roles: Vec<String>,
        permissions: Vec<String>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            name,
            roles,
            permissions,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            nbf: now.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                msg.clone(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let headers = request.headers().clone();

    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service not available",
            )
                .into_response();
        }
    };

    match extract_auth_from_headers(&headers, &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_value) = auth_header.to_str() {
            if auth_value.starts_with("Bearer ") {
                let token = auth_value.trim_start_matches("Bearer ").trim();
                let claims = auth_service.validate_token(token)?;

                return Ok(AuthUser {
                    user_id: claims.sub,
                    name: claims.name,
                    roles: claims.roles,
                    permissions: claims.permissions,
                    token_id: claims.jti,
                });
            }
        }
    }

    Err(AuthError::MissingAuth)
}

/// Permission middleware to check if a user has the required permission
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => return Err(AuthError::MissingAuth),
    };

    // Admins hold every permission
    if user.is_admin() {
        return Ok(next.run(request).await);
    }

    if !user.has_permission(&required_permission) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Permission string constants for compile-time safety
pub mod consts {
    // Bookings
    pub const BOOKINGS_READ: &str = "bookings:read";
    pub const BOOKINGS_CREATE: &str = "bookings:create";
    pub const BOOKINGS_CANCEL: &str = "bookings:cancel";

    // Trips
    pub const TRIPS_UPDATE: &str = "trips:update";

    // Settlement
    pub const SETTLEMENT_READ: &str = "settlement:read";
    pub const SETTLEMENT_CONFIRM: &str = "settlement:confirm";

    // Accounts
    pub const ACCOUNTS_READ: &str = "accounts:read";
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(
            "unit-test-secret".to_string(),
            "careride-auth".to_string(),
            "careride-api".to_string(),
        )
    }

    #[test]
    fn issued_tokens_validate_round_trip() {
        let auth = service();
        let token = auth
            .issue_token(
                "driver-7",
                Some("Priya".to_string()),
                vec!["driver".to_string()],
                vec!["settlement:confirm".to_string()],
                Duration::minutes(30),
            )
            .unwrap();

        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "driver-7");
        assert!(claims.permissions.contains(&"settlement:confirm".to_string()));
    }

    #[test]
    fn expired_tokens_are_rejected_as_expired() {
        let auth = service();
        let token = auth
            .issue_token("driver-7", None, vec![], vec![], Duration::seconds(-120))
            .unwrap();

        match auth.validate_token(&token) {
            Err(AuthError::TokenExpired) => {}
            other => panic!("expected TokenExpired, got {:?}", other),
        }
    }

    #[test]
    fn tokens_for_another_audience_are_rejected() {
        let auth = service();
        let foreign = AuthService::new(
            "unit-test-secret".to_string(),
            "careride-auth".to_string(),
            "some-other-api".to_string(),
        );
        let token = foreign
            .issue_token("ops-1", None, vec![], vec![], Duration::minutes(5))
            .unwrap();

        assert!(matches!(
            auth.validate_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn admins_pass_any_permission_check() {
        let user = AuthUser {
            user_id: "1".to_string(),
            name: None,
            roles: vec!["admin".to_string()],
            permissions: vec![],
            token_id: "jti".to_string(),
        };
        assert!(user.is_admin());
        assert!(!user.has_permission("settlement:confirm"));
    }
}
