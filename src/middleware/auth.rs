use std::sync::Arc;

use axum::{extract::FromRequestParts, http::header};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::auth::Claims,
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// The authenticated principal behind a bearer token. `id` points into
/// `users` or `admins` depending on `role`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn ensure_role(user: &AuthUser, role: Role) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, Role::Admin)
}

pub fn ensure_customer(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, Role::User)
}

/// Ownership gate for existing orders. Admins pass; users pass only for their
/// own orders. Callers must map "order does not exist" to the same
/// `Forbidden` for non-admins so existence is not revealed.
pub fn ensure_order_access(user: &AuthUser, owner_id: i64) -> Result<(), AppError> {
    if user.is_admin() || (user.role == Role::User && user.id == owner_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

#[derive(Clone)]
pub struct JwtSettings {
    secret: Arc<str>,
    ttl_hours: i64,
}

impl JwtSettings {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            secret: Arc::from(secret),
            ttl_hours,
        }
    }

    pub fn issue(&self, id: i64, role: Role) -> AppResult<String> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(Duration::hours(self.ttl_hours))
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

        let claims = Claims {
            sub: id.to_string(),
            role,
            iat: now.timestamp() as usize,
            exp: expiration.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
    }

    pub fn verify(&self, token: &str) -> AppResult<AuthUser> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        let id = decoded
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Unauthorized("Invalid subject in token".into()))?;

        Ok(AuthUser {
            id,
            role: decoded.claims.role,
        })
    }
}

pub fn bearer_token(value: &str) -> Option<&str> {
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Token not provided".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let token = bearer_token(auth_str)
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?;

        state.jwt.verify(token)
    }
}

/// Extractor for admin-only handlers.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        ensure_admin(&user)?;
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> JwtSettings {
        JwtSettings::new("test-secret", 1)
    }

    #[test]
    fn issued_token_resolves_to_the_same_principal() {
        let jwt = settings();
        let token = jwt.issue(42, Role::Admin).expect("token");
        let user = jwt.verify(&token).expect("valid token");
        assert_eq!(user.id, 42);
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = JwtSettings::new("other-secret", 1)
            .issue(1, Role::User)
            .expect("token");
        let err = settings().verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            sub: "1".into(),
            role: Role::User,
            iat: (Utc::now() - Duration::hours(3)).timestamp() as usize,
            exp: (Utc::now() - Duration::hours(2)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .expect("token");
        assert!(matches!(
            settings().verify(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer   "), None);
    }

    #[test]
    fn ownership_gate_allows_owner_and_admin_only() {
        let owner = AuthUser { id: 5, role: Role::User };
        let stranger = AuthUser { id: 6, role: Role::User };
        let admin = AuthUser { id: 1, role: Role::Admin };
        // admin ids live in a different table, so an admin id equal to the
        // owner id must not matter
        let admin_same_id = AuthUser { id: 5, role: Role::Admin };

        assert!(ensure_order_access(&owner, 5).is_ok());
        assert!(ensure_order_access(&admin, 5).is_ok());
        assert!(ensure_order_access(&admin_same_id, 5).is_ok());
        assert!(matches!(
            ensure_order_access(&stranger, 5),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn role_checks() {
        let user = AuthUser { id: 1, role: Role::User };
        let admin = AuthUser { id: 1, role: Role::Admin };
        assert!(ensure_admin(&admin).is_ok());
        assert!(matches!(ensure_admin(&user), Err(AppError::Forbidden)));
        assert!(ensure_customer(&user).is_ok());
        assert!(matches!(ensure_customer(&admin), Err(AppError::Forbidden)));
    }
}
