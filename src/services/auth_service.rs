use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use password_hash::rand_core::OsRng;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tokio::task;

use crate::{
    audit,
    dto::auth::{AdminAuthPayload, AuthPayload, LoginRequest, RegisterRequest},
    entity::{
        admins::{Column as AdminCol, Entity as Admins},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, Role, ensure_admin, ensure_customer},
    models::{Admin, User},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Argon2 is deliberately slow, so hashing runs on the blocking pool.
pub async fn hash_password(password: &str) -> AppResult<String> {
    let password = password.to_string();
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}

pub async fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&hash)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(anyhow::anyhow!(e.to_string()))),
        }
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<AuthPayload>> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already taken".to_string()));
    }

    let password_hash = hash_password(&payload.password).await?;
    let user = UserActive {
        id: NotSet,
        first_name: Set(payload.first_name.trim().to_string()),
        last_name: Set(payload.last_name.trim().to_string()),
        email: Set(email),
        password_hash: Set(password_hash),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let token = state.jwt.issue(user.id, Role::User)?;
    let principal = AuthUser {
        id: user.id,
        role: Role::User,
    };
    audit::record(
        &state.pool,
        Some(&principal),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Registration successful",
        AuthPayload {
            user: User::from(user),
            token,
        },
        None,
    ))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<AuthPayload>> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();

    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    let user = match user {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("Invalid credentials".into())),
    };

    if !verify_password(&payload.password, &user.password_hash).await? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let token = state.jwt.issue(user.id, Role::User)?;
    let principal = AuthUser {
        id: user.id,
        role: Role::User,
    };
    audit::record(
        &state.pool,
        Some(&principal),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Login successful",
        AuthPayload {
            user: User::from(user),
            token,
        },
        Some(Meta::empty()),
    ))
}

pub async fn current_user(state: &AppState, principal: &AuthUser) -> AppResult<ApiResponse<User>> {
    ensure_customer(principal)?;
    let user = Users::find_by_id(principal.id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".into()))?;
    Ok(ApiResponse::success("Token valid", User::from(user), None))
}

/// Tokens are stateless; logging out is recorded and the client drops the token.
pub async fn logout(
    state: &AppState,
    principal: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let action = match principal.role {
        Role::User => "user_logout",
        Role::Admin => "admin_logout",
    };
    audit::record(
        &state.pool,
        Some(principal),
        action,
        principal.role.as_str(),
        serde_json::json!({ "id": principal.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged out successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn login_admin(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<AdminAuthPayload>> {
    payload.validate_admin()?;
    let email = payload.email.trim().to_lowercase();

    let admin = Admins::find()
        .filter(AdminCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    let admin = match admin {
        Some(a) => a,
        None => return Err(AppError::Unauthorized("Invalid credentials".into())),
    };

    if !verify_password(&payload.password, &admin.password_hash).await? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let token = state.jwt.issue(admin.id, Role::Admin)?;
    let principal = AuthUser {
        id: admin.id,
        role: Role::Admin,
    };
    audit::record(
        &state.pool,
        Some(&principal),
        "admin_login",
        "admins",
        serde_json::json!({ "admin_id": admin.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Login successful",
        AdminAuthPayload {
            admin: Admin::from(admin),
            token,
        },
        Some(Meta::empty()),
    ))
}

pub async fn current_admin(
    state: &AppState,
    principal: &AuthUser,
) -> AppResult<ApiResponse<Admin>> {
    ensure_admin(principal)?;
    let admin = Admins::find_by_id(principal.id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".into()))?;
    Ok(ApiResponse::success("Token valid", Admin::from(admin), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn password_hash_verifies_only_the_original_password() {
        let hash = hash_password("correct horse").await.unwrap();
        assert!(verify_password("correct horse", &hash).await.unwrap());
        assert!(!verify_password("battery staple", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_hash_is_an_internal_error() {
        let err = verify_password("anything", "not-a-phc-string").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
