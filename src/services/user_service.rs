use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::{
    audit,
    db::OrmConn,
    dto::users::{CreateUserRequest, UpdateUserRequest, UserList},
    entity::users::{ActiveModel, Column, Entity as Users},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::User,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::auth_service::hash_password,
    state::AppState,
};

pub async fn list_users(
    state: &AppState,
    admin: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(admin)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Users::find().order_by_desc(Column::CreatedAt).order_by_desc(Column::Id);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_user(
    state: &AppState,
    admin: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(admin)?;
    let user = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("User", User::from(user), None))
}

pub async fn create_user(
    state: &AppState,
    admin: &AuthUser,
    payload: CreateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(admin)?;
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();
    ensure_email_free(&state.orm, &email, None).await?;

    let password_hash = hash_password(&payload.password).await?;
    let user = ActiveModel {
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

    audit::record(
        &state.pool,
        Some(admin),
        "user_create",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created successfully",
        User::from(user),
        Some(Meta::empty()),
    ))
}

pub async fn update_user(
    state: &AppState,
    admin: &AuthUser,
    id: i64,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(admin)?;
    payload.validate()?;
    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let email = payload.email.trim().to_lowercase();
    ensure_email_free(&state.orm, &email, Some(id)).await?;

    let mut active: ActiveModel = existing.into();
    active.first_name = Set(payload.first_name.trim().to_string());
    active.last_name = Set(payload.last_name.trim().to_string());
    active.email = Set(email);
    if let Some(password) = payload.new_password() {
        active.password_hash = Set(hash_password(password).await?);
    }
    active.updated_at = Set(Utc::now().into());
    let user = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(admin),
        "user_update",
        "users",
        serde_json::json!({ "user_id": user.id, "password_changed": payload.new_password().is_some() }),
    )
    .await;

    Ok(ApiResponse::success(
        "User updated successfully",
        User::from(user),
        Some(Meta::empty()),
    ))
}

/// Removing a user cascades to their orders and order lines.
pub async fn delete_user(
    state: &AppState,
    admin: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(admin)?;
    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(admin),
        "user_delete",
        "users",
        serde_json::json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User deleted successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn ensure_email_free(conn: &OrmConn, email: &str, except: Option<i64>) -> AppResult<()> {
    let mut finder = Users::find().filter(Column::Email.eq(email));
    if let Some(id) = except {
        finder = finder.filter(Column::Id.ne(id));
    }
    if finder.one(conn).await?.is_some() {
        return Err(AppError::Conflict("The email has already been taken".into()));
    }
    Ok(())
}
