use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::{
    dto::admin::{AuditLogEntry, AuditLogList, DashboardSummary},
    entity::{
        audit_logs::{Column as AuditCol, Entity as AuditLogs},
        categories::Entity as Categories,
        orders::{Column as OrderCol, Entity as Orders},
        products::Entity as Products,
        users::Entity as Users,
    },
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    models::OrderStatus,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn dashboard(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<DashboardSummary>> {
    ensure_admin(user)?;

    let users = Users::find().count(&state.orm).await? as i64;
    let products = Products::find().count(&state.orm).await? as i64;
    let categories = Categories::find().count(&state.orm).await? as i64;
    let orders = Orders::find().count(&state.orm).await? as i64;
    let pending_orders = Orders::find()
        .filter(OrderCol::Status.eq(OrderStatus::Pending.code()))
        .count(&state.orm)
        .await? as i64;

    Ok(ApiResponse::success(
        "Dashboard",
        DashboardSummary {
            users,
            products,
            categories,
            orders,
            pending_orders,
        },
        None,
    ))
}

/// Most recent audit entries first.
pub async fn list_audit_logs(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<AuditLogList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = AuditLogs::find().order_by_desc(AuditCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(AuditLogEntry::from)
        .collect();

    Ok(ApiResponse::success(
        "Audit logs",
        AuditLogList { items },
        Some(Meta::new(page, limit, total)),
    ))
}
