use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::{
    audit,
    db::OrmConn,
    dto::orders::{
        OrderDetail, OrderList, OrderWithItems, PlaceOrderRequest, UpdateOrderRequest,
        parse_status,
    },
    entity::{
        categories::{Column as CategoryCol, Entity as Categories},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        product_variation::{Column as VariationCol, Entity as ProductVariations},
        products::{Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_customer, ensure_order_access},
    models::{Order, OrderItem, OrderItemDetail, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::stock_ledger,
    state::AppState,
};

pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_customer(user)?;
    let status = payload.validate()?;
    // A token outlives the account it was issued for.
    if Users::find_by_id(user.id).one(&state.orm).await?.is_none() {
        return Err(AppError::Unauthorized("Invalid token".into()));
    }

    let placed = assemble_order(&state.orm, user.id, status, &payload).await?;

    tracing::info!(
        order_id = placed.order.id,
        user_id = user.id,
        items = placed.items.len(),
        total_amount = %placed.order.total_amount,
        "order placed"
    );
    audit::record(
        &state.pool,
        Some(user),
        "order_place",
        "orders",
        serde_json::json!({ "order_id": placed.order.id, "items": placed.items.len() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order placed",
        placed,
        Some(Meta::empty()),
    ))
}

/// Create an order, its line items and the matching stock decrements in one
/// transaction. Returning early on any error drops the transaction, which
/// rolls everything back.
pub async fn assemble_order(
    db: &OrmConn,
    user_id: i64,
    status: OrderStatus,
    payload: &PlaceOrderRequest,
) -> AppResult<OrderWithItems> {
    let txn = db.begin().await?;

    let mut resolved: Vec<i64> = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        let variation =
            stock_ledger::resolve_variation(&txn, item.product_id, item.variation_id)
                .await
                .inspect_err(|err| tracing::warn!(user_id, error = %err, "order rejected"))?;
        resolved.push(variation.id);
    }

    let lines: Vec<(i64, i32)> = resolved
        .iter()
        .zip(&payload.items)
        .map(|(variation_id, item)| (*variation_id, item.quantity))
        .collect();
    let demand = stock_ledger::aggregate_demand(&lines)?;
    let stock = stock_ledger::lock_stock(&txn, &resolved).await?;
    stock_ledger::admit(&demand, &stock)
        .inspect_err(|err| tracing::warn!(user_id, error = %err, "order rejected"))?;

    let order = OrderActive {
        id: NotSet,
        u_id: Set(user_id),
        total_amount: Set(payload.total_amount.round_dp(2)),
        status: Set(status.code()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(payload.items.len());
    for (item, variation_id) in payload.items.iter().zip(&resolved) {
        let line = OrderItemActive {
            order_item_id: NotSet,
            order_id: Set(order.id),
            product_id: Set(item.product_id),
            variation_id: Set(Some(*variation_id)),
            quantity: Set(item.quantity),
            total_price: Set(item.total_price.round_dp(2)),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(OrderItem::from(line));
    }

    for &(variation_id, quantity) in &demand {
        stock_ledger::decrement(&txn, variation_id, quantity).await?;
    }

    txn.commit().await?;

    Ok(OrderWithItems {
        order: Order::try_from(order)?,
        items,
    })
}

/// Users see their own orders, admins see every order.
pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();
    if !user.is_admin() {
        condition = condition.add(OrderCol::UId.eq(user.id));
    }
    if let Some(status) = parse_status(query.status)? {
        condition = condition.add(OrderCol::Status.eq(status.code()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder
            .order_by_asc(OrderCol::CreatedAt)
            .order_by_asc(OrderCol::Id),
        SortOrder::Desc => finder
            .order_by_desc(OrderCol::CreatedAt)
            .order_by_desc(OrderCol::Id),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = load_details(&state.orm, orders).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Ok", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = find_accessible_order(&state.orm, user, id, false).await?;
    let detail = load_details(&state.orm, vec![order])
        .await?
        .pop()
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success("OK", detail, Some(Meta::empty())))
}

/// Edit status and/or total amount. Stock is not touched.
pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    let status = payload.validate()?;

    let txn = state.orm.begin().await?;
    let existing = find_accessible_order(&txn, user, id, true).await?;

    let mut active: OrderActive = existing.into();
    if let Some(total) = payload.total_amount {
        active.total_amount = Set(total.round_dp(2));
    }
    if let Some(status) = status {
        active.status = Set(status.code());
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user),
        "order_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "status": order.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        Order::try_from(order)?,
        Some(Meta::empty()),
    ))
}

/// Delete an order and, by cascade, its line items. Stock is not restored.
pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let order = find_accessible_order(&state.orm, user, id, false).await?;
    Orders::delete_by_id(order.id).exec(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user),
        "order_delete",
        "orders",
        serde_json::json!({ "order_id": order.id, "u_id": order.u_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Ownership gate lookup. A missing order is `NotFound` for admins but
/// `Forbidden` for users, the same answer they get for someone else's order.
async fn find_accessible_order<C: ConnectionTrait>(
    conn: &C,
    user: &AuthUser,
    id: i64,
    for_update: bool,
) -> AppResult<OrderModel> {
    let mut finder = Orders::find_by_id(id);
    if for_update {
        finder = finder.lock(LockType::Update);
    }

    match finder.one(conn).await? {
        Some(order) => {
            ensure_order_access(user, order.u_id)?;
            Ok(order)
        }
        None if user.is_admin() => Err(AppError::NotFound),
        None => Err(AppError::Forbidden),
    }
}

async fn load_details<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<OrderModel>,
) -> AppResult<Vec<OrderDetail>> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
    let lines = OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(order_ids))
        .order_by_asc(OrderItemCol::OrderItemId)
        .all(conn)
        .await?;

    let product_ids: HashSet<i64> = lines.iter().map(|l| l.product_id).collect();
    let variation_ids: HashSet<i64> = lines.iter().filter_map(|l| l.variation_id).collect();

    let products: HashMap<i64, _> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let category_ids: HashSet<i64> = products.values().map(|p| p.category_id).collect();
    let categories: HashMap<i64, String> = Categories::find()
        .filter(CategoryCol::Id.is_in(category_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let variations: HashMap<i64, _> = ProductVariations::find()
        .filter(VariationCol::Id.is_in(variation_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|v| (v.id, v))
        .collect();

    let mut by_order: HashMap<i64, Vec<OrderItemDetail>> = HashMap::new();
    for line in lines {
        let product = products.get(&line.product_id);
        let variation = line.variation_id.and_then(|id| variations.get(&id));
        let detail = OrderItemDetail {
            name: product.map_or_else(|| "Unknown Product".to_string(), |p| p.name.clone()),
            category: product
                .and_then(|p| categories.get(&p.category_id))
                .cloned()
                .unwrap_or_default(),
            price: product.map(|p| p.price).unwrap_or_default(),
            size: variation.map(|v| v.size.clone()),
            color: variation.map(|v| v.color.clone()),
            picture: product.and_then(|p| p.picture.clone()),
            item: OrderItem::from(line),
        };
        by_order.entry(detail.item.order_id).or_default().push(detail);
    }

    orders
        .into_iter()
        .map(|model| {
            let items = by_order.remove(&model.id).unwrap_or_default();
            Ok(OrderDetail {
                order: Order::try_from(model)?,
                items,
            })
        })
        .collect()
}
