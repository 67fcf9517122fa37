use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use storefront_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    dto::orders::{PlaceOrderItem, PlaceOrderRequest, UpdateOrderRequest},
    entity::{
        categories::ActiveModel as CategoryActive,
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders},
        product_variation::{ActiveModel as VariationActive, Entity as ProductVariations},
        products::ActiveModel as ProductActive,
        users::{ActiveModel as UserActive, Entity as Users},
    },
    error::AppError,
    middleware::auth::{AuthUser, Role},
    models::OrderStatus,
    routes::{create_app, params::OrderListQuery},
    services::order_service,
    state::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

// These tests need Postgres; they are skipped when no database is configured.
// Every fixture uses fresh rows so the tests can share one database.
async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run order flow tests.");
            return Ok(None);
        }
    };

    let config = AppConfig {
        database_url: database_url.clone(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "orders-flow-secret".into(),
        jwt_ttl_hours: 1,
        db_max_connections: 5,
    };
    let pool = create_pool(&database_url, config.db_max_connections).await?;
    let state = AppState::new(pool, &config);
    run_migrations(&state.orm).await?;
    Ok(Some(state))
}

async fn create_customer(state: &AppState) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: NotSet,
        first_name: Set("Test".into()),
        last_name: Set("Customer".into()),
        email: Set(format!("{}@example.com", Uuid::new_v4())),
        password_hash: Set("not-a-real-hash".into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(AuthUser {
        id: user.id,
        role: Role::User,
    })
}

/// A product with one variation per entry of `stocks`; returns the product id
/// and the variation ids in creation order.
async fn create_product(state: &AppState, stocks: &[i32]) -> anyhow::Result<(i64, Vec<i64>)> {
    let category = CategoryActive {
        id: NotSet,
        name: Set(format!("category-{}", Uuid::new_v4())),
        description: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let product = ProductActive {
        id: NotSet,
        category_id: Set(category.id),
        name: Set("Test Hoodie".into()),
        price: Set(dec!(19.99)),
        description: Set(Some("A product for testing".into())),
        picture: Set(Some("hoodie.png".into())),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let mut variation_ids = Vec::new();
    for (index, stock) in stocks.iter().enumerate() {
        let variation = VariationActive {
            id: NotSet,
            product_id: Set(product.id),
            size: Set(format!("S{index}")),
            color: Set("Black".into()),
            stock: Set(*stock),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(&state.orm)
        .await?;
        variation_ids.push(variation.id);
    }

    Ok((product.id, variation_ids))
}

async fn stock_of(state: &AppState, variation_id: i64) -> anyhow::Result<i32> {
    let variation = ProductVariations::find_by_id(variation_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("variation {variation_id} vanished"))?;
    Ok(variation.stock)
}

async fn orders_of(state: &AppState, user_id: i64) -> anyhow::Result<u64> {
    Ok(Orders::find()
        .filter(OrderCol::UId.eq(user_id))
        .count(&state.orm)
        .await?)
}

fn order(items: Vec<(i64, Option<i64>, i32)>) -> PlaceOrderRequest {
    let items: Vec<PlaceOrderItem> = items
        .into_iter()
        .map(|(product_id, variation_id, quantity)| PlaceOrderItem {
            product_id,
            variation_id,
            quantity,
            total_price: dec!(19.99) * Decimal::from(quantity),
        })
        .collect();
    PlaceOrderRequest {
        total_amount: items.iter().map(|i| i.total_price).sum(),
        status: None,
        items,
    }
}

#[tokio::test]
async fn placing_orders_decrements_stock_until_it_runs_out() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_customer(&state).await?;
    let (product_id, variations) = create_product(&state, &[5]).await?;
    let variation_id = variations[0];

    let placed = order_service::place_order(
        &state,
        &user,
        order(vec![(product_id, Some(variation_id), 3)]),
    )
    .await?
    .data
    .expect("order data");
    assert_eq!(placed.order.u_id, user.id);
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].variation_id, Some(variation_id));
    assert_eq!(stock_of(&state, variation_id).await?, 2);

    let err = order_service::place_order(
        &state,
        &user,
        order(vec![(product_id, Some(variation_id), 3)]),
    )
    .await
    .unwrap_err();
    match err {
        AppError::InsufficientStock {
            variation_id: v,
            requested,
            available,
        } => {
            assert_eq!(v, variation_id);
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // the rejected order left nothing behind
    assert_eq!(stock_of(&state, variation_id).await?, 2);
    assert_eq!(orders_of(&state, user.id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn identical_orders_are_not_deduplicated() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_customer(&state).await?;
    let (product_id, variations) = create_product(&state, &[10]).await?;

    for _ in 0..2 {
        order_service::place_order(&state, &user, order(vec![(product_id, None, 2)])).await?;
    }

    assert_eq!(orders_of(&state, user.id).await?, 2);
    assert_eq!(stock_of(&state, variations[0]).await?, 6);
    Ok(())
}

#[tokio::test]
async fn missing_variation_fails_without_writing() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_customer(&state).await?;
    let (product_id, variations) = create_product(&state, &[4]).await?;
    let (bare_product, _) = create_product(&state, &[]).await?;

    // first line is fine, second has no variation at all
    let err = order_service::place_order(
        &state,
        &user,
        order(vec![(product_id, None, 1), (bare_product, None, 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::VariationNotFound { product_id } if product_id == bare_product
    ));

    // a variation id that belongs to another product is not accepted either
    let err = order_service::place_order(
        &state,
        &user,
        order(vec![(bare_product, Some(variations[0]), 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::VariationNotFound { .. }));

    assert_eq!(stock_of(&state, variations[0]).await?, 4);
    assert_eq!(orders_of(&state, user.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn fallback_uses_the_first_variation_and_lines_keep_caller_order() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_customer(&state).await?;
    let (product_id, variations) = create_product(&state, &[3, 8]).await?;

    let placed = order_service::place_order(
        &state,
        &user,
        order(vec![(product_id, Some(variations[1]), 5), (product_id, None, 1)]),
    )
    .await?
    .data
    .expect("order data");

    let lines = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(placed.order.id))
        .order_by_asc(OrderItemCol::OrderItemId)
        .all(&state.orm)
        .await?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].variation_id, Some(variations[1]));
    assert_eq!(lines[1].variation_id, Some(variations[0]));

    assert_eq!(stock_of(&state, variations[0]).await?, 2);
    assert_eq!(stock_of(&state, variations[1]).await?, 3);
    Ok(())
}

#[tokio::test]
async fn duplicate_lines_are_admitted_against_their_sum() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_customer(&state).await?;
    let (product_id, variations) = create_product(&state, &[5]).await?;
    let v = variations[0];

    let err = order_service::place_order(
        &state,
        &user,
        order(vec![(product_id, Some(v), 3), (product_id, Some(v), 3)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientStock { requested: 6, available: 5, .. }
    ));
    assert_eq!(stock_of(&state, v).await?, 5);
    Ok(())
}

#[tokio::test]
async fn orders_are_visible_to_owner_and_admin_only() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let owner = create_customer(&state).await?;
    let stranger = create_customer(&state).await?;
    let admin = AuthUser {
        id: owner.id,
        role: Role::Admin,
    };
    let (product_id, _) = create_product(&state, &[5]).await?;

    let placed = order_service::place_order(&state, &owner, order(vec![(product_id, None, 1)]))
        .await?
        .data
        .expect("order data");
    let id = placed.order.id;

    let detail = order_service::get_order(&state, &owner, id)
        .await?
        .data
        .expect("detail");
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].name, "Test Hoodie");
    assert_eq!(detail.items[0].price, dec!(19.99));
    assert_eq!(detail.items[0].size.as_deref(), Some("S0"));

    assert!(matches!(
        order_service::get_order(&state, &stranger, id).await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        order_service::delete_order(&state, &stranger, id).await,
        Err(AppError::Forbidden)
    ));
    assert!(order_service::get_order(&state, &admin, id).await.is_ok());

    // a missing order looks the same as a foreign one to users
    assert!(matches!(
        order_service::get_order(&state, &stranger, i64::MAX).await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        order_service::get_order(&state, &admin, i64::MAX).await,
        Err(AppError::NotFound)
    ));

    let listed = order_service::list_orders(&state, &stranger, OrderListQuery::default())
        .await?
        .data
        .expect("list");
    assert!(listed.items.is_empty());

    let updated = order_service::update_order(
        &state,
        &admin,
        id,
        UpdateOrderRequest {
            total_amount: None,
            status: Some(OrderStatus::Shipped.code()),
        },
    )
    .await?
    .data
    .expect("updated");
    assert_eq!(updated.status, OrderStatus::Shipped);

    order_service::delete_order(&state, &owner, id).await?;
    assert_eq!(orders_of(&state, owner.id).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_orders_for_the_last_unit_admit_exactly_one() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let first = create_customer(&state).await?;
    let second = create_customer(&state).await?;
    let (product_id, variations) = create_product(&state, &[1]).await?;

    let spawn = |user: AuthUser| {
        let state = state.clone();
        tokio::spawn(async move {
            order_service::place_order(&state, &user, order(vec![(product_id, None, 1)])).await
        })
    };
    let (a, b) = tokio::join!(spawn(first), spawn(second));
    let results = [a?, b?];

    let placed = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::InsufficientStock { .. })))
        .count();
    assert_eq!(placed, 1);
    assert_eq!(rejected, 1);
    assert_eq!(stock_of(&state, variations[0]).await?, 0);
    Ok(())
}

#[tokio::test]
async fn token_of_a_deleted_customer_is_unauthorized() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_customer(&state).await?;
    let (product_id, variations) = create_product(&state, &[5]).await?;
    Users::delete_by_id(user.id).exec(&state.orm).await?;

    let err = order_service::place_order(&state, &user, order(vec![(product_id, None, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)), "unexpected error: {err:?}");
    assert_eq!(stock_of(&state, variations[0]).await?, 5);
    assert_eq!(orders_of(&state, user.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn place_order_endpoint_answers_201_then_422_when_stock_runs_out() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };
    let user = create_customer(&state).await?;
    let (product_id, variations) = create_product(&state, &[2]).await?;
    let token = state.jwt.issue(user.id, Role::User)?;
    let app = create_app(state.clone());

    let post = |quantity: i32| {
        let body = serde_json::json!({
            "total_amount": "39.98",
            "items": [{
                "product_id": product_id,
                "variation_id": variations[0],
                "quantity": quantity,
                "total_price": "39.98"
            }]
        });
        Request::builder()
            .method("POST")
            .uri("/api/orders")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body.to_string()))
            .expect("request")
    };

    let response = app.clone().oneshot(post(2)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = response.into_body().collect().await?.to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["message"], "Order placed");
    assert_eq!(body["data"]["order"]["u_id"], user.id);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(stock_of(&state, variations[0]).await?, 0);

    let response = app.oneshot(post(1)).await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let bytes = response.into_body().collect().await?.to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["message"], "Unprocessable Entity");
    assert_eq!(
        body["error"],
        format!(
            "Requested quantity 1 exceeds stock 0 for variation ID {}",
            variations[0]
        )
    );
    assert_eq!(orders_of(&state, user.id).await?, 1);
    Ok(())
}
