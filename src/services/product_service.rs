use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::{
    audit,
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest, VariationInput},
    entity::{
        categories::{Column as CategoryCol, Entity as Categories},
        product_variation::{
            ActiveModel as VariationActive, Column as VariationCol, Entity as ProductVariations,
        },
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Product, ProductVariation},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category_id) = query.category_id {
        condition = condition.add(Column::CategoryId.eq(category_id));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col).order_by_asc(Column::Id),
        SortOrder::Desc => finder.order_by_desc(sort_col).order_by_desc(Column::Id),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let products = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;
    let items = hydrate(&state.orm, products).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, id: i64) -> AppResult<ApiResponse<Product>> {
    let product = find_product(&state.orm, id).await?;
    Ok(ApiResponse::success("Product", product, None))
}

/// Create a product together with its variations.
pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    payload.validate()?;

    let txn = state.orm.begin().await?;
    ensure_category(&txn, payload.category_id).await?;

    let product = ActiveModel {
        id: NotSet,
        category_id: Set(payload.category_id),
        name: Set(payload.name.trim().to_string()),
        price: Set(payload.price.round_dp(2)),
        description: Set(payload.description),
        picture: Set(payload.picture),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    for variation in &payload.variations {
        insert_variation(&txn, product.id, variation).await?;
    }

    let created = find_product(&txn, product.id).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user),
        "product_create",
        "products",
        serde_json::json!({ "product_id": created.id, "variations": created.variations.len() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created successfully",
        created,
        Some(Meta::empty()),
    ))
}

/// Partial update. Variations with an id are updated in place, the rest are
/// added; variations not mentioned are kept so existing orders still resolve.
pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    payload.validate()?;

    let txn = state.orm.begin().await?;
    let existing = Products::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    if let Some(category_id) = payload.category_id {
        ensure_category(&txn, category_id).await?;
        active.category_id = Set(category_id);
    }
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(price) = payload.price {
        active.price = Set(price.round_dp(2));
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(picture) = payload.picture {
        active.picture = Set(Some(picture));
    }
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    for variation in payload.variations.iter().flatten() {
        match variation.id {
            Some(variation_id) => {
                let row = ProductVariations::find_by_id(variation_id)
                    .one(&txn)
                    .await?
                    .filter(|v| v.product_id == id)
                    .ok_or_else(|| {
                        AppError::validation(format!(
                            "variation {variation_id} does not belong to product {id}"
                        ))
                    })?;
                let mut row: VariationActive = row.into();
                row.size = Set(variation.size.trim().to_string());
                row.color = Set(variation.color.trim().to_string());
                row.stock = Set(variation.stock);
                row.updated_at = Set(Utc::now().into());
                row.update(&txn).await?;
            }
            None => {
                insert_variation(&txn, id, variation).await?;
            }
        }
    }

    let updated = find_product(&txn, id).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user),
        "product_update",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product updated successfully",
        updated,
        Some(Meta::empty()),
    ))
}

/// Delete a product; variations and order lines referencing it cascade.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product deleted successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn delete_variation(
    state: &AppState,
    user: &AuthUser,
    product_id: i64,
    variation_id: i64,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = ProductVariations::delete_many()
        .filter(VariationCol::Id.eq(variation_id))
        .filter(VariationCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user),
        "variation_delete",
        "product_variation",
        serde_json::json!({ "product_id": product_id, "variation_id": variation_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Variation deleted successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn find_product<C: ConnectionTrait>(conn: &C, id: i64) -> AppResult<Product> {
    let product = Products::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)?;
    hydrate(conn, vec![product])
        .await?
        .pop()
        .ok_or(AppError::NotFound)
}

async fn ensure_category<C: ConnectionTrait>(conn: &C, category_id: i64) -> AppResult<()> {
    match Categories::find_by_id(category_id).one(conn).await? {
        Some(_) => Ok(()),
        None => Err(AppError::validation(format!(
            "category {category_id} does not exist"
        ))),
    }
}

async fn insert_variation<C: ConnectionTrait>(
    conn: &C,
    product_id: i64,
    input: &VariationInput,
) -> AppResult<()> {
    VariationActive {
        id: NotSet,
        product_id: Set(product_id),
        size: Set(input.size.trim().to_string()),
        color: Set(input.color.trim().to_string()),
        stock: Set(input.stock),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Attach category names and variations to a page of products.
async fn hydrate<C: ConnectionTrait>(
    conn: &C,
    products: Vec<ProductModel>,
) -> AppResult<Vec<Product>> {
    if products.is_empty() {
        return Ok(Vec::new());
    }

    let product_ids: Vec<i64> = products.iter().map(|p| p.id).collect();
    let category_ids: Vec<i64> = products.iter().map(|p| p.category_id).collect();

    let categories: HashMap<i64, String> = Categories::find()
        .filter(CategoryCol::Id.is_in(category_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut variations: HashMap<i64, Vec<ProductVariation>> = HashMap::new();
    for row in ProductVariations::find()
        .filter(VariationCol::ProductId.is_in(product_ids))
        .order_by_asc(VariationCol::Id)
        .all(conn)
        .await?
    {
        variations
            .entry(row.product_id)
            .or_default()
            .push(ProductVariation::from(row));
    }

    Ok(products
        .into_iter()
        .map(|model| Product {
            id: model.id,
            category_id: model.category_id,
            category: categories.get(&model.category_id).cloned().unwrap_or_default(),
            name: model.name,
            price: model.price,
            description: model.description,
            picture: model.picture,
            variations: variations.remove(&model.id).unwrap_or_default(),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
        .collect())
}
