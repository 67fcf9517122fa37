//! Reads and mutations of `product_variation.stock`.
//!
//! Everything here takes a connection rather than the app state so the order
//! assembler can run it inside its transaction.

use std::collections::HashMap;

use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::{
    entity::product_variation::{Column as VariationCol, Entity as ProductVariations, Model as VariationModel},
    error::{AppError, AppResult},
};

/// Resolve the variation an order line draws stock from.
///
/// An explicit `variation_id` must belong to `product_id`. Without one, the
/// product's variation with the lowest id is used.
pub async fn resolve_variation<C: ConnectionTrait>(
    conn: &C,
    product_id: i64,
    variation_id: Option<i64>,
) -> AppResult<VariationModel> {
    let variation = match variation_id {
        Some(id) => ProductVariations::find_by_id(id)
            .one(conn)
            .await?
            .filter(|v| v.product_id == product_id),
        None => {
            ProductVariations::find()
                .filter(VariationCol::ProductId.eq(product_id))
                .order_by_asc(VariationCol::Id)
                .one(conn)
                .await?
        }
    };

    variation.ok_or(AppError::VariationNotFound { product_id })
}

/// Lock the given variation rows for the rest of the transaction and return
/// their current stock keyed by id. Rows are locked in ascending id order so
/// concurrent orders touching the same variations cannot deadlock.
pub async fn lock_stock<C: ConnectionTrait>(
    conn: &C,
    variation_ids: &[i64],
) -> AppResult<HashMap<i64, i32>> {
    let mut ids = variation_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let rows = ProductVariations::find()
        .filter(VariationCol::Id.is_in(ids))
        .order_by_asc(VariationCol::Id)
        .lock(LockType::Update)
        .all(conn)
        .await?;

    Ok(rows.into_iter().map(|v| (v.id, v.stock)).collect())
}

/// Sum the requested quantity per variation, keeping the order in which each
/// variation first appears.
pub fn aggregate_demand(lines: &[(i64, i32)]) -> AppResult<Vec<(i64, i32)>> {
    let mut demand: Vec<(i64, i32)> = Vec::with_capacity(lines.len());
    for &(variation_id, quantity) in lines {
        match demand.iter_mut().find(|(id, _)| *id == variation_id) {
            Some((_, total)) => {
                *total = total.checked_add(quantity).ok_or_else(|| {
                    AppError::validation(format!(
                        "requested quantity for variation ID {variation_id} is too large"
                    ))
                })?;
            }
            None => demand.push((variation_id, quantity)),
        }
    }
    Ok(demand)
}

/// Admission check: every variation must hold at least the requested amount.
/// Reports the first shortfall in demand order.
pub fn admit(demand: &[(i64, i32)], stock: &HashMap<i64, i32>) -> AppResult<()> {
    for &(variation_id, requested) in demand {
        let available = stock.get(&variation_id).copied().unwrap_or(0);
        if requested > available {
            return Err(AppError::InsufficientStock {
                variation_id,
                requested,
                available,
            });
        }
    }
    Ok(())
}

/// Take `quantity` units out of a variation. The update only applies while
/// enough stock remains, so stock never goes negative even if the admission
/// check was bypassed.
pub async fn decrement<C: ConnectionTrait>(
    conn: &C,
    variation_id: i64,
    quantity: i32,
) -> AppResult<()> {
    let result = ProductVariations::update_many()
        .col_expr(VariationCol::Stock, Expr::col(VariationCol::Stock).sub(quantity))
        .col_expr(VariationCol::UpdatedAt, Expr::current_timestamp().into())
        .filter(VariationCol::Id.eq(variation_id))
        .filter(VariationCol::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let available = ProductVariations::find_by_id(variation_id)
            .one(conn)
            .await?
            .map_or(0, |v| v.stock);
        tracing::error!(
            variation_id,
            requested = quantity,
            available,
            "conditional stock decrement matched no row"
        );
        return Err(AppError::InsufficientStock {
            variation_id,
            requested: quantity,
            available,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demand_is_summed_per_variation_in_first_seen_order() {
        let demand = aggregate_demand(&[(7, 2), (3, 1), (7, 4)]).unwrap();
        assert_eq!(demand, vec![(7, 6), (3, 1)]);
    }

    #[test]
    fn demand_overflow_is_a_validation_error() {
        let err = aggregate_demand(&[(1, i32::MAX), (1, 1)]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn admission_passes_when_stock_covers_demand() {
        let stock = HashMap::from([(1, 5), (2, 1)]);
        assert!(admit(&[(1, 5), (2, 1)], &stock).is_ok());
    }

    #[test]
    fn admission_reports_first_shortfall() {
        let stock = HashMap::from([(1, 2), (2, 0)]);
        let err = admit(&[(1, 3), (2, 1)], &stock).unwrap_err();
        match err {
            AppError::InsufficientStock {
                variation_id,
                requested,
                available,
            } => {
                assert_eq!(variation_id, 1);
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_lines_are_checked_against_combined_demand() {
        // each line alone fits, together they do not
        let stock = HashMap::from([(9, 5)]);
        let demand = aggregate_demand(&[(9, 3), (9, 3)]).unwrap();
        assert!(matches!(
            admit(&demand, &stock),
            Err(AppError::InsufficientStock { requested: 6, available: 5, .. })
        ));
    }

    #[test]
    fn variation_missing_from_the_lock_set_has_no_stock() {
        let stock = HashMap::new();
        assert!(matches!(
            admit(&[(4, 1)], &stock),
            Err(AppError::InsufficientStock { available: 0, .. })
        ));
    }
}
