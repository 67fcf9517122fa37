use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entity::{admins, categories, order_items, orders, product_variation, users},
    error::AppError,
};

/// Lifecycle of an order, stored as SMALLINT and sent over the wire as its
/// integer code. The same bounded set applies to creation, update and
/// list filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
#[repr(i16)]
pub enum OrderStatus {
    #[default]
    Pending = 0,
    Shipped = 1,
    Cancelled = 2,
    Delivered = 3,
    Refunded = 4,
}

impl OrderStatus {
    pub const MAX: i16 = 4;

    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl TryFrom<i16> for OrderStatus {
    type Error = String;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(OrderStatus::Pending),
            1 => Ok(OrderStatus::Shipped),
            2 => Ok(OrderStatus::Cancelled),
            3 => Ok(OrderStatus::Delivered),
            4 => Ok(OrderStatus::Refunded),
            other => Err(format!(
                "status must be between 0 and {}, got {other}",
                OrderStatus::MAX
            )),
        }
    }
}

impl From<OrderStatus> for i16 {
    fn from(status: OrderStatus) -> Self {
        status.code()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl From<admins::Model> for Admin {
    fn from(model: admins::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            role: "admin".into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<categories::Model> for Category {
    fn from(model: categories::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductVariation {
    pub id: i64,
    pub product_id: i64,
    pub size: String,
    pub color: String,
    pub stock: i32,
}

impl From<product_variation::Model> for ProductVariation {
    fn from(model: product_variation::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            size: model.size,
            color: model.color,
            stock: model.stock,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: i64,
    pub category_id: i64,
    /// Category name, empty when the category could not be loaded.
    pub category: String,
    pub name: String,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    pub description: Option<String>,
    pub picture: Option<String>,
    pub variations: Vec<ProductVariation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: i64,
    pub u_id: i64,
    #[schema(value_type = String, example = "59.97")]
    pub total_amount: Decimal,
    #[schema(value_type = i16, minimum = 0, maximum = 4)]
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<orders::Model> for Order {
    type Error = AppError;

    fn try_from(model: orders::Model) -> Result<Self, Self::Error> {
        let status = OrderStatus::try_from(model.status)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("order {}: {e}", model.id)))?;
        Ok(Self {
            id: model.id,
            u_id: model.u_id,
            total_amount: model.total_amount,
            status,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub order_item_id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub variation_id: Option<i64>,
    pub quantity: i32,
    #[schema(value_type = String, example = "19.99")]
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            order_item_id: model.order_item_id,
            order_id: model.order_id,
            product_id: model.product_id,
            variation_id: model.variation_id,
            quantity: model.quantity,
            total_price: model.total_price,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

/// A line item enriched with the catalog data shown on order pages.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemDetail {
    #[serde(flatten)]
    pub item: OrderItem,
    pub name: String,
    pub category: String,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub size: Option<String>,
    pub color: Option<String>,
    pub picture: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_bounded() {
        for code in 0..=OrderStatus::MAX {
            let status = OrderStatus::try_from(code).expect("in range");
            assert_eq!(status.code(), code);
        }
        assert!(OrderStatus::try_from(-1).is_err());
        assert!(OrderStatus::try_from(5).is_err());
    }

    #[test]
    fn status_travels_as_integer() {
        let json = serde_json::to_string(&OrderStatus::Cancelled).unwrap();
        assert_eq!(json, "2");
        let parsed: OrderStatus = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, OrderStatus::Shipped);
        assert!(serde_json::from_str::<OrderStatus>("9").is_err());
    }
}
