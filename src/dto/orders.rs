use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::require_money,
    error::AppError,
    models::{Order, OrderItem, OrderItemDetail, OrderStatus},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlaceOrderItem {
    pub product_id: i64,
    /// Falls back to the product's first variation when absent.
    pub variation_id: Option<i64>,
    pub quantity: i32,
    #[schema(value_type = String, example = "39.98")]
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    #[schema(value_type = String, example = "39.98")]
    pub total_amount: Decimal,
    #[schema(minimum = 0, maximum = 4)]
    pub status: Option<i16>,
    pub items: Vec<PlaceOrderItem>,
}

impl PlaceOrderRequest {
    /// Checks every precondition that needs no database access and returns
    /// the status the order starts in.
    pub fn validate(&self) -> Result<OrderStatus, AppError> {
        require_money("total_amount", self.total_amount)?;
        let status = parse_status(self.status)?.unwrap_or_default();
        if self.items.is_empty() {
            return Err(AppError::validation("items must contain at least one item"));
        }
        for (index, item) in self.items.iter().enumerate() {
            if item.quantity < 1 {
                return Err(AppError::validation(format!(
                    "items.{index}.quantity must be at least 1"
                )));
            }
            require_money(&format!("items.{index}.total_price"), item.total_price)?;
        }
        Ok(status)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    #[schema(value_type = Option<String>)]
    pub total_amount: Option<Decimal>,
    #[schema(minimum = 0, maximum = 4)]
    pub status: Option<i16>,
}

impl UpdateOrderRequest {
    pub fn validate(&self) -> Result<Option<OrderStatus>, AppError> {
        if let Some(total) = self.total_amount {
            require_money("total_amount", total)?;
        }
        parse_status(self.status)
    }
}

pub fn parse_status(code: Option<i16>) -> Result<Option<OrderStatus>, AppError> {
    code.map(OrderStatus::try_from)
        .transpose()
        .map_err(AppError::Validation)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemDetail>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<OrderDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: i32, total_price: Decimal) -> PlaceOrderItem {
        PlaceOrderItem {
            product_id: 1,
            variation_id: None,
            quantity,
            total_price,
        }
    }

    fn request(status: Option<i16>, items: Vec<PlaceOrderItem>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            total_amount: dec!(10.00),
            status,
            items,
        }
    }

    #[test]
    fn status_defaults_to_pending() {
        let status = request(None, vec![item(1, dec!(10.00))]).validate().unwrap();
        assert_eq!(status, OrderStatus::Pending);
        let status = request(Some(4), vec![item(1, dec!(10.00))]).validate().unwrap();
        assert_eq!(status, OrderStatus::Refunded);
    }

    #[test]
    fn rejects_malformed_order_requests() {
        assert!(request(None, vec![]).validate().is_err());
        assert!(request(None, vec![item(0, dec!(1))]).validate().is_err());
        assert!(request(None, vec![item(1, dec!(-1))]).validate().is_err());
        assert!(request(Some(5), vec![item(1, dec!(1))]).validate().is_err());

        let mut negative_total = request(None, vec![item(1, dec!(1))]);
        negative_total.total_amount = dec!(-0.50);
        assert!(negative_total.validate().is_err());
    }

    #[test]
    fn body_accepts_numbers_for_money() {
        let body = r#"{"total_amount": 59.97, "items": [{"product_id": 3, "quantity": 3, "total_price": 59.97}]}"#;
        let parsed: PlaceOrderRequest = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.total_amount, dec!(59.97));
        assert_eq!(parsed.items[0].variation_id, None);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn update_status_uses_the_same_domain() {
        let update = UpdateOrderRequest {
            total_amount: None,
            status: Some(3),
        };
        assert_eq!(update.validate().unwrap(), Some(OrderStatus::Delivered));
        let update = UpdateOrderRequest {
            total_amount: None,
            status: Some(7),
        };
        assert!(update.validate().is_err());
    }
}
