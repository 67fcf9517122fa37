use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::{require_money, require_text},
    error::AppError,
    models::Product,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VariationInput {
    /// Existing variation to update; a new variation is created when absent.
    pub id: Option<i64>,
    pub size: String,
    pub color: String,
    pub stock: i32,
}

impl VariationInput {
    fn validate(&self, index: usize) -> Result<(), AppError> {
        require_text(&format!("variations.{index}.size"), &self.size, 50)?;
        require_text(&format!("variations.{index}.color"), &self.color, 100)?;
        if self.stock < 0 {
            return Err(AppError::validation(format!(
                "variations.{index}.stock must be at least 0"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub category_id: i64,
    pub name: String,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    pub description: Option<String>,
    pub picture: Option<String>,
    pub variations: Vec<VariationInput>,
}

impl CreateProductRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("name", &self.name, 255)?;
        require_money("price", self.price)?;
        if self.variations.is_empty() {
            return Err(AppError::validation("at least one variation is required"));
        }
        for (index, variation) in self.variations.iter().enumerate() {
            if variation.id.is_some() {
                return Err(AppError::validation(format!(
                    "variations.{index}.id is not allowed when creating a product"
                )));
            }
            variation.validate(index)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub category_id: Option<i64>,
    pub name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub picture: Option<String>,
    pub variations: Option<Vec<VariationInput>>,
}

impl UpdateProductRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            require_text("name", name, 255)?;
        }
        if let Some(price) = self.price {
            require_money("price", price)?;
        }
        for (index, variation) in self.variations.iter().flatten().enumerate() {
            variation.validate(index)?;
        }
        Ok(())
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn variation(stock: i32) -> VariationInput {
        VariationInput {
            id: None,
            size: "M".into(),
            color: "Black".into(),
            stock,
        }
    }

    fn create(variations: Vec<VariationInput>) -> CreateProductRequest {
        CreateProductRequest {
            category_id: 1,
            name: "Hoodie".into(),
            price: dec!(49.90),
            description: None,
            picture: None,
            variations,
        }
    }

    #[test]
    fn product_needs_a_variation() {
        assert!(create(vec![]).validate().is_err());
        assert!(create(vec![variation(3)]).validate().is_ok());
    }

    #[test]
    fn negative_stock_is_rejected() {
        let err = create(vec![variation(-1)]).validate().unwrap_err();
        assert_eq!(err.to_string(), "variations.0.stock must be at least 0");
    }
}
