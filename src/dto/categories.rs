use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dto::require_text, error::AppError, models::Category};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

impl CategoryRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("name", &self.name, 255)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryList {
    pub items: Vec<Category>,
}
