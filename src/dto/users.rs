use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::{auth::ADMIN_PASSWORD_MIN, require_email, require_password, require_text},
    error::AppError,
    models::User,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("first_name", &self.first_name, 255)?;
        require_text("last_name", &self.last_name, 255)?;
        require_email(&self.email)?;
        require_password(&self.password, ADMIN_PASSWORD_MIN)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Left unchanged when absent or empty.
    pub password: Option<String>,
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("first_name", &self.first_name, 255)?;
        require_text("last_name", &self.last_name, 255)?;
        require_email(&self.email)?;
        match self.new_password() {
            Some(password) => require_password(password, ADMIN_PASSWORD_MIN),
            None => Ok(()),
        }
    }

    pub fn new_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub items: Vec<User>,
}
