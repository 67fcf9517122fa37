use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::{require_email, require_password, require_text},
    error::AppError,
    middleware::auth::Role,
    models::{Admin, User},
};

pub const USER_PASSWORD_MIN: usize = 8;
pub const ADMIN_PASSWORD_MIN: usize = 6;

#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text("first_name", &self.first_name, 255)?;
        require_text("last_name", &self.last_name, 255)?;
        require_email(&self.email)?;
        require_password(&self.password, USER_PASSWORD_MIN)?;
        if self.password != self.password_confirmation {
            return Err(AppError::validation("password confirmation does not match"));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_email(&self.email)?;
        if self.password.is_empty() {
            return Err(AppError::validation("password is required"));
        }
        Ok(())
    }

    pub fn validate_admin(&self) -> Result<(), AppError> {
        self.validate()?;
        require_password(&self.password, ADMIN_PASSWORD_MIN)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminAuthPayload {
    pub admin: Admin,
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(password: &str, confirmation: &str) -> RegisterRequest {
        RegisterRequest {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "jane@example.com".into(),
            password: password.into(),
            password_confirmation: confirmation.into(),
        }
    }

    #[test]
    fn registration_requires_matching_long_password() {
        assert!(register("longenough", "longenough").validate().is_ok());
        assert!(register("short", "short").validate().is_err());
        assert!(register("longenough", "different1").validate().is_err());
    }
}
