pub mod admin;
pub mod auth;
pub mod categories;
pub mod orders;
pub mod products;
pub mod users;

use rust_decimal::Decimal;

use crate::error::AppError;

/// Largest value a NUMERIC(10, 2) column holds: 99999999.99.
pub const MAX_MONEY: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

pub(crate) fn require_text(field: &str, value: &str, max_len: usize) -> Result<(), AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(AppError::validation(format!(
            "{field} must not exceed {max_len} characters"
        )));
    }
    Ok(())
}

pub(crate) fn require_email(value: &str) -> Result<(), AppError> {
    require_text("email", value, 255)?;
    let valid = value
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        });
    if !valid || value.chars().any(char::is_whitespace) {
        return Err(AppError::validation("email must be a valid email address"));
    }
    Ok(())
}

pub(crate) fn require_money(field: &str, value: Decimal) -> Result<(), AppError> {
    if value < Decimal::ZERO {
        return Err(AppError::validation(format!("{field} must be at least 0")));
    }
    if value.round_dp(2) > MAX_MONEY {
        return Err(AppError::validation(format!("{field} is too large")));
    }
    Ok(())
}

pub(crate) fn require_password(value: &str, min_len: usize) -> Result<(), AppError> {
    if value.chars().count() < min_len {
        return Err(AppError::validation(format!(
            "password must be at least {min_len} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_bounds_follow_the_column_type() {
        assert!(require_money("price", dec!(0)).is_ok());
        assert!(require_money("price", dec!(9999999.99)).is_ok());
        assert!(require_money("price", dec!(99999999.99)).is_ok());
        assert!(require_money("price", dec!(100000000.00)).is_err());
        assert!(require_money("price", dec!(-0.01)).is_err());
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(require_email("jane@example.com").is_ok());
        assert!(require_email("jane@localhost").is_err());
        assert!(require_email("@example.com").is_err());
        assert!(require_email("jane doe@example.com").is_err());
        assert!(require_email("").is_err());
    }

    #[test]
    fn text_fields_are_trimmed_and_bounded() {
        assert!(require_text("name", "  ", 10).is_err());
        assert!(require_text("name", "abc", 3).is_ok());
        assert!(require_text("name", "abcd", 3).is_err());
    }
}
