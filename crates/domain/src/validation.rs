//! Input validation rules.

use std::fmt;

use store::{Follower, NewOrder, NewProduct, Order, OrderLine, Price, ProductUpdate, ProfileData};
use thiserror::Error;

/// A rule broken by one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Every rule broken by an input, in field order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join(.0))]
pub struct ValidationError(pub Vec<FieldError>);

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Default)]
struct Checker(Vec<FieldError>);

impl Checker {
    fn check(&mut self, ok: bool, field: &'static str, reason: &str) -> &mut Self {
        if !ok {
            self.0.push(FieldError {
                field,
                reason: reason.to_string(),
            });
        }
        self
    }

    fn finish(&mut self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError(std::mem::take(&mut self.0)))
        }
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Accepts `123`, `123.4` and `123.45`.
fn is_price(text: &str) -> bool {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    !whole.is_empty()
        && whole.len() <= 12
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.len() <= 2
        && fraction.chars().all(|c| c.is_ascii_digit())
        && !(text.contains('.') && fraction.is_empty())
}

pub fn validate_price(price: &Price) -> Result<(), ValidationError> {
    Checker::default()
        .check(
            is_currency_code(&price.currency),
            "currency",
            "must be a three-letter uppercase code",
        )
        .check(
            is_price(&price.price),
            "price",
            "must be a non-negative decimal with at most two fraction digits",
        )
        .finish()
}

pub fn validate_new_product(product: &NewProduct) -> Result<(), ValidationError> {
    let mut checker = Checker::default();
    checker
        .check(!product.name.trim().is_empty(), "name", "cannot be blank")
        .check(product.left_in_stock >= 0, "left_in_stock", "cannot be negative");
    for price in &product.prices {
        if let Err(ValidationError(errors)) = validate_price(price) {
            checker.0.extend(errors);
        }
    }
    checker.finish()
}

pub fn validate_product_update(update: &ProductUpdate) -> Result<(), ValidationError> {
    Checker::default()
        .check(
            update.name.as_deref().is_none_or(|name| !name.trim().is_empty()),
            "name",
            "cannot be blank",
        )
        .finish()
}

pub fn validate_new_order(order: &NewOrder) -> Result<(), ValidationError> {
    Checker::default()
        .check(order.number > 0, "number", "must be positive")
        .finish()
}

pub fn validate_order(order: &Order) -> Result<(), ValidationError> {
    Checker::default()
        .check(order.number > 0, "number", "must be positive")
        .finish()
}

pub fn validate_order_line(line: &OrderLine) -> Result<(), ValidationError> {
    Checker::default()
        .check(line.amount >= 1, "amount", "must be at least 1")
        .finish()
}

pub fn validate_credentials(username: &str, password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();
    Checker::default()
        .check(!username.trim().is_empty(), "username", "cannot be blank")
        .check(
            (6..=100).contains(&length),
            "password",
            "must be 6 to 100 characters long",
        )
        .finish()
}

pub fn validate_profile(profile: &ProfileData) -> Result<(), ValidationError> {
    Checker::default()
        .check(!profile.first_name.trim().is_empty(), "first_name", "cannot be blank")
        .check(!profile.last_name.trim().is_empty(), "last_name", "cannot be blank")
        .check(profile.sex.chars().count() == 1, "sex", "must be a single letter")
        .check(profile.age > 0, "age", "must be positive")
        .finish()
}

pub fn validate_follower(follower: &Follower) -> Result<(), ValidationError> {
    Checker::default()
        .check(
            follower.user_id != follower.follower_id,
            "follower_id",
            "cannot follow oneself",
        )
        .finish()
}
