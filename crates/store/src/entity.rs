//! Rows persisted by the repositories.

use common::{OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// A price of a product in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// ISO 4217 code, three letters.
    pub currency: String,
    /// Decimal amount kept as text to avoid float rounding.
    pub price: String,
}

impl Price {
    pub fn new(currency: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            price: price.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub left_in_stock: i32,
    #[serde(default)]
    pub prices: Vec<Price>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub left_in_stock: i32,
    #[serde(default)]
    pub prices: Vec<Price>,
}

/// Partial update of a product. `None` fields are left untouched.
///
/// Stock is not part of it: it is set at creation and afterwards only
/// decremented by allocating the product to an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ProductUpdate {
    /// Returns true when no field would change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// An order owned by a user. `(user_id, number)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub number: i32,
}

/// Input for creating an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub number: i32,
}

/// A quantity of a product allocated to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub amount: i32,
}

/// An order line as listed under its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineView {
    pub product_id: ProductId,
    pub amount: i32,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// Input for storing an account. The password is already hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}

/// Personal data of a user as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub middle_name: String,
    /// `m` or `w`.
    pub sex: String,
    pub age: i32,
}

/// A stored profile. Each user has at most one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub full_name: String,
    pub sex: String,
    pub age: i32,
}

impl Profile {
    pub fn new(user_id: UserId, data: &ProfileData) -> Self {
        let full_name = [&data.last_name, &data.first_name, &data.middle_name]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            user_id,
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            middle_name: data.middle_name.clone(),
            full_name,
            sex: data.sex.clone(),
            age: data.age,
        }
    }
}

/// `follower_id` follows `user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follower {
    pub user_id: UserId,
    pub follower_id: UserId,
}
