//! Storage layer for users, profiles, products and orders.
//!
//! Repositories return [`common::DomainError`]s that have already been
//! classified by [`classify_db_error`]; nothing above this crate inspects
//! driver errors.

pub mod entity;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use entity::{
    Follower, NewOrder, NewProduct, NewUser, Order, OrderLine, OrderLineView, Price, Product,
    ProductUpdate, Profile, ProfileData, User,
};
pub use error::classify_db_error;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{OrderRepository, ProductRepository, ProfileRepository, UserRepository};
