//! Shared types for the orders service.
//!
//! - Strongly typed identifiers for users, orders and products
//! - The domain error taxonomy ([`DomainError`], [`ErrorKind`]) that every
//!   layer uses to classify failures

pub mod errs;
pub mod types;

pub use errs::{Cause, DomainError, ErrorKind, Result, WrapErr};
pub use types::{OrderId, ProductId, UserId};
