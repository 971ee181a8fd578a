//! Use cases of the orders service.
//!
//! Services validate input, enforce ownership, call the repositories and
//! wrap every repository failure in one more [`common::DomainError`] layer.
//! Wrapping never changes the classification produced by the store.

mod deadline;
pub mod order;
pub mod password;
pub mod product;
pub mod profile;
pub mod user;
pub mod validation;

pub use deadline::DEFAULT_TIMEOUT;
pub use order::OrderService;
pub use password::{PasswordHasher, Sha256Hasher};
pub use product::ProductService;
pub use profile::ProfileService;
pub use user::UserService;
pub use validation::{FieldError, ValidationError};
