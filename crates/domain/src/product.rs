//! Product use cases.

use std::time::Duration;

use common::{Cause, DomainError, ErrorKind, ProductId, Result, WrapErr};
use store::{NewProduct, Price, Product, ProductRepository, ProductUpdate};

use crate::deadline::{DEFAULT_TIMEOUT, with_deadline};
use crate::validation;

const REPO_ERROR: &str = "error from product repo";

fn invalid(err: validation::ValidationError, message: &str) -> DomainError {
    DomainError::wrap(ErrorKind::Validation, Cause::opaque(err), message)
}

/// Service for managing products and their prices.
pub struct ProductService<R: ProductRepository> {
    repo: R,
    timeout: Duration,
}

impl<R: ProductRepository> ProductService<R> {
    /// Creates a new product service over a repository.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the deadline applied to every call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Loads a product together with its prices.
    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: ProductId) -> Result<Product> {
        with_deadline(self.timeout, async {
            let mut product = self.repo.get_product(id).await?;
            product.prices = self.repo.get_prices(id).await?;
            Ok(product)
        })
        .await
        .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<Product>> {
        with_deadline(self.timeout, self.repo.get_all_products())
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    /// Creates a product. Prices, if any, are stored in the same
    /// transaction as the product.
    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create(&self, product: NewProduct) -> Result<ProductId> {
        validation::validate_new_product(&product)
            .map_err(|e| invalid(e, "product validation error"))?;

        let stored = if product.prices.is_empty() {
            with_deadline(self.timeout, self.repo.store_product(&product)).await
        } else {
            with_deadline(self.timeout, self.repo.store_product_with_prices(&product)).await
        };
        let id = stored.wrap_err(ErrorKind::Database, REPO_ERROR)?;

        tracing::info!(%id, "product created");
        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: ProductId, update: ProductUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(DomainError::new(
                ErrorKind::InvalidArgument,
                "product update has no fields",
            ));
        }
        validation::validate_product_update(&update)
            .map_err(|e| invalid(e, "product validation error"))?;

        with_deadline(self.timeout, self.repo.update_product(id, &update))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, id: ProductId) -> Result<()> {
        with_deadline(self.timeout, self.repo.delete_product(id))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    /// Sets the price of a product in one currency.
    #[tracing::instrument(skip(self))]
    pub async fn add_price(&self, id: ProductId, price: Price) -> Result<()> {
        validation::validate_price(&price).map_err(|e| invalid(e, "price validation error"))?;

        with_deadline(self.timeout, async {
            // Surface a missing product as NotExist rather than a foreign key error.
            self.repo.get_product(id).await?;
            self.repo.add_price(id, &price).await
        })
        .await
        .wrap_err(ErrorKind::Database, REPO_ERROR)
    }
}
