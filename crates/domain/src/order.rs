//! Order use cases.

use std::time::Duration;

use common::{Cause, DomainError, ErrorKind, OrderId, ProductId, Result, UserId, WrapErr};
use store::{NewOrder, Order, OrderLine, OrderLineView, OrderRepository};

use crate::deadline::{DEFAULT_TIMEOUT, with_deadline};
use crate::validation;

const REPO_ERROR: &str = "error from orders repo";

/// Service for managing orders and allocating products to them.
///
/// Every call that names an existing order takes the caller's [`UserId`]
/// and fails with `NotPermitted` when the order belongs to someone else.
pub struct OrderService<R: OrderRepository> {
    repo: R,
    timeout: Duration,
}

impl<R: OrderRepository> OrderService<R> {
    /// Creates a new order service over a repository.
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

    async fn owned_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self.repo.get_order(order_id).await?;
        if order.user_id != user_id {
            return Err(DomainError::new(
                ErrorKind::NotPermitted,
                "order belongs to another user",
            ));
        }
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        with_deadline(self.timeout, self.owned_order(user_id, order_id))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_all_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        with_deadline(self.timeout, self.repo.get_orders_by_user(user_id))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    /// Lists the products allocated to an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_lines(&self, user_id: UserId, order_id: OrderId) -> Result<Vec<OrderLineView>> {
        with_deadline(self.timeout, async {
            self.owned_order(user_id, order_id).await?;
            self.repo.get_order_lines(order_id).await
        })
        .await
        .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    /// Creates an order, or returns the existing one with the same
    /// `(user_id, number)`. Safe to retry.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, order: NewOrder) -> Result<OrderId> {
        validation::validate_new_order(&order).map_err(|e| {
            DomainError::wrap(ErrorKind::Validation, Cause::opaque(e), "order validation error")
        })?;

        let id = with_deadline(self.timeout, self.repo.store_order(&order))
            .await
            .wrap_err(ErrorKind::Database, REPO_ERROR)?;

        metrics::counter!("order_create_calls_total").increment(1);
        tracing::info!(%id, number = order.number, "order stored");
        Ok(id)
    }

    /// Renumbers an order. The owner cannot be changed.
    #[tracing::instrument(skip(self))]
    pub async fn update(&self, user_id: UserId, order: Order) -> Result<()> {
        validation::validate_order(&order).map_err(|e| {
            DomainError::wrap(ErrorKind::Validation, Cause::opaque(e), "order validation error")
        })?;
        if order.user_id != user_id {
            return Err(DomainError::new(
                ErrorKind::NotPermitted,
                "order cannot be moved to another user",
            ));
        }

        with_deadline(self.timeout, async {
            self.owned_order(user_id, order.id).await?;
            self.repo.update_order(&order).await
        })
        .await
        .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, user_id: UserId, order_id: OrderId) -> Result<()> {
        with_deadline(self.timeout, async {
            self.owned_order(user_id, order_id).await?;
            self.repo.remove_order(order_id).await
        })
        .await
        .wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    /// Allocates `line.amount` of a product to an order, decrementing its
    /// stock. Repeating the call adds to the same line.
    ///
    /// Fails with `Logic` when the stock is short; the order line and the
    /// stock are then left as they were.
    #[tracing::instrument(skip(self))]
    pub async fn add_product(&self, user_id: UserId, line: OrderLine) -> Result<()> {
        validation::validate_order_line(&line).map_err(|e| {
            DomainError::wrap(
                ErrorKind::Validation,
                Cause::opaque(e),
                "order product validation error",
            )
        })?;

        let result = with_deadline(self.timeout, async {
            self.owned_order(user_id, line.order_id).await?;
            self.repo.add_product(&line).await
        })
        .await;

        match &result {
            Ok(()) => {
                metrics::counter!("order_lines_allocated_total").increment(1);
                tracing::info!(
                    order_id = %line.order_id,
                    product_id = %line.product_id,
                    amount = line.amount,
                    "product allocated"
                );
            }
            Err(err) if err.kind() == ErrorKind::Logic => {
                metrics::counter!("allocation_rejected_total").increment(1);
            }
            Err(_) => {}
        }

        result.wrap_err(ErrorKind::Database, REPO_ERROR)
    }

    /// Deletes an order line. The product's stock is not restored.
    #[tracing::instrument(skip(self))]
    pub async fn remove_product(
        &self,
        user_id: UserId,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<()> {
        with_deadline(self.timeout, async {
            self.owned_order(user_id, order_id).await?;
            self.repo.remove_product(order_id, product_id).await
        })
        .await
        .wrap_err(ErrorKind::Database, REPO_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use store::{InMemoryStore, NewProduct, ProductRepository};

    use super::*;

    struct Fixture {
        store: InMemoryStore,
        service: OrderService<InMemoryStore>,
        user_id: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            let store = InMemoryStore::new();
            Self {
                service: OrderService::new(store.clone()),
                store,
                user_id: UserId::new(),
            }
        }

        async fn product(&self, left_in_stock: i32) -> ProductId {
            self.store
                .store_product(&NewProduct {
                    name: "P1".to_string(),
                    description: String::new(),
                    left_in_stock,
                    prices: vec![],
                })
                .await
                .unwrap()
        }

        async fn order(&self, number: i32) -> OrderId {
            self.service
                .create(NewOrder {
                    user_id: self.user_id,
                    number,
                })
                .await
                .unwrap()
        }

        async fn stock(&self, id: ProductId) -> i32 {
            self.store.get_product(id).await.unwrap().left_in_stock
        }
    }

    #[tokio::test]
    async fn create_twice_returns_same_id() {
        let fx = Fixture::new();

        let first = fx.order(9).await;
        let second = fx.order(9).await;

        assert_eq!(first, second);
        assert_eq!(fx.service.get_all_by_user(fx.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_number_is_validation() {
        let fx = Fixture::new();

        let err = fx
            .service
            .create(NewOrder {
                user_id: fx.user_id,
                number: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn add_product_twice_accumulates() {
        let fx = Fixture::new();
        let product_id = fx.product(10).await;
        let order_id = fx.order(1).await;
        let line = OrderLine {
            order_id,
            product_id,
            amount: 3,
        };

        fx.service.add_product(fx.user_id, line).await.unwrap();
        fx.service.add_product(fx.user_id, line).await.unwrap();

        let lines = fx.service.get_lines(fx.user_id, order_id).await.unwrap();
        assert_eq!(lines, vec![OrderLineView { product_id, amount: 6 }]);
        assert_eq!(fx.stock(product_id).await, 4);
    }

    #[tokio::test]
    async fn short_stock_is_logic_through_service_wrap() {
        let fx = Fixture::new();
        let product_id = fx.product(5).await;
        let order_id = fx.order(1).await;

        fx.service
            .add_product(
                fx.user_id,
                OrderLine {
                    order_id,
                    product_id,
                    amount: 5,
                },
            )
            .await
            .unwrap();
        let err = fx
            .service
            .add_product(
                fx.user_id,
                OrderLine {
                    order_id,
                    product_id,
                    amount: 1,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.own_kind(), ErrorKind::Database);
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert_eq!(
            err.describe(),
            "error from orders repo: not enough amount in stock: logical error"
        );
        assert_eq!(fx.stock(product_id).await, 0);
    }

    #[tokio::test]
    async fn zero_amount_is_validation() {
        let fx = Fixture::new();
        let product_id = fx.product(5).await;
        let order_id = fx.order(1).await;

        let err = fx
            .service
            .add_product(
                fx.user_id,
                OrderLine {
                    order_id,
                    product_id,
                    amount: 0,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(fx.stock(product_id).await, 5);
    }

    #[tokio::test]
    async fn foreign_order_is_not_permitted() {
        let fx = Fixture::new();
        let product_id = fx.product(5).await;
        let order_id = fx.order(1).await;
        let stranger = UserId::new();

        let err = fx.service.get_by_id(stranger, order_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPermitted);

        let err = fx
            .service
            .add_product(
                stranger,
                OrderLine {
                    order_id,
                    product_id,
                    amount: 1,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPermitted);
        assert_eq!(fx.stock(product_id).await, 5);
    }

    #[tokio::test]
    async fn update_cannot_change_owner() {
        let fx = Fixture::new();
        let order_id = fx.order(1).await;

        let err = fx
            .service
            .update(
                fx.user_id,
                Order {
                    id: order_id,
                    user_id: UserId::new(),
                    number: 2,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPermitted);

        fx.service
            .update(
                fx.user_id,
                Order {
                    id: order_id,
                    user_id: fx.user_id,
                    number: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(fx.service.get_by_id(fx.user_id, order_id).await.unwrap().number, 2);
    }

    #[tokio::test]
    async fn missing_order_is_not_exist() {
        let fx = Fixture::new();

        let err = fx.service.remove(fx.user_id, OrderId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
    }

    #[tokio::test]
    async fn remove_product_keeps_stock() {
        let fx = Fixture::new();
        let product_id = fx.product(8).await;
        let order_id = fx.order(1).await;
        fx.service
            .add_product(
                fx.user_id,
                OrderLine {
                    order_id,
                    product_id,
                    amount: 3,
                },
            )
            .await
            .unwrap();

        fx.service
            .remove_product(fx.user_id, order_id, product_id)
            .await
            .unwrap();

        assert!(fx.service.get_lines(fx.user_id, order_id).await.unwrap().is_empty());
        assert_eq!(fx.stock(product_id).await, 5);
    }

    /// Repository whose allocation never finishes.
    struct StalledRepo {
        inner: InMemoryStore,
        started: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl OrderRepository for StalledRepo {
        async fn get_order(&self, id: OrderId) -> Result<Order> {
            self.inner.get_order(id).await
        }
        async fn get_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
            self.inner.get_orders_by_user(user_id).await
        }
        async fn get_order_lines(&self, id: OrderId) -> Result<Vec<OrderLineView>> {
            self.inner.get_order_lines(id).await
        }
        async fn store_order(&self, order: &NewOrder) -> Result<OrderId> {
            self.inner.store_order(order).await
        }
        async fn update_order(&self, order: &Order) -> Result<()> {
            self.inner.update_order(order).await
        }
        async fn remove_order(&self, id: OrderId) -> Result<()> {
            self.inner.remove_order(id).await
        }
        async fn add_product(&self, _line: &OrderLine) -> Result<()> {
            self.started.notify_one();
            std::future::pending().await
        }
        async fn remove_product(&self, order_id: OrderId, product_id: ProductId) -> Result<()> {
            self.inner.remove_product(order_id, product_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_allocation_times_out_as_io() {
        let inner = InMemoryStore::new();
        let user_id = UserId::new();
        let order_id = inner
            .store_order(&NewOrder { user_id, number: 1 })
            .await
            .unwrap();
        let started = Arc::new(tokio::sync::Notify::new());
        let service = OrderService::new(StalledRepo {
            inner,
            started: started.clone(),
        })
        .with_timeout(Duration::from_millis(50));

        let err = service
            .add_product(
                user_id,
                OrderLine {
                    order_id,
                    product_id: ProductId::new(),
                    amount: 1,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IO);
        started.notified().await;
    }
}
