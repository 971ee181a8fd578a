use async_trait::async_trait;
use common::{OrderId, ProductId, Result, UserId};

use crate::entity::{
    Follower, NewOrder, NewProduct, NewUser, Order, OrderLine, OrderLineView, Price, Product,
    ProductUpdate, Profile, ProfileData, User,
};

/// Persistence of products and their prices.
///
/// All implementations must be thread-safe (Send + Sync) and must return
/// errors already classified by [`crate::classify_db_error`].
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Loads a product without its prices.
    ///
    /// Fails with `NotExist` if there is no such product.
    async fn get_product(&self, id: ProductId) -> Result<Product>;

    /// Loads every product, ordered by name.
    async fn get_all_products(&self) -> Result<Vec<Product>>;

    /// Loads the prices of a product, ordered by currency.
    async fn get_prices(&self, id: ProductId) -> Result<Vec<Price>>;

    /// Inserts a product, ignoring `product.prices`.
    async fn store_product(&self, product: &NewProduct) -> Result<ProductId>;

    /// Inserts a product and all of its prices atomically.
    async fn store_product_with_prices(&self, product: &NewProduct) -> Result<ProductId>;

    /// Applies a partial update. Fails with `NotExist` if nothing matched.
    async fn update_product(&self, id: ProductId, update: &ProductUpdate) -> Result<()>;

    /// Deletes a product. Fails with `NotExist` if nothing matched.
    async fn delete_product(&self, id: ProductId) -> Result<()>;

    /// Inserts a price or replaces the price in the same currency.
    async fn add_price(&self, id: ProductId, price: &Price) -> Result<()>;
}

/// Persistence of orders and their lines.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Order>;

    /// Loads the orders of a user, ordered by number.
    async fn get_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Loads the lines of an order, ordered by product id.
    async fn get_order_lines(&self, id: OrderId) -> Result<Vec<OrderLineView>>;

    /// Inserts an order or, if `(user_id, number)` already exists, returns
    /// the id of the existing row. Retrying with the same input always
    /// yields the same id.
    async fn store_order(&self, order: &NewOrder) -> Result<OrderId>;

    async fn update_order(&self, order: &Order) -> Result<()>;

    async fn remove_order(&self, id: OrderId) -> Result<()>;

    /// Allocates stock to an order in one transaction.
    ///
    /// Reads the product's stock, rejects the call with `Logic` if the stock
    /// is short, adds `line.amount` to the existing line (or inserts it) and
    /// decrements the stock. Either all of it commits or none of it does.
    async fn add_product(&self, line: &OrderLine) -> Result<()>;

    /// Deletes an order line. Stock is not restored.
    async fn remove_product(&self, order_id: OrderId, product_id: ProductId) -> Result<()>;
}

/// Persistence of accounts and of who follows whom.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<User>;

    /// Fails with `NotExist` if no account has this username.
    async fn get_user_by_username(&self, username: &str) -> Result<User>;

    /// Inserts an account. A taken username violates a unique constraint.
    async fn store_user(&self, user: &NewUser) -> Result<UserId>;

    /// Records a follower. Recording the same pair twice is a no-op.
    async fn add_follower(&self, follower: &Follower) -> Result<()>;

    /// Lists the followers of a user, ordered by id.
    async fn get_followers(&self, user_id: UserId) -> Result<Vec<UserId>>;

    /// Fails with `NotExist` if the pair was not recorded.
    async fn remove_follower(&self, follower: &Follower) -> Result<()>;
}

/// Persistence of user profiles, keyed by user.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fails with `NotExist` if the user has no profile.
    async fn get_profile(&self, user_id: UserId) -> Result<Profile>;

    /// Inserts a profile. A second profile for the same user violates the
    /// primary key.
    async fn store_profile(&self, user_id: UserId, data: &ProfileData) -> Result<()>;

    async fn update_profile(&self, user_id: UserId, data: &ProfileData) -> Result<()>;

    async fn remove_profile(&self, user_id: UserId) -> Result<()>;
}
