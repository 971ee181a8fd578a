use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{DomainError, ErrorKind, OrderId, ProductId, Result, UserId};
use tokio::sync::Mutex;

use crate::{
    entity::{
        Follower, NewOrder, NewProduct, NewUser, Order, OrderLine, OrderLineView, Price, Product,
        ProductUpdate, Profile, ProfileData, User,
    },
    error::{RECORD_NOT_FOUND, classify_db_error, insufficient_stock},
    repository::{OrderRepository, ProductRepository, ProfileRepository, UserRepository},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    prices: BTreeMap<(ProductId, String), String>,
    orders: BTreeMap<OrderId, Order>,
    lines: BTreeMap<(OrderId, ProductId), i32>,
    users: BTreeMap<UserId, User>,
    profiles: BTreeMap<UserId, Profile>,
    /// `(user_id, follower_id)`
    followers: BTreeSet<(UserId, UserId)>,
}

#[derive(Debug, Default)]
struct Faults {
    connection_lost: bool,
    stock_update: HashSet<ProductId>,
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    faults: Faults,
}

/// In-memory repositories for tests and local runs.
///
/// Mirrors the PostgreSQL implementation: failures are produced as `sqlx`
/// errors and classified by the same function, unique keys and foreign keys
/// are enforced, and transactional operations work on a copy of the tables
/// that replaces the live tables only on commit. A single mutex serializes
/// every operation. Prices are kept verbatim rather than normalized to two
/// decimals.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

fn constraint_violation(constraint: &str) -> DomainError {
    classify_db_error(sqlx::Error::Protocol(format!(
        "violates constraint \"{constraint}\""
    )))
}

fn not_found(what: &str) -> DomainError {
    DomainError::wrap(ErrorKind::NotExist, RECORD_NOT_FOUND, format!("{what} not found"))
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail as if the database connection had
    /// been closed, until reset with `false`.
    pub async fn set_connection_lost(&self, lost: bool) {
        self.state.lock().await.faults.connection_lost = lost;
    }

    /// Makes the stock-decrement step of the next allocations of `product_id`
    /// fail after the order line has been written.
    pub async fn fail_stock_update(&self, product_id: ProductId) {
        self.state.lock().await.faults.stock_update.insert(product_id);
    }

    /// Returns the number of stored order lines.
    pub async fn line_count(&self) -> usize {
        self.state.lock().await.tables.lines.len()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.tables.orders.len()
    }

    /// Clears all tables and faults.
    pub async fn clear(&self) {
        *self.state.lock().await = State::default();
    }

    fn check_connection(state: &State) -> Result<()> {
        if state.faults.connection_lost {
            return Err(classify_db_error(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    fn insert_product(tables: &mut Tables, product: &NewProduct) -> Result<ProductId> {
        if product.left_in_stock < 0 {
            return Err(constraint_violation("left_in_stock_non_negative"));
        }
        let id = ProductId::new();
        tables.products.insert(
            id,
            Product {
                id,
                name: product.name.clone(),
                description: product.description.clone(),
                left_in_stock: product.left_in_stock,
                prices: Vec::new(),
            },
        );
        Ok(id)
    }

    fn upsert_price(tables: &mut Tables, id: ProductId, price: &Price) -> Result<()> {
        if !tables.products.contains_key(&id) {
            return Err(constraint_violation("product_prices_product_id_fkey"));
        }
        if price.currency.chars().count() != 3 {
            return Err(constraint_violation("currency_code_length"));
        }
        tables
            .prices
            .insert((id, price.currency.clone()), price.price.clone());
        Ok(())
    }

    /// Runs the allocation steps against `tables`, which is a working copy.
    fn allocate(tables: &mut Tables, faults: &Faults, line: &OrderLine) -> Result<()> {
        let left_in_stock = tables
            .products
            .get(&line.product_id)
            .map(|p| p.left_in_stock)
            .ok_or_else(|| classify_db_error(sqlx::Error::RowNotFound))?;

        if line.amount > left_in_stock {
            return Err(insufficient_stock());
        }

        if !tables.orders.contains_key(&line.order_id) {
            return Err(constraint_violation("user_order_products_order_id_fkey"));
        }
        if line.amount <= 0 {
            return Err(constraint_violation("amount_positive"));
        }
        let amount = tables
            .lines
            .entry((line.order_id, line.product_id))
            .or_insert(0);
        *amount = amount.checked_add(line.amount).ok_or_else(|| {
            classify_db_error(sqlx::Error::Protocol("integer out of range".to_string()))
        })?;

        if faults.stock_update.contains(&line.product_id) {
            return Err(classify_db_error(sqlx::Error::Protocol(
                "stock update failed".to_string(),
            )));
        }
        if let Some(product) = tables.products.get_mut(&line.product_id) {
            product.left_in_stock = left_in_stock - line.amount;
        }

        Ok(())
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Product> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        state
            .tables
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| classify_db_error(sqlx::Error::RowNotFound))
    }

    async fn get_all_products(&self) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        let mut products: Vec<_> = state.tables.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn get_prices(&self, id: ProductId) -> Result<Vec<Price>> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        Ok(state
            .tables
            .prices
            .iter()
            .filter(|((product_id, _), _)| *product_id == id)
            .map(|((_, currency), price)| Price::new(currency.clone(), price.clone()))
            .collect())
    }

    async fn store_product(&self, product: &NewProduct) -> Result<ProductId> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;
        Self::insert_product(&mut state.tables, product)
    }

    async fn store_product_with_prices(&self, product: &NewProduct) -> Result<ProductId> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        let mut working = state.tables.clone();
        let id = Self::insert_product(&mut working, product)?;
        for price in &product.prices {
            Self::upsert_price(&mut working, id, price)?;
        }

        state.tables = working;
        Ok(id)
    }

    async fn update_product(&self, id: ProductId, update: &ProductUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(DomainError::new(ErrorKind::InvalidArgument, "nothing to update"));
        }
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        let product = state
            .tables
            .products
            .get_mut(&id)
            .ok_or_else(|| not_found("product"))?;
        if let Some(name) = &update.name {
            product.name = name.clone();
        }
        if let Some(description) = &update.description {
            product.description = description.clone();
        }
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        if state.tables.lines.keys().any(|(_, product_id)| *product_id == id) {
            return Err(constraint_violation("user_order_products_product_id_fkey"));
        }
        state
            .tables
            .products
            .remove(&id)
            .ok_or_else(|| not_found("product"))?;
        state.tables.prices.retain(|(product_id, _), _| *product_id != id);
        Ok(())
    }

    async fn add_price(&self, id: ProductId, price: &Price) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;
        Self::upsert_price(&mut state.tables, id, price)
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Order> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        state
            .tables
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| classify_db_error(sqlx::Error::RowNotFound))
    }

    async fn get_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        let mut orders: Vec<_> = state
            .tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.number);
        Ok(orders)
    }

    async fn get_order_lines(&self, id: OrderId) -> Result<Vec<OrderLineView>> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        Ok(state
            .tables
            .lines
            .iter()
            .filter(|((order_id, _), _)| *order_id == id)
            .map(|((_, product_id), amount)| OrderLineView {
                product_id: *product_id,
                amount: *amount,
            })
            .collect())
    }

    async fn store_order(&self, order: &NewOrder) -> Result<OrderId> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        if let Some(existing) = state
            .tables
            .orders
            .values()
            .find(|o| o.user_id == order.user_id && o.number == order.number)
        {
            return Ok(existing.id);
        }

        let id = OrderId::new();
        state.tables.orders.insert(
            id,
            Order {
                id,
                user_id: order.user_id,
                number: order.number,
            },
        );
        Ok(id)
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        let taken = state.tables.orders.values().any(|o| {
            o.id != order.id && o.user_id == order.user_id && o.number == order.number
        });
        if taken {
            return Err(constraint_violation("unique_user_order_number"));
        }
        let existing = state
            .tables
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| not_found("order"))?;
        *existing = order.clone();
        Ok(())
    }

    async fn remove_order(&self, id: OrderId) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        state
            .tables
            .orders
            .remove(&id)
            .ok_or_else(|| not_found("order"))?;
        state.tables.lines.retain(|(order_id, _), _| *order_id != id);
        Ok(())
    }

    async fn add_product(&self, line: &OrderLine) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        let mut working = state.tables.clone();
        Self::allocate(&mut working, &state.faults, line)?;

        state.tables = working;
        Ok(())
    }

    async fn remove_product(&self, order_id: OrderId, product_id: ProductId) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;
        state.tables.lines.remove(&(order_id, product_id));
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn get_user(&self, id: UserId) -> Result<User> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        state
            .tables
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| classify_db_error(sqlx::Error::RowNotFound))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        state
            .tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| classify_db_error(sqlx::Error::RowNotFound))
    }

    async fn store_user(&self, user: &NewUser) -> Result<UserId> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        if state.tables.users.values().any(|u| u.username == user.username) {
            return Err(constraint_violation("unique_username"));
        }
        let id = UserId::new();
        state.tables.users.insert(
            id,
            User {
                id,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
            },
        );
        Ok(id)
    }

    async fn add_follower(&self, follower: &Follower) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        if follower.user_id == follower.follower_id {
            return Err(constraint_violation("follower_not_self"));
        }
        for id in [follower.user_id, follower.follower_id] {
            if !state.tables.users.contains_key(&id) {
                return Err(constraint_violation("user_followers_user_id_fkey"));
            }
        }
        state
            .tables
            .followers
            .insert((follower.user_id, follower.follower_id));
        Ok(())
    }

    async fn get_followers(&self, user_id: UserId) -> Result<Vec<UserId>> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        Ok(state
            .tables
            .followers
            .iter()
            .filter(|(followee, _)| *followee == user_id)
            .map(|(_, follower)| *follower)
            .collect())
    }

    async fn remove_follower(&self, follower: &Follower) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;
        if !state
            .tables
            .followers
            .remove(&(follower.user_id, follower.follower_id))
        {
            return Err(not_found("follower"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryStore {
    async fn get_profile(&self, user_id: UserId) -> Result<Profile> {
        let state = self.state.lock().await;
        Self::check_connection(&state)?;
        state
            .tables
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or_else(|| classify_db_error(sqlx::Error::RowNotFound))
    }

    async fn store_profile(&self, user_id: UserId, data: &ProfileData) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        if !state.tables.users.contains_key(&user_id) {
            return Err(constraint_violation("user_profiles_user_id_fkey"));
        }
        if state.tables.profiles.contains_key(&user_id) {
            return Err(constraint_violation("user_profiles_pkey"));
        }
        state
            .tables
            .profiles
            .insert(user_id, Profile::new(user_id, data));
        Ok(())
    }

    async fn update_profile(&self, user_id: UserId, data: &ProfileData) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;

        let profile = state
            .tables
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| not_found("profile"))?;
        *profile = Profile::new(user_id, data);
        Ok(())
    }

    async fn remove_profile(&self, user_id: UserId) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_connection(&state)?;
        state
            .tables
            .profiles
            .remove(&user_id)
            .map(|_| ())
            .ok_or_else(|| not_found("profile"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(left_in_stock: i32) -> NewProduct {
        NewProduct {
            name: "Widget".to_string(),
            description: "A widget".to_string(),
            left_in_stock,
            prices: vec![Price::new("USD", "9.99"), Price::new("EUR", "8.50")],
        }
    }

    #[tokio::test]
    async fn store_and_get_product() {
        let store = InMemoryStore::new();
        let id = store.store_product(&widget(3)).await.unwrap();

        let product = store.get_product(id).await.unwrap();
        assert_eq!(product.name, "Widget");
        assert_eq!(product.left_in_stock, 3);
        assert!(store.get_prices(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_with_prices_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let mut product = widget(3);
        product.prices.push(Price::new("DOLLARS", "1.00"));

        let err = store.store_product_with_prices(&product).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
        assert!(store.get_all_products().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prices_are_listed_by_currency() {
        let store = InMemoryStore::new();
        let id = store.store_product_with_prices(&widget(3)).await.unwrap();

        let prices = store.get_prices(id).await.unwrap();
        assert_eq!(prices, vec![Price::new("EUR", "8.50"), Price::new("USD", "9.99")]);
    }

    #[tokio::test]
    async fn add_price_replaces_same_currency() {
        let store = InMemoryStore::new();
        let id = store.store_product_with_prices(&widget(3)).await.unwrap();

        store.add_price(id, &Price::new("USD", "12.00")).await.unwrap();

        let prices = store.get_prices(id).await.unwrap();
        assert_eq!(prices.len(), 2);
        assert!(prices.contains(&Price::new("USD", "12.00")));
    }

    #[tokio::test]
    async fn missing_product_is_not_exist() {
        let store = InMemoryStore::new();
        let err = store.get_product(ProductId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
    }

    #[tokio::test]
    async fn lost_connection_is_classified() {
        let store = InMemoryStore::new();
        store.set_connection_lost(true).await;

        let err = store.get_all_products().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatabaseConnection);

        store.set_connection_lost(false).await;
        assert!(store.get_all_products().await.is_ok());
    }

    #[tokio::test]
    async fn update_product_changes_only_given_fields() {
        let store = InMemoryStore::new();
        let id = store.store_product(&widget(3)).await.unwrap();

        let update = ProductUpdate {
            name: Some("Gadget".to_string()),
            ..ProductUpdate::default()
        };
        store.update_product(id, &update).await.unwrap();

        let product = store.get_product(id).await.unwrap();
        assert_eq!(product.name, "Gadget");
        assert_eq!(product.description, "A widget");
        assert_eq!(product.left_in_stock, 3);
    }

    #[test]
    fn line_amount_overflow_is_database_error() {
        let product_id = ProductId::new();
        let order_id = OrderId::new();
        let mut tables = Tables::default();
        tables.products.insert(
            product_id,
            Product {
                id: product_id,
                name: "Widget".to_string(),
                description: String::new(),
                left_in_stock: 1,
                prices: Vec::new(),
            },
        );
        tables.orders.insert(
            order_id,
            Order {
                id: order_id,
                user_id: UserId::new(),
                number: 1,
            },
        );
        tables.lines.insert((order_id, product_id), i32::MAX);

        let line = OrderLine {
            order_id,
            product_id,
            amount: 1,
        };
        let err = InMemoryStore::allocate(&mut tables, &Faults::default(), &line).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Database);
        assert_eq!(tables.lines[&(order_id, product_id)], i32::MAX);
        assert_eq!(tables.products[&product_id].left_in_stock, 1);
    }

    #[tokio::test]
    async fn empty_update_is_invalid_argument() {
        let store = InMemoryStore::new();
        let id = store.store_product(&widget(3)).await.unwrap();

        let err = store
            .update_product(id, &ProductUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn renumbering_onto_taken_number_fails() {
        let store = InMemoryStore::new();
        let user_id = UserId::new();
        store.store_order(&NewOrder { user_id, number: 1 }).await.unwrap();
        let second = store.store_order(&NewOrder { user_id, number: 2 }).await.unwrap();

        let err = store
            .update_order(&Order {
                id: second,
                user_id,
                number: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
    }

    #[tokio::test]
    async fn removing_order_drops_its_lines() {
        let store = InMemoryStore::new();
        let product_id = store.store_product(&widget(5)).await.unwrap();
        let order_id = store
            .store_order(&NewOrder {
                user_id: UserId::new(),
                number: 1,
            })
            .await
            .unwrap();
        store
            .add_product(&OrderLine {
                order_id,
                product_id,
                amount: 2,
            })
            .await
            .unwrap();

        store.remove_order(order_id).await.unwrap();

        assert_eq!(store.line_count().await, 0);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn product_in_use_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let product_id = store.store_product(&widget(5)).await.unwrap();
        let order_id = store
            .store_order(&NewOrder {
                user_id: UserId::new(),
                number: 1,
            })
            .await
            .unwrap();
        store
            .add_product(&OrderLine {
                order_id,
                product_id,
                amount: 1,
            })
            .await
            .unwrap();

        let err = store.delete_product(product_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
    }

    fn account(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    fn person() -> ProfileData {
        ProfileData {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            middle_name: String::new(),
            sex: "w".to_string(),
            age: 36,
        }
    }

    #[tokio::test]
    async fn taken_username_violates_constraint() {
        let store = InMemoryStore::new();
        let id = store.store_user(&account("ada")).await.unwrap();

        let err = store.store_user(&account("ada")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
        assert_eq!(store.get_user_by_username("ada").await.unwrap().id, id);
    }

    #[tokio::test]
    async fn unknown_username_is_not_exist() {
        let store = InMemoryStore::new();
        let err = store.get_user_by_username("nobody").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
    }

    #[tokio::test]
    async fn followers_are_recorded_once() {
        let store = InMemoryStore::new();
        let user_id = store.store_user(&account("ada")).await.unwrap();
        let follower_id = store.store_user(&account("bob")).await.unwrap();
        let follower = Follower { user_id, follower_id };

        store.add_follower(&follower).await.unwrap();
        store.add_follower(&follower).await.unwrap();
        assert_eq!(store.get_followers(user_id).await.unwrap(), vec![follower_id]);

        store.remove_follower(&follower).await.unwrap();
        let err = store.remove_follower(&follower).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
    }

    #[tokio::test]
    async fn profile_needs_an_account_and_is_unique() {
        let store = InMemoryStore::new();
        let err = store.store_profile(UserId::new(), &person()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);

        let user_id = store.store_user(&account("ada")).await.unwrap();
        store.store_profile(user_id, &person()).await.unwrap();
        let err = store.store_profile(user_id, &person()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);

        let profile = store.get_profile(user_id).await.unwrap();
        assert_eq!(profile.full_name, "Lovelace Ada");
    }
}
