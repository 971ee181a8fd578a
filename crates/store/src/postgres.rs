use async_trait::async_trait;
use common::{DomainError, ErrorKind, OrderId, ProductId, Result, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    entity::{
        Follower, NewOrder, NewProduct, NewUser, Order, OrderLine, OrderLineView, Price, Product,
        ProductUpdate, Profile, ProfileData, User,
    },
    error::{classify_db_error, insufficient_stock},
    repository::{OrderRepository, ProductRepository, ProfileRepository, UserRepository},
};

const UPSERT_PRICE: &str = r#"
    INSERT INTO product_prices (product_id, currency, price)
    VALUES ($1, $2, $3::numeric)
    ON CONFLICT (product_id, currency) DO UPDATE SET price = EXCLUDED.price
"#;

/// PostgreSQL-backed repositories.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store over a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id").map_err(classify_db_error)?),
            name: row.try_get("name").map_err(classify_db_error)?,
            description: row.try_get("description").map_err(classify_db_error)?,
            left_in_stock: row.try_get("left_in_stock").map_err(classify_db_error)?,
            prices: Vec::new(),
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id").map_err(classify_db_error)?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id").map_err(classify_db_error)?),
            number: row.try_get("number").map_err(classify_db_error)?,
        })
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        Ok(User {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id").map_err(classify_db_error)?),
            username: row.try_get("username").map_err(classify_db_error)?,
            password_hash: row.try_get("password_hash").map_err(classify_db_error)?,
        })
    }

    /// Steps of the allocation that run inside the transaction. Returning an
    /// error leaves the transaction to be rolled back by the caller.
    async fn allocate(tx: &mut Transaction<'_, Postgres>, line: &OrderLine) -> Result<()> {
        // FOR UPDATE serializes concurrent allocations of the same product.
        let select = "SELECT left_in_stock FROM products WHERE id = $1 FOR UPDATE";
        tracing::debug!(query = %select, "executing query");
        let left_in_stock: i32 = sqlx::query_scalar(select)
            .bind(line.product_id.as_uuid())
            .fetch_one(&mut **tx)
            .await
            .map_err(classify_db_error)?;

        if line.amount > left_in_stock {
            tracing::debug!(
                product_id = %line.product_id,
                requested = line.amount,
                left_in_stock,
                "not enough stock"
            );
            return Err(insufficient_stock());
        }

        let upsert = r#"
            INSERT INTO user_order_products (order_id, product_id, amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_id, product_id)
            DO UPDATE SET amount = user_order_products.amount + EXCLUDED.amount
        "#;
        tracing::debug!(query = %upsert, "executing query");
        sqlx::query(upsert)
            .bind(line.order_id.as_uuid())
            .bind(line.product_id.as_uuid())
            .bind(line.amount)
            .execute(&mut **tx)
            .await
            .map_err(classify_db_error)?;

        let update = "UPDATE products SET left_in_stock = $1 WHERE id = $2";
        tracing::debug!(query = %update, "executing query");
        sqlx::query(update)
            .bind(left_in_stock - line.amount)
            .bind(line.product_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(classify_db_error)?;

        Ok(())
    }
}

fn expect_affected(rows_affected: u64, what: &str) -> Result<()> {
    if rows_affected == 0 {
        return Err(DomainError::wrap(
            ErrorKind::NotExist,
            crate::error::RECORD_NOT_FOUND,
            format!("{what} not found"),
        ));
    }
    Ok(())
}

#[async_trait]
impl ProductRepository for PostgresStore {
    #[tracing::instrument(skip(self))]
    async fn get_product(&self, id: ProductId) -> Result<Product> {
        let query = "SELECT id, name, description, left_in_stock FROM products WHERE id = $1";
        tracing::debug!(%query, "executing query");
        let row = sqlx::query(query)
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Self::row_to_product(row)
    }

    #[tracing::instrument(skip(self))]
    async fn get_all_products(&self) -> Result<Vec<Product>> {
        let query = "SELECT id, name, description, left_in_stock FROM products ORDER BY name, id";
        tracing::debug!(%query, "executing query");
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn get_prices(&self, id: ProductId) -> Result<Vec<Price>> {
        let query = r#"
            SELECT currency, price::text AS price
            FROM product_prices
            WHERE product_id = $1
            ORDER BY currency
        "#;
        tracing::debug!(%query, "executing query");
        let rows = sqlx::query(query)
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(Price {
                    currency: row.try_get("currency").map_err(classify_db_error)?,
                    price: row.try_get("price").map_err(classify_db_error)?,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    async fn store_product(&self, product: &NewProduct) -> Result<ProductId> {
        let query = r#"
            INSERT INTO products (name, description, left_in_stock)
            VALUES ($1, $2, $3)
            RETURNING id
        "#;
        tracing::debug!(%query, "executing query");
        let id: Uuid = sqlx::query_scalar(query)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.left_in_stock)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Ok(ProductId::from_uuid(id))
    }

    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    async fn store_product_with_prices(&self, product: &NewProduct) -> Result<ProductId> {
        let mut tx = self.pool.begin().await.map_err(classify_db_error)?;

        let query = r#"
            INSERT INTO products (name, description, left_in_stock)
            VALUES ($1, $2, $3)
            RETURNING id
        "#;
        tracing::debug!(%query, "executing query");
        let id: Uuid = sqlx::query_scalar(query)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.left_in_stock)
            .fetch_one(&mut *tx)
            .await
            .map_err(classify_db_error)?;

        tracing::debug!(query = %UPSERT_PRICE, prices = product.prices.len(), "executing query");
        for price in &product.prices {
            sqlx::query(UPSERT_PRICE)
                .bind(id)
                .bind(&price.currency)
                .bind(&price.price)
                .execute(&mut *tx)
                .await
                .map_err(classify_db_error)?;
        }

        tx.commit().await.map_err(classify_db_error)?;
        Ok(ProductId::from_uuid(id))
    }

    #[tracing::instrument(skip(self))]
    async fn update_product(&self, id: ProductId, update: &ProductUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(DomainError::new(ErrorKind::InvalidArgument, "nothing to update"));
        }

        let mut assignments = Vec::new();
        let mut param_count = 0;
        if update.name.is_some() {
            param_count += 1;
            assignments.push(format!("name = ${param_count}"));
        }
        if update.description.is_some() {
            param_count += 1;
            assignments.push(format!("description = ${param_count}"));
        }
        param_count += 1;
        let sql = format!(
            "UPDATE products SET {} WHERE id = ${param_count}",
            assignments.join(", ")
        );
        tracing::debug!(query = %sql, "executing query");

        let mut query = sqlx::query(&sql);
        if let Some(name) = &update.name {
            query = query.bind(name);
        }
        if let Some(description) = &update.description {
            query = query.bind(description);
        }

        let result = query
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        expect_affected(result.rows_affected(), "product")
    }

    #[tracing::instrument(skip(self))]
    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let query = "DELETE FROM products WHERE id = $1";
        tracing::debug!(%query, "executing query");
        let result = sqlx::query(query)
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        expect_affected(result.rows_affected(), "product")
    }

    #[tracing::instrument(skip(self))]
    async fn add_price(&self, id: ProductId, price: &Price) -> Result<()> {
        tracing::debug!(query = %UPSERT_PRICE, "executing query");
        sqlx::query(UPSERT_PRICE)
            .bind(id.as_uuid())
            .bind(&price.currency)
            .bind(&price.price)
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    #[tracing::instrument(skip(self))]
    async fn get_order(&self, id: OrderId) -> Result<Order> {
        let query = "SELECT id, user_id, number FROM user_orders WHERE id = $1";
        tracing::debug!(%query, "executing query");
        let row = sqlx::query(query)
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Self::row_to_order(row)
    }

    #[tracing::instrument(skip(self))]
    async fn get_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let query = "SELECT id, user_id, number FROM user_orders WHERE user_id = $1 ORDER BY number";
        tracing::debug!(%query, "executing query");
        let rows = sqlx::query(query)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn get_order_lines(&self, id: OrderId) -> Result<Vec<OrderLineView>> {
        let query = r#"
            SELECT product_id, amount
            FROM user_order_products
            WHERE order_id = $1
            ORDER BY product_id
        "#;
        tracing::debug!(%query, "executing query");
        let rows = sqlx::query(query)
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderLineView {
                    product_id: ProductId::from_uuid(
                        row.try_get::<Uuid, _>("product_id").map_err(classify_db_error)?,
                    ),
                    amount: row.try_get("amount").map_err(classify_db_error)?,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn store_order(&self, order: &NewOrder) -> Result<OrderId> {
        let query = r#"
            WITH ins_orders AS (
                INSERT INTO user_orders (user_id, number)
                VALUES ($1, $2)
                ON CONFLICT (user_id, number) DO NOTHING
                RETURNING id
            )
            SELECT COALESCE(
                (SELECT id FROM ins_orders),
                (SELECT id FROM user_orders WHERE user_id = $1 AND number = $2)
            ) AS id
        "#;
        tracing::debug!(%query, "executing query");
        let id: Option<Uuid> = sqlx::query_scalar(query)
            .bind(order.user_id.as_uuid())
            .bind(order.number)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_db_error)?;

        if let Some(id) = id {
            return Ok(OrderId::from_uuid(id));
        }

        // A concurrent insert of the same pair committed after this
        // statement's snapshot was taken; a fresh statement sees it.
        let select = "SELECT id FROM user_orders WHERE user_id = $1 AND number = $2";
        tracing::debug!(query = %select, "executing query");
        let id: Uuid = sqlx::query_scalar(select)
            .bind(order.user_id.as_uuid())
            .bind(order.number)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Ok(OrderId::from_uuid(id))
    }

    #[tracing::instrument(skip(self))]
    async fn update_order(&self, order: &Order) -> Result<()> {
        let query = "UPDATE user_orders SET number = $1, user_id = $2 WHERE id = $3";
        tracing::debug!(%query, "executing query");
        let result = sqlx::query(query)
            .bind(order.number)
            .bind(order.user_id.as_uuid())
            .bind(order.id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        expect_affected(result.rows_affected(), "order")
    }

    #[tracing::instrument(skip(self))]
    async fn remove_order(&self, id: OrderId) -> Result<()> {
        let query = "DELETE FROM user_orders WHERE id = $1";
        tracing::debug!(%query, "executing query");
        let result = sqlx::query(query)
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        expect_affected(result.rows_affected(), "order")
    }

    #[tracing::instrument(skip(self))]
    async fn add_product(&self, line: &OrderLine) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            tracing::debug!(error = %e, "start transaction failed");
            classify_db_error(e)
        })?;

        if let Err(err) = Self::allocate(&mut tx, line).await {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            return Err(err);
        }

        tx.commit().await.map_err(|e| {
            tracing::debug!(error = %e, "commit transaction failed");
            classify_db_error(e)
        })
    }

    #[tracing::instrument(skip(self))]
    async fn remove_product(&self, order_id: OrderId, product_id: ProductId) -> Result<()> {
        let query = "DELETE FROM user_order_products WHERE order_id = $1 AND product_id = $2";
        tracing::debug!(%query, "executing query");
        sqlx::query(query)
            .bind(order_id.as_uuid())
            .bind(product_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Ok(())
    }
}

#[async_trait]
impl UserRepository for PostgresStore {
    #[tracing::instrument(skip(self))]
    async fn get_user(&self, id: UserId) -> Result<User> {
        let query = "SELECT id, username, password_hash FROM users WHERE id = $1";
        tracing::debug!(%query, "executing query");
        let row = sqlx::query(query)
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Self::row_to_user(row)
    }

    #[tracing::instrument(skip(self))]
    async fn get_user_by_username(&self, username: &str) -> Result<User> {
        let query = "SELECT id, username, password_hash FROM users WHERE username = $1";
        tracing::debug!(%query, "executing query");
        let row = sqlx::query(query)
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Self::row_to_user(row)
    }

    #[tracing::instrument(skip(self, user), fields(username = %user.username))]
    async fn store_user(&self, user: &NewUser) -> Result<UserId> {
        let query = "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING id";
        tracing::debug!(%query, "executing query");
        let id: Uuid = sqlx::query_scalar(query)
            .bind(&user.username)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Ok(UserId::from_uuid(id))
    }

    #[tracing::instrument(skip(self))]
    async fn add_follower(&self, follower: &Follower) -> Result<()> {
        let query = r#"
            INSERT INTO user_followers (user_id, follower_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, follower_id) DO NOTHING
        "#;
        tracing::debug!(%query, "executing query");
        sqlx::query(query)
            .bind(follower.user_id.as_uuid())
            .bind(follower.follower_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_followers(&self, user_id: UserId) -> Result<Vec<UserId>> {
        let query = "SELECT follower_id FROM user_followers WHERE user_id = $1 ORDER BY follower_id";
        tracing::debug!(%query, "executing query");
        let ids: Vec<Uuid> = sqlx::query_scalar(query)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn remove_follower(&self, follower: &Follower) -> Result<()> {
        let query = "DELETE FROM user_followers WHERE user_id = $1 AND follower_id = $2";
        tracing::debug!(%query, "executing query");
        let result = sqlx::query(query)
            .bind(follower.user_id.as_uuid())
            .bind(follower.follower_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        expect_affected(result.rows_affected(), "follower")
    }
}

#[async_trait]
impl ProfileRepository for PostgresStore {
    #[tracing::instrument(skip(self))]
    async fn get_profile(&self, user_id: UserId) -> Result<Profile> {
        let query = r#"
            SELECT user_id, first_name, last_name, middle_name,
                CONCAT_WS(' ', NULLIF(last_name, ''), NULLIF(first_name, ''), NULLIF(middle_name, ''))
                    AS full_name,
                sex, age
            FROM user_profiles
            WHERE user_id = $1
        "#;
        tracing::debug!(%query, "executing query");
        let row = sqlx::query(query)
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Ok(Profile {
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id").map_err(classify_db_error)?),
            first_name: row.try_get("first_name").map_err(classify_db_error)?,
            last_name: row.try_get("last_name").map_err(classify_db_error)?,
            middle_name: row.try_get("middle_name").map_err(classify_db_error)?,
            full_name: row.try_get("full_name").map_err(classify_db_error)?,
            sex: row.try_get("sex").map_err(classify_db_error)?,
            age: row.try_get("age").map_err(classify_db_error)?,
        })
    }

    #[tracing::instrument(skip(self, data))]
    async fn store_profile(&self, user_id: UserId, data: &ProfileData) -> Result<()> {
        let query = r#"
            INSERT INTO user_profiles (user_id, first_name, last_name, middle_name, sex, age)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#;
        tracing::debug!(%query, "executing query");
        sqlx::query(query)
            .bind(user_id.as_uuid())
            .bind(&data.first_name)
            .bind(&data.last_name)
            .bind(&data.middle_name)
            .bind(&data.sex)
            .bind(data.age)
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        Ok(())
    }

    #[tracing::instrument(skip(self, data))]
    async fn update_profile(&self, user_id: UserId, data: &ProfileData) -> Result<()> {
        let query = r#"
            UPDATE user_profiles
            SET first_name = $1, last_name = $2, middle_name = $3, sex = $4, age = $5
            WHERE user_id = $6
        "#;
        tracing::debug!(%query, "executing query");
        let result = sqlx::query(query)
            .bind(&data.first_name)
            .bind(&data.last_name)
            .bind(&data.middle_name)
            .bind(&data.sex)
            .bind(data.age)
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        expect_affected(result.rows_affected(), "profile")
    }

    #[tracing::instrument(skip(self))]
    async fn remove_profile(&self, user_id: UserId) -> Result<()> {
        let query = "DELETE FROM user_profiles WHERE user_id = $1";
        tracing::debug!(%query, "executing query");
        let result = sqlx::query(query)
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(classify_db_error)?;

        expect_affected(result.rows_affected(), "profile")
    }
}
