use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{CartId, Money, OrderId, PaymentId, ProductId, SellerId};
use domain::{
    Cart, FulfillmentJob, Order, OwnerKey, PaymentRecord, Product, SellerOrderView, StockChange,
};
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    CartRepository, FulfillmentJobRepository, OrderRepository, PaymentRepository,
    ProductRepository, Result, SellerOrderRepository, StoreError,
};

/// PostgreSQL-backed store.
///
/// Aggregates are stored as JSONB documents next to the columns queries
/// filter on. Versioned tables use `WHERE version = $expected` updates.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let stock: i64 = row.try_get("stock")?;
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            seller_id: SellerId::new(row.try_get::<String, _>("seller_id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: u32::try_from(stock.max(0)).unwrap_or(u32::MAX),
            active: row.try_get("active")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Fails with `NotFound` or `ConcurrencyConflict` after a versioned
    /// update touched no rows.
    async fn version_mismatch(
        &self,
        table: &'static str,
        entity: &'static str,
        key_sql: &str,
        id: String,
        expected: u64,
    ) -> StoreError {
        let sql = format!("SELECT version FROM {table} WHERE {key_sql}");
        let actual: std::result::Result<Option<i64>, sqlx::Error> = sqlx::query_scalar(&sql)
            .bind(&id)
            .fetch_optional(&self.pool)
            .await;
        match actual {
            Ok(Some(actual)) => StoreError::ConcurrencyConflict {
                entity,
                id,
                expected,
                actual: actual as u64,
            },
            Ok(None) => StoreError::NotFound { entity, id },
            Err(e) => StoreError::Database(e),
        }
    }
}

fn document<T: DeserializeOwned>(row: &PgRow) -> Result<T> {
    let value: serde_json::Value = row.try_get("document")?;
    Ok(serde_json::from_value(value)?)
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

async fn insert_job(tx: &mut Transaction<'_, Postgres>, job: &FulfillmentJob) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO fulfillment_jobs (order_id, status, attempts, document, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (order_id) DO UPDATE
        SET status = EXCLUDED.status,
            attempts = EXCLUDED.attempts,
            document = EXCLUDED.document,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(job.order_id.as_uuid())
    .bind(job.status.as_str())
    .bind(job.attempts as i32)
    .bind(serde_json::to_value(job)?)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl CartRepository for PostgresStore {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query("SELECT document FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| document(&r)).transpose()
    }

    async fn find_active_cart(&self, owner_key: &OwnerKey) -> Result<Option<Cart>> {
        let row = sqlx::query(
            r#"
            SELECT document FROM carts
            WHERE owner_key = $1 AND status = 'active'
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner_key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| document(&r)).transpose()
    }

    async fn save_cart(&self, cart: &Cart) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO carts (id, owner_key, status, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            WHERE carts.status = 'active'
            "#,
        )
        .bind(cart.id().as_uuid())
        .bind(cart.owner_key().as_str())
        .bind(cart.status().as_str())
        .bind(serde_json::to_value(cart)?)
        .bind(cart.created_at())
        .bind(cart.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_idle_carts(&self, before: DateTime<Utc>) -> Result<Vec<Cart>> {
        let rows = sqlx::query(
            "SELECT document FROM carts WHERE status = 'active' AND updated_at < $1 ORDER BY updated_at",
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document).collect()
    }
}

#[async_trait]
impl ProductRepository for PostgresStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, seller_id, name, price_cents, stock, active, updated_at FROM products WHERE id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, seller_id, name, price_cents, stock, active, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET seller_id = EXCLUDED.seller_id,
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id.as_str())
        .bind(product.seller_id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .bind(product.active)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_price(&self, product_id: &ProductId, price: Money) -> Result<()> {
        let result =
            sqlx::query("UPDATE products SET price_cents = $2, updated_at = NOW() WHERE id = $1")
                .bind(product_id.as_str())
                .bind(price.cents())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", product_id));
        }
        Ok(())
    }

    async fn decrement_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: Option<OrderId>,
    ) -> Result<Option<StockChange>> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent decrements of the same product.
        let row = sqlx::query(
            r#"
            SELECT id, seller_id, name, price_cents, stock, active, updated_at
            FROM products WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("product", product_id))?;
        let mut product = Self::row_to_product(row)?;

        if let Some(order_id) = order_id {
            let applied: Option<i32> = sqlx::query_scalar(
                "SELECT 1 FROM stock_movements WHERE order_id = $1 AND product_id = $2",
            )
            .bind(order_id.as_uuid())
            .bind(product_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
            if applied.is_some() {
                tx.rollback().await?;
                return Ok(None);
            }
        }

        let change = product.decrement(quantity, Utc::now());

        sqlx::query("UPDATE products SET stock = $2, active = $3, updated_at = $4 WHERE id = $1")
            .bind(product_id.as_str())
            .bind(i64::from(product.stock))
            .bind(product.active)
            .bind(product.updated_at)
            .execute(&mut *tx)
            .await?;

        if let Some(order_id) = order_id {
            sqlx::query(
                r#"
                INSERT INTO stock_movements (order_id, product_id, quantity, previous_stock, new_stock, oversold)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(product_id.as_str())
            .bind(i64::from(quantity))
            .bind(i64::from(change.previous))
            .bind(i64::from(change.new_stock))
            .bind(change.oversold)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(change))
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert_order(&self, order: &Order, job: &FulfillmentJob) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, cart_id, owner_key, status, payment_status, version, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number())
        .bind(order.cart_id().as_uuid())
        .bind(order.owner_key().as_str())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.version() as i64)
        .bind(serde_json::to_value(order)?)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "orders_pkey")
                || is_unique_violation(&e, "unique_order_number")
                || is_unique_violation(&e, "unique_order_cart")
            {
                return StoreError::AlreadyExists {
                    entity: "order",
                    id: order.id().to_string(),
                };
            }
            StoreError::Database(e)
        })?;

        insert_job(&mut tx, job).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT version, document FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let mut order: Order = document(&r)?;
            order.set_version(r.try_get::<i64, _>("version")? as u64);
            Ok(order)
        })
        .transpose()
    }

    async fn save_order(&self, order: &Order, expected_version: u64) -> Result<u64> {
        let version = expected_version + 1;
        let mut updated = order.clone();
        updated.set_version(version);

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, version = $4, document = $5, updated_at = $6
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(version as i64)
        .bind(serde_json::to_value(&updated)?)
        .bind(order.updated_at())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .version_mismatch(
                    "orders",
                    "order",
                    "id::text = $1",
                    order.id().to_string(),
                    expected_version,
                )
                .await);
        }
        Ok(version)
    }

    async fn next_order_sequence(&self, day: NaiveDate) -> Result<u64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_sequences (day, last_value) VALUES ($1, 1)
            ON CONFLICT (day) DO UPDATE SET last_value = order_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await?;
        Ok(value as u64)
    }
}

#[async_trait]
impl SellerOrderRepository for PostgresStore {
    async fn insert_missing_views(&self, views: &[SellerOrderView]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for view in views {
            let result = sqlx::query(
                r#"
                INSERT INTO seller_orders (order_id, seller_id, status, version, document, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (order_id, seller_id) DO NOTHING
                "#,
            )
            .bind(view.order_id.as_uuid())
            .bind(view.seller_id.as_str())
            .bind(view.status().as_str())
            .bind(view.version as i64)
            .bind(serde_json::to_value(view)?)
            .bind(view.created_at)
            .bind(view.updated_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_view(
        &self,
        order_id: OrderId,
        seller_id: &SellerId,
    ) -> Result<Option<SellerOrderView>> {
        let row = sqlx::query(
            "SELECT version, document FROM seller_orders WHERE order_id = $1 AND seller_id = $2",
        )
        .bind(order_id.as_uuid())
        .bind(seller_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| view_from_row(&r)).transpose()
    }

    async fn list_views_for_order(&self, order_id: OrderId) -> Result<Vec<SellerOrderView>> {
        let rows = sqlx::query(
            "SELECT version, document FROM seller_orders WHERE order_id = $1 ORDER BY seller_id",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(view_from_row).collect()
    }

    async fn list_views_for_seller(&self, seller_id: &SellerId) -> Result<Vec<SellerOrderView>> {
        let rows = sqlx::query(
            "SELECT version, document FROM seller_orders WHERE seller_id = $1 ORDER BY created_at DESC",
        )
        .bind(seller_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(view_from_row).collect()
    }

    async fn save_view(&self, view: &SellerOrderView, expected_version: u64) -> Result<u64> {
        let version = expected_version + 1;
        let mut updated = view.clone();
        updated.version = version;

        let result = sqlx::query(
            r#"
            UPDATE seller_orders
            SET status = $3, version = $4, document = $5, updated_at = $6
            WHERE order_id = $1 AND seller_id = $2 AND version = $7
            "#,
        )
        .bind(view.order_id.as_uuid())
        .bind(view.seller_id.as_str())
        .bind(view.status().as_str())
        .bind(version as i64)
        .bind(serde_json::to_value(&updated)?)
        .bind(view.updated_at)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> = sqlx::query_scalar(
                "SELECT version FROM seller_orders WHERE order_id = $1 AND seller_id = $2",
            )
            .bind(view.order_id.as_uuid())
            .bind(view.seller_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
            let id = format!("{}/{}", view.order_id, view.seller_id);
            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    entity: "seller order",
                    id,
                    expected: expected_version,
                    actual: actual as u64,
                },
                None => StoreError::NotFound {
                    entity: "seller order",
                    id,
                },
            });
        }
        Ok(version)
    }
}

fn view_from_row(row: &PgRow) -> Result<SellerOrderView> {
    let mut view: SellerOrderView = document(row)?;
    view.version = row.try_get::<i64, _>("version")? as u64;
    Ok(view)
}

fn payment_from_row(row: &PgRow) -> Result<PaymentRecord> {
    let mut record: PaymentRecord = document(row)?;
    record.version = row.try_get::<i64, _>("version")? as u64;
    Ok(record)
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn insert_payment(&self, record: &PaymentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, status, version, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.order_id.as_uuid())
        .bind(record.status().as_str())
        .bind(record.version as i64)
        .bind(serde_json::to_value(record)?)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "unique_payment_order") {
                return StoreError::AlreadyExists {
                    entity: "payment for order",
                    id: record.order_id.to_string(),
                };
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query("SELECT version, document FROM payments WHERE id = $1")
            .bind(payment_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| payment_from_row(&r)).transpose()
    }

    async fn find_payment_by_order(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query("SELECT version, document FROM payments WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| payment_from_row(&r)).transpose()
    }

    async fn save_payment(&self, record: &PaymentRecord, expected_version: u64) -> Result<u64> {
        let version = expected_version + 1;
        let mut updated = record.clone();
        updated.version = version;

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, version = $3, document = $4, updated_at = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.status().as_str())
        .bind(version as i64)
        .bind(serde_json::to_value(&updated)?)
        .bind(record.updated_at)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .version_mismatch(
                    "payments",
                    "payment",
                    "id::text = $1",
                    record.id.to_string(),
                    expected_version,
                )
                .await);
        }
        Ok(version)
    }
}

#[async_trait]
impl FulfillmentJobRepository for PostgresStore {
    async fn get_job(&self, order_id: OrderId) -> Result<Option<FulfillmentJob>> {
        let row = sqlx::query("SELECT document FROM fulfillment_jobs WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| document(&r)).transpose()
    }

    async fn save_job(&self, job: &FulfillmentJob) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_job(&mut tx, job).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_pending_jobs(&self, limit: usize) -> Result<Vec<FulfillmentJob>> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM fulfillment_jobs
            WHERE status = 'pending'
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document).collect()
    }
}
