//! Database service for shipping-service.

use crate::models::{
    Counterparty, LedgerCursor, LedgerEntry, ListOrdersFilter, MovementKind, OrderItem, Product,
    ShippingOrder,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::sequence::parse_sequence;
use crate::services::store::{Catalog, LedgerStore, OrderStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "shipping-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

/// Unique violations keep the constraint name so callers can tell which key collided.
fn map_sqlx(operation: &str, e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StoreError::UniqueViolation {
                constraint: db_err.constraint().unwrap_or_default().to_string(),
            }
        }
        _ => StoreError::Backend(anyhow::anyhow!("Failed to {}: {}", operation, e)),
    }
}

fn parse_column<T>(column: &str, raw: &str) -> StoreResult<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>()
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("Corrupt {} column: {}", column, e)))
}

const ORDER_COLUMNS: &str = "id, human_number, order_number, order_type, counterparty_id, \
     counterparty_name, items, status, payment_status, total_amount, notes, created_at, \
     updated_at, deleted_at, version";

const ENTRY_COLUMNS: &str = "id, product_id, signed_quantity, kind, source_order_id, \
     source_order_number, unit_amount, total_amount, occurred_at, note";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    human_number: String,
    order_number: String,
    order_type: String,
    counterparty_id: Option<Uuid>,
    counterparty_name: Option<String>,
    items: Json<Vec<OrderItem>>,
    status: String,
    payment_status: String,
    total_amount: Decimal,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<OrderRow> for ShippingOrder {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(ShippingOrder {
            id: row.id,
            human_number: row.human_number,
            order_number: row.order_number,
            order_type: parse_column("order_type", &row.order_type)?,
            counterparty_ref: row.counterparty_id,
            counterparty_name: row.counterparty_name,
            items: row.items.0,
            status: parse_column("status", &row.status)?,
            payment_status: parse_column("payment_status", &row.payment_status)?,
            total_amount: row.total_amount,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            version: row.version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    product_id: Uuid,
    signed_quantity: i64,
    kind: String,
    source_order_id: Option<Uuid>,
    source_order_number: Option<String>,
    unit_amount: Decimal,
    total_amount: Decimal,
    occurred_at: DateTime<Utc>,
    note: Option<String>,
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            id: row.id,
            product_ref: row.product_id,
            signed_quantity: row.signed_quantity,
            kind: parse_column("kind", &row.kind)?,
            source_order_ref: row.source_order_id,
            source_order_number: row.source_order_number,
            unit_amount: row.unit_amount,
            total_amount: row.total_amount,
            occurred_at: row.occurred_at,
            note: row.note,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    code: String,
    name: String,
    exclude_from_stock: bool,
    reference_price: Option<Decimal>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            code: row.code,
            name: row.name,
            exclude_from_stock: row.exclude_from_stock,
            reference_price: row.reference_price,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CounterpartyRow {
    id: Uuid,
    name: String,
    kind: String,
    allow_backorder: bool,
}

impl TryFrom<CounterpartyRow> for Counterparty {
    type Error = StoreError;

    fn try_from(row: CounterpartyRow) -> Result<Self, Self::Error> {
        Ok(Counterparty {
            id: row.id,
            name: row.name,
            kind: parse_column("counterparty kind", &row.kind)?,
            allow_backorder: row.allow_backorder,
        })
    }
}

fn into_entries(rows: Vec<EntryRow>) -> StoreResult<Vec<LedgerEntry>> {
    rows.into_iter().map(LedgerEntry::try_from).collect()
}

// -------------------------------------------------------------------------
// Order Operations
// -------------------------------------------------------------------------

#[async_trait]
impl OrderStore for Database {
    #[instrument(skip(self, order), fields(order_id = %order.id, human_number = %order.human_number))]
    async fn insert_order(&self, order: &ShippingOrder) -> StoreResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_order"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO shipping_orders (id, human_number, order_number, order_type, counterparty_id,
                counterparty_name, items, status, payment_status, total_amount, notes, created_at,
                updated_at, deleted_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.id)
        .bind(&order.human_number)
        .bind(&order.order_number)
        .bind(order.order_type.as_str())
        .bind(order.counterparty_ref)
        .bind(&order.counterparty_name)
        .bind(Json(&order.items))
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.total_amount)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.deleted_at)
        .bind(order.version)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("insert order", e))?;

        timer.observe_duration();

        info!("Order inserted");

        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn update_order(&self, order: &ShippingOrder, expected_version: i64) -> StoreResult<bool> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_order"])
            .start_timer();

        // Numbers are fixed at creation and never rewritten.
        let result = sqlx::query(
            r#"
            UPDATE shipping_orders
            SET counterparty_id = $2,
                counterparty_name = $3,
                items = $4,
                status = $5,
                payment_status = $6,
                total_amount = $7,
                notes = $8,
                updated_at = $9,
                deleted_at = $10,
                version = $11
            WHERE id = $1 AND version = $12 AND deleted_at IS NULL
            "#,
        )
        .bind(order.id)
        .bind(order.counterparty_ref)
        .bind(&order.counterparty_name)
        .bind(Json(&order.items))
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.total_amount)
        .bind(&order.notes)
        .bind(order.updated_at)
        .bind(order.deleted_at)
        .bind(order.version)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("update order", e))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<ShippingOrder>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_order"])
            .start_timer();

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM shipping_orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("get order", e))?;

        timer.observe_duration();

        row.map(ShippingOrder::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_live_by_number(&self, normalized: &str) -> StoreResult<Option<ShippingOrder>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_live_by_number"])
            .start_timer();

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM shipping_orders WHERE deleted_at IS NULL AND UPPER(BTRIM(human_number)) = $1",
            ORDER_COLUMNS
        ))
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("find order by number", e))?;

        timer.observe_duration();

        row.map(ShippingOrder::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn max_sequence(&self, prefix: &str) -> StoreResult<Option<u32>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["max_sequence"])
            .start_timer();

        // Deleted orders count too, so a reissued number never meets an old order_number.
        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT human_number FROM shipping_orders WHERE LEFT(UPPER(human_number), LENGTH($1)) = UPPER($1)",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("read order sequence", e))?;

        timer.observe_duration();

        Ok(numbers
            .iter()
            .filter_map(|n| parse_sequence(n, prefix))
            .max())
    }

    #[instrument(skip(self, filter))]
    async fn list_orders(&self, filter: &ListOrdersFilter) -> StoreResult<Vec<ShippingOrder>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_orders"])
            .start_timer();

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {}
            FROM shipping_orders
            WHERE ($1 OR deleted_at IS NULL)
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::varchar IS NULL OR order_type = $3)
              AND ($4::uuid IS NULL OR counterparty_id = $4)
              AND ($5::uuid IS NULL OR id > $5)
            ORDER BY id
            LIMIT $6
            "#,
            ORDER_COLUMNS
        ))
        .bind(filter.include_deleted)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.order_type.map(|t| t.as_str()))
        .bind(filter.counterparty_ref)
        .bind(filter.page_token)
        .bind(filter.page_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("list orders", e))?;

        timer.observe_duration();

        rows.into_iter().map(ShippingOrder::try_from).collect()
    }
}

// -------------------------------------------------------------------------
// Ledger Operations
// -------------------------------------------------------------------------

#[async_trait]
impl LedgerStore for Database {
    #[instrument(skip(self, entry), fields(product_id = %entry.product_ref, kind = %entry.kind))]
    async fn insert_entry(&self, entry: &LedgerEntry) -> StoreResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_entry"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, product_id, signed_quantity, kind, source_order_id,
                source_order_number, unit_amount, total_amount, occurred_at, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.product_ref)
        .bind(entry.signed_quantity)
        .bind(entry.kind.as_str())
        .bind(entry.source_order_ref)
        .bind(&entry.source_order_number)
        .bind(entry.unit_amount)
        .bind(entry.total_amount)
        .bind(entry.occurred_at)
        .bind(&entry.note)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("insert ledger entry", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_order_entry(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        kind: MovementKind,
    ) -> StoreResult<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {} FROM ledger_entries WHERE source_order_id = $1 AND product_id = $2 AND kind = $3",
            ENTRY_COLUMNS
        ))
        .bind(order_id)
        .bind(product_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("find order entry", e))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn delete_by_source(
        &self,
        order_id: Uuid,
        kind: Option<MovementKind>,
    ) -> StoreResult<u64> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_by_source"])
            .start_timer();

        let result = sqlx::query(
            "DELETE FROM ledger_entries WHERE source_order_id = $1 AND ($2::varchar IS NULL OR kind = $2)",
        )
        .bind(order_id)
        .bind(kind.map(|k| k.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx("delete ledger entries", e))?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, after))]
    async fn list_by_product(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
        after: Option<LedgerCursor>,
        limit: i64,
    ) -> StoreResult<Vec<LedgerEntry>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_by_product"])
            .start_timer();

        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE product_id = $1
              AND ($2::varchar IS NULL OR kind = $2)
              AND ($3::timestamptz IS NULL OR (occurred_at, id) > ($3::timestamptz, $4::uuid))
            ORDER BY occurred_at, id
            LIMIT $5
            "#,
            ENTRY_COLUMNS
        ))
        .bind(product_id)
        .bind(kind.map(|k| k.as_str()))
        .bind(after.map(|c| c.occurred_at))
        .bind(after.map(|c| c.id))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("list ledger entries", e))?;

        timer.observe_duration();

        into_entries(rows)
    }

    #[instrument(skip(self))]
    async fn list_by_source(&self, order_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {} FROM ledger_entries WHERE source_order_id = $1 ORDER BY occurred_at, id",
            ENTRY_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("list order entries", e))?;

        into_entries(rows)
    }

    #[instrument(skip(self))]
    async fn sum_by_product(&self, product_id: Uuid) -> StoreResult<i64> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sum_by_product"])
            .start_timer();

        let on_hand: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(signed_quantity), 0)::BIGINT FROM ledger_entries WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx("sum ledger entries", e))?;

        timer.observe_duration();

        Ok(on_hand)
    }
}

// -------------------------------------------------------------------------
// Master Data
// -------------------------------------------------------------------------

#[async_trait]
impl Catalog for Database {
    #[instrument(skip(self))]
    async fn product_by_code(&self, code: &str) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, code, name, exclude_from_stock, reference_price FROM products WHERE UPPER(code) = UPPER($1)",
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("get product", e))?;

        Ok(row.map(Product::from))
    }

    #[instrument(skip(self))]
    async fn product_by_id(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, code, name, exclude_from_stock, reference_price FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("get product", e))?;

        Ok(row.map(Product::from))
    }

    #[instrument(skip(self))]
    async fn counterparty_by_name(&self, name: &str) -> StoreResult<Option<Counterparty>> {
        let row = sqlx::query_as::<_, CounterpartyRow>(
            "SELECT id, name, kind, allow_backorder FROM counterparties WHERE UPPER(name) = UPPER($1) LIMIT 1",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("get counterparty", e))?;

        row.map(Counterparty::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn counterparty_by_id(&self, id: Uuid) -> StoreResult<Option<Counterparty>> {
        let row = sqlx::query_as::<_, CounterpartyRow>(
            "SELECT id, name, kind, allow_backorder FROM counterparties WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("get counterparty", e))?;

        row.map(Counterparty::try_from).transpose()
    }
}
