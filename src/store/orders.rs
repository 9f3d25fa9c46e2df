//! libSQL order/customer store — async `OrderLookup` implementation.
//!
//! Supports local file and in-memory databases. One case performs exactly
//! one joined read here; nothing in the service writes order state back.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{DatabaseError, LookupError};
use crate::orders::{OrderFetch, OrderLookup, OrderRecord};

/// libSQL database backend for orders and customers.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlOrderStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlOrderStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Order database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS customers (
                     customer_id INTEGER PRIMARY KEY,
                     name TEXT NOT NULL,
                     email TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS orders (
                     order_id INTEGER PRIMARY KEY,
                     product_id TEXT NOT NULL,
                     customer_id INTEGER NOT NULL REFERENCES customers(customer_id),
                     quantity INTEGER NOT NULL,
                     price TEXT NOT NULL,
                     currency TEXT NOT NULL,
                     purchase_date TEXT NOT NULL,
                     is_return_flagged INTEGER NOT NULL DEFAULT 0
                 );",
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("init_schema: {e}")))?;
        Ok(())
    }

    /// Insert an order together with its customer (idempotent on both keys).
    ///
    /// Seeding helper for local runs and tests.
    pub async fn insert(&self, record: &OrderRecord) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO customers (customer_id, name, email) VALUES (?1, ?2, ?3)",
                params![
                    record.customer_id as i64,
                    record.customer_name.clone(),
                    record.customer_email.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert customer: {e}")))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO orders (order_id, product_id, customer_id, quantity, price, currency, purchase_date, is_return_flagged) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.order_id as i64,
                    record.product_id.clone(),
                    record.customer_id as i64,
                    record.quantity as i64,
                    record.price.to_string(),
                    record.currency.clone(),
                    record.purchase_date.format("%Y-%m-%d").to_string(),
                    record.is_return_flagged as i64,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert order: {e}")))?;

        Ok(())
    }
}

fn row_to_record(row: &libsql::Row) -> Result<OrderRecord, DatabaseError> {
    let order_id: i64 = row.get(0).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let product_id: String = row.get(1).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let customer_id: i64 = row.get(2).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let quantity: i64 = row.get(3).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let price_str: String = row.get(4).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let currency: String = row.get(5).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let date_str: String = row.get(6).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let flagged: i64 = row.get(7).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let customer_name: String = row.get(8).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let customer_email: String = row.get(9).map_err(|e| DatabaseError::Decode(e.to_string()))?;

    let price = Decimal::from_str(&price_str)
        .map_err(|e| DatabaseError::Decode(format!("price '{price_str}': {e}")))?;
    let purchase_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| DatabaseError::Decode(format!("purchase_date '{date_str}': {e}")))?;

    Ok(OrderRecord {
        order_id: order_id as u64,
        product_id,
        customer_id: customer_id as u64,
        quantity: quantity as u32,
        price,
        currency,
        purchase_date,
        is_return_flagged: flagged != 0,
        customer_name,
        customer_email,
    })
}

#[async_trait]
impl OrderLookup for LibSqlOrderStore {
    async fn fetch(&self, order_id: u64) -> Result<OrderFetch, LookupError> {
        let mut rows = self
            .conn
            .query(
                "SELECT o.order_id, o.product_id, o.customer_id, o.quantity, o.price, o.currency, o.purchase_date, o.is_return_flagged, c.name, c.email
                 FROM orders o
                 JOIN customers c ON o.customer_id = c.customer_id
                 WHERE o.order_id = ?1",
                params![order_id as i64],
            )
            .await
            .map_err(|e| LookupError::Transport(format!("fetch order: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let record = row_to_record(&row)?;
                Ok(OrderFetch::Found(record))
            }
            Ok(None) => Ok(OrderFetch::NotFound),
            Err(e) => Err(LookupError::Transport(format!("fetch order row: {e}"))),
        }
    }
}
