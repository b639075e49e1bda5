//! # API Hub Warehouse
//!
//! DuckDB-backed persistence for the API hub.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `auth_tokens` | Every credential ever issued, newest row wins |
//! | `products_<provider>` | One row per lookup key, one payload column pair per product |
//! | `idr_dnb_dpl` | Identity resolution requests and their match candidates |
//!
//! Product tables are created lazily: the first write or read for a product
//! adds the `<product>` and `<product>_obtained_at` columns if they are not
//! there yet.
//!
//! ```rust,no_run
//! use apihub_warehouse::{ProductTable, Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::default())?;
//!     let table = ProductTable::new("products_dnb", "duns", "cmpelk")?;
//!     warehouse.upsert_data_product(&table, "000012345", "{}", 1_700_000_000_000)?;
//!     Ok(())
//! }
//! ```

pub mod duckdb;
pub mod migrations;

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ::duckdb::{params, OptionalExt};
use serde::Serialize;
use thiserror::Error;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Stored or supplied JSON could not be (de)serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A table or column name contained characters outside `[A-Za-z0-9_]`.
    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for API hub data.
    pub apihub_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let apihub_home = resolve_apihub_home();
        let db_path = match env::var_os("APIHUB_DB_PATH") {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => apihub_home.join("cache").join("apihub.duckdb"),
        };
        Self {
            apihub_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Location of one product's payload inside a provider table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductTable {
    table: String,
    key_column: String,
    product_column: String,
}

impl ProductTable {
    /// Describe the `product_column` pair stored in `table`, keyed by
    /// `key_column`.
    ///
    /// # Errors
    /// Returns [`WarehouseError::InvalidIdentifier`] when any name is not a
    /// plain SQL identifier. Names end up in statement text, so this is the
    /// only place they are checked.
    pub fn new(
        table: impl Into<String>,
        key_column: impl Into<String>,
        product_column: impl Into<String>,
    ) -> Result<Self, WarehouseError> {
        let table = validate_identifier(table.into())?;
        let key_column = validate_identifier(key_column.into())?;
        let product_column = validate_identifier(product_column.into())?;
        Ok(Self {
            table,
            key_column,
            product_column,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn product_column(&self) -> &str {
        &self.product_column
    }

    fn obtained_at_column(&self) -> String {
        format!("{}_obtained_at", self.product_column)
    }
}

/// A persisted credential row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthTokenRecord {
    pub id: i64,
    pub api: String,
    pub token: String,
    /// Time to live in seconds.
    pub expires_in: i64,
    /// Unix milliseconds.
    pub obtained_at: i64,
}

/// A cached product payload for one lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRecord {
    pub payload: Option<String>,
    pub obtained_at: Option<i64>,
}

/// An identity resolution row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdrRecord {
    pub id: i64,
    pub params: String,
    pub params_at: i64,
    pub results: Option<String>,
    pub http_status: Option<i32>,
    pub obtained_at: Option<i64>,
    pub duns: Option<String>,
}

/// The main warehouse interface.
#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
    registered: Arc<Mutex<HashSet<ProductTable>>>,
}

impl Warehouse {
    /// Open a warehouse with the default, environment-derived configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        Self::from_manager(manager)
    }

    /// Open a private in-memory warehouse. Nothing survives the process.
    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        let manager = DuckDbConnectionManager::open_in_memory(2)?;
        Self::from_manager(manager)
    }

    fn from_manager(manager: DuckDbConnectionManager) -> Result<Self, WarehouseError> {
        let warehouse = Self {
            manager,
            registered: Arc::new(Mutex::new(HashSet::new())),
        };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply pending schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file, `None` for in-memory warehouses.
    pub fn db_path(&self) -> Option<&Path> {
        self.manager.db_path()
    }

    /// Store a freshly issued credential and return its surrogate id.
    pub fn insert_auth_token(
        &self,
        api: &str,
        token: &str,
        expires_in: i64,
        obtained_at: i64,
    ) -> Result<i64, WarehouseError> {
        let connection = self.manager.acquire()?;
        let id = connection.query_row(
            "INSERT INTO auth_tokens (api, token, expires_in, obtained_at) VALUES (?, ?, ?, ?) RETURNING id",
            params![api, token, expires_in, obtained_at],
            |row| row.get(0),
        )?;
        tracing::debug!(api, id, "auth token persisted");
        Ok(id)
    }

    /// The most recently inserted credential for `api`.
    pub fn latest_auth_token(&self, api: &str) -> Result<Option<AuthTokenRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let record = connection
            .query_row(
                "SELECT id, api, token, expires_in, obtained_at FROM auth_tokens WHERE api = ? ORDER BY id DESC LIMIT 1",
                params![api],
                |row| {
                    Ok(AuthTokenRecord {
                        id: row.get(0)?,
                        api: row.get(1)?,
                        token: row.get(2)?,
                        expires_in: row.get(3)?,
                        obtained_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Insert or overwrite the payload of one product for one key.
    ///
    /// Returns the number of affected rows.
    pub fn upsert_data_product(
        &self,
        table: &ProductTable,
        key: &str,
        payload: &str,
        obtained_at: i64,
    ) -> Result<usize, WarehouseError> {
        self.ensure_product_table(table)?;
        let obtained_column = table.obtained_at_column();
        let sql = format!(
            "INSERT INTO \"{t}\" (\"{k}\", \"{p}\", \"{o}\") VALUES (?, ?, ?) \
             ON CONFLICT (\"{k}\") DO UPDATE SET \"{p}\" = excluded.\"{p}\", \"{o}\" = excluded.\"{o}\"",
            t = table.table,
            k = table.key_column,
            p = table.product_column,
            o = obtained_column,
        );

        let connection = self.manager.acquire()?;
        let changed = connection.execute(&sql, params![key, payload, obtained_at])?;
        Ok(changed)
    }

    /// Read the cached payload of one product for one key.
    ///
    /// `None` means no row exists for the key. A row may still carry a `None`
    /// payload when only other products were stored for that key.
    pub fn get_data_product(
        &self,
        table: &ProductTable,
        key: &str,
    ) -> Result<Option<ProductRecord>, WarehouseError> {
        self.ensure_product_table(table)?;
        let sql = format!(
            "SELECT \"{p}\", \"{o}\" FROM \"{t}\" WHERE \"{k}\" = ?",
            t = table.table,
            k = table.key_column,
            p = table.product_column,
            o = table.obtained_at_column(),
        );

        let connection = self.manager.acquire()?;
        let record = connection
            .query_row(&sql, params![key], |row| {
                Ok(ProductRecord {
                    payload: row.get(0)?,
                    obtained_at: row.get(1)?,
                })
            })
            .optional()?;
        Ok(record)
    }

    /// Persist identity resolution parameters and return the new record id.
    pub fn insert_idr_params(
        &self,
        params: &serde_json::Value,
        params_at: i64,
    ) -> Result<i64, WarehouseError> {
        let text = serde_json::to_string(params)?;
        let connection = self.manager.acquire()?;
        let id = connection.query_row(
            "INSERT INTO idr_dnb_dpl (params, params_at) VALUES (?, ?) RETURNING id",
            params![text, params_at],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Attach the upstream match result to an identity resolution record.
    ///
    /// Returns the number of affected rows.
    pub fn update_idr_results(
        &self,
        id: i64,
        results: &str,
        http_status: u16,
        obtained_at: i64,
    ) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire()?;
        let changed = connection.execute(
            "UPDATE idr_dnb_dpl SET results = ?, http_status = ?, obtained_at = ? WHERE id = ?",
            params![results, i32::from(http_status), obtained_at, id],
        )?;
        Ok(changed)
    }

    /// Record the DUNS chosen for an identity resolution record.
    ///
    /// Returns the number of affected rows.
    pub fn update_idr_duns(&self, id: i64, duns: &str) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire()?;
        let changed = connection.execute(
            "UPDATE idr_dnb_dpl SET duns = ? WHERE id = ?",
            params![duns, id],
        )?;
        Ok(changed)
    }

    pub fn idr_record(&self, id: i64) -> Result<Option<IdrRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let record = connection
            .query_row(
                "SELECT id, params, params_at, results, http_status, obtained_at, duns FROM idr_dnb_dpl WHERE id = ?",
                params![id],
                |row| {
                    Ok(IdrRecord {
                        id: row.get(0)?,
                        params: row.get(1)?,
                        params_at: row.get(2)?,
                        results: row.get(3)?,
                        http_status: row.get(4)?,
                        obtained_at: row.get(5)?,
                        duns: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Create the provider table and the product's column pair on first use.
    fn ensure_product_table(&self, table: &ProductTable) -> Result<(), WarehouseError> {
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if registered.contains(table) {
            return Ok(());
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{t}\" (\"{k}\" TEXT PRIMARY KEY);\n\
             ALTER TABLE \"{t}\" ADD COLUMN IF NOT EXISTS \"{p}\" TEXT;\n\
             ALTER TABLE \"{t}\" ADD COLUMN IF NOT EXISTS \"{o}\" BIGINT;",
            t = table.table,
            k = table.key_column,
            p = table.product_column,
            o = table.obtained_at_column(),
        ))?;
        tracing::debug!(
            table = table.table.as_str(),
            product = table.product_column.as_str(),
            "product columns registered"
        );

        registered.insert(table.clone());
        Ok(())
    }
}

fn validate_identifier(name: String) -> Result<String, WarehouseError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(name)
    } else {
        Err(WarehouseError::InvalidIdentifier(name))
    }
}

/// Resolve the API hub home directory from environment or default.
fn resolve_apihub_home() -> PathBuf {
    if let Some(path) = env::var_os("APIHUB_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".apihub");
    }

    PathBuf::from(".apihub")
}
