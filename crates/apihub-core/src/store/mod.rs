//! Persistence seam used by the credential manager and the orchestrators.

pub mod memory;
pub mod warehouse;

use std::future::Future;
use std::pin::Pin;

use apihub_warehouse::WarehouseError;
use thiserror::Error;

pub use apihub_warehouse::{AuthTokenRecord, ProductRecord};
pub use memory::{MemoryStore, StoreOperation};
pub use warehouse::WarehouseStore;

use crate::catalog::{ApiId, Product};
use crate::domain::LookupKey;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("store task failed: {0}")]
    Task(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The small command/query interface the hub needs from its relational store.
///
/// Implementations acquire one connection per call and release it before the
/// returned future resolves, whether the call succeeds or not.
pub trait HubStore: Send + Sync {
    /// Insert a credential row and return its id. Rows are never updated.
    fn insert_auth_token<'a>(
        &'a self,
        api: ApiId,
        token: &'a str,
        ttl_secs: i64,
        issued_at_ms: i64,
    ) -> StoreFuture<'a, i64>;

    /// The most recently inserted credential for `api`.
    fn latest_auth_token<'a>(&'a self, api: ApiId) -> StoreFuture<'a, Option<AuthTokenRecord>>;

    /// Insert or overwrite the payload of `product` for `key`.
    fn upsert_data_product<'a>(
        &'a self,
        product: &'static Product,
        key: &'a LookupKey,
        payload: &'a str,
        obtained_at_ms: i64,
    ) -> StoreFuture<'a, ()>;

    fn get_data_product<'a>(
        &'a self,
        product: &'static Product,
        key: &'a LookupKey,
    ) -> StoreFuture<'a, Option<ProductRecord>>;

    /// Persist identity resolution search parameters, returning the record id.
    fn insert_idr_params<'a>(
        &'a self,
        params: &'a serde_json::Value,
        params_at_ms: i64,
    ) -> StoreFuture<'a, i64>;

    /// Attach match results to a record. Returns the number of changed rows.
    fn update_idr_results<'a>(
        &'a self,
        id: i64,
        results: &'a str,
        http_status: u16,
        obtained_at_ms: i64,
    ) -> StoreFuture<'a, usize>;

    /// Record the chosen DUNS on a record. Returns the number of changed rows.
    fn update_idr_duns<'a>(&'a self, id: i64, duns: &'a str) -> StoreFuture<'a, usize>;
}
