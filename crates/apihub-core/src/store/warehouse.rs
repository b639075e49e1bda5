//! [`HubStore`] backed by the DuckDB warehouse.
//!
//! DuckDB calls block, so every operation runs on tokio's blocking pool.

use apihub_warehouse::{ProductTable, Warehouse, WarehouseError};

use super::{AuthTokenRecord, HubStore, ProductRecord, StoreError, StoreFuture};
use crate::catalog::{ApiId, Product};
use crate::domain::LookupKey;

#[derive(Clone)]
pub struct WarehouseStore {
    warehouse: Warehouse,
}

impl WarehouseStore {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    async fn run<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Warehouse) -> Result<T, WarehouseError> + Send + 'static,
    {
        let warehouse = self.warehouse.clone();
        tokio::task::spawn_blocking(move || operation(&warehouse))
            .await
            .map_err(|error| StoreError::Task(error.to_string()))?
            .map_err(StoreError::from)
    }
}

fn product_table(product: &Product) -> Result<ProductTable, WarehouseError> {
    ProductTable::new(
        product.provider().product_table(),
        product.key.column(),
        product.id,
    )
}

impl HubStore for WarehouseStore {
    fn insert_auth_token<'a>(
        &'a self,
        api: ApiId,
        token: &'a str,
        ttl_secs: i64,
        issued_at_ms: i64,
    ) -> StoreFuture<'a, i64> {
        let token = token.to_owned();
        Box::pin(self.run(move |warehouse| {
            warehouse.insert_auth_token(api.as_str(), &token, ttl_secs, issued_at_ms)
        }))
    }

    fn latest_auth_token<'a>(&'a self, api: ApiId) -> StoreFuture<'a, Option<AuthTokenRecord>> {
        Box::pin(self.run(move |warehouse| warehouse.latest_auth_token(api.as_str())))
    }

    fn upsert_data_product<'a>(
        &'a self,
        product: &'static Product,
        key: &'a LookupKey,
        payload: &'a str,
        obtained_at_ms: i64,
    ) -> StoreFuture<'a, ()> {
        let key = key.as_str().to_owned();
        let payload = payload.to_owned();
        Box::pin(self.run(move |warehouse| {
            let table = product_table(product)?;
            warehouse.upsert_data_product(&table, &key, &payload, obtained_at_ms)?;
            Ok(())
        }))
    }

    fn get_data_product<'a>(
        &'a self,
        product: &'static Product,
        key: &'a LookupKey,
    ) -> StoreFuture<'a, Option<ProductRecord>> {
        let key = key.as_str().to_owned();
        Box::pin(self.run(move |warehouse| {
            let table = product_table(product)?;
            warehouse.get_data_product(&table, &key)
        }))
    }

    fn insert_idr_params<'a>(
        &'a self,
        params: &'a serde_json::Value,
        params_at_ms: i64,
    ) -> StoreFuture<'a, i64> {
        let params = params.clone();
        Box::pin(self.run(move |warehouse| warehouse.insert_idr_params(&params, params_at_ms)))
    }

    fn update_idr_results<'a>(
        &'a self,
        id: i64,
        results: &'a str,
        http_status: u16,
        obtained_at_ms: i64,
    ) -> StoreFuture<'a, usize> {
        let results = results.to_owned();
        Box::pin(self.run(move |warehouse| {
            warehouse.update_idr_results(id, &results, http_status, obtained_at_ms)
        }))
    }

    fn update_idr_duns<'a>(&'a self, id: i64, duns: &'a str) -> StoreFuture<'a, usize> {
        let duns = duns.to_owned();
        Box::pin(self.run(move |warehouse| warehouse.update_idr_duns(id, &duns)))
    }
}
