//! In-memory store for tests and offline runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use super::{AuthTokenRecord, HubStore, ProductRecord, StoreError, StoreFuture};
use crate::catalog::{ApiId, ProviderId, Product};
use crate::domain::LookupKey;

/// Operations of [`HubStore`], used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    InsertAuthToken,
    LatestAuthToken,
    UpsertDataProduct,
    GetDataProduct,
    InsertIdrParams,
    UpdateIdrResults,
    UpdateIdrDuns,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdrRow {
    pub params: serde_json::Value,
    pub params_at_ms: i64,
    pub results: Option<String>,
    pub http_status: Option<u16>,
    pub obtained_at_ms: Option<i64>,
    pub duns: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    tokens: Vec<AuthTokenRecord>,
    products: HashMap<(ProviderId, String), BTreeMap<&'static str, ProductRecord>>,
    idr: BTreeMap<i64, IdrRow>,
    next_idr_id: i64,
}

/// Thread-safe in-memory [`HubStore`] that counts every call.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<tokio::sync::RwLock<MemoryInner>>,
    calls: Arc<Mutex<HashMap<StoreOperation, usize>>>,
    failing: Arc<Mutex<HashSet<StoreOperation>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `operation` has been invoked.
    pub fn calls(&self, operation: StoreOperation) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of store calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Make every subsequent `operation` fail.
    pub fn fail(&self, operation: StoreOperation) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation);
    }

    pub async fn seed_token(&self, api: ApiId, token: &str, ttl_secs: i64, issued_at_ms: i64) -> i64 {
        let mut inner = self.inner.write().await;
        push_token(&mut inner, api, token, ttl_secs, issued_at_ms)
    }

    pub async fn tokens(&self, api: ApiId) -> Vec<AuthTokenRecord> {
        let inner = self.inner.read().await;
        inner
            .tokens
            .iter()
            .filter(|record| record.api == api.as_str())
            .cloned()
            .collect()
    }

    pub async fn idr_row(&self, id: i64) -> Option<IdrRow> {
        self.inner.read().await.idr.get(&id).cloned()
    }

    fn enter(&self, operation: StoreOperation) -> Result<(), StoreError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_insert(0) += 1;

        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&operation);
        if failing {
            return Err(StoreError::Unavailable(format!("{operation:?} disabled")));
        }
        Ok(())
    }
}

fn push_token(
    inner: &mut MemoryInner,
    api: ApiId,
    token: &str,
    ttl_secs: i64,
    issued_at_ms: i64,
) -> i64 {
    let id = inner.tokens.len() as i64 + 1;
    inner.tokens.push(AuthTokenRecord {
        id,
        api: api.as_str().to_owned(),
        token: token.to_owned(),
        expires_in: ttl_secs,
        obtained_at: issued_at_ms,
    });
    id
}

impl HubStore for MemoryStore {
    fn insert_auth_token<'a>(
        &'a self,
        api: ApiId,
        token: &'a str,
        ttl_secs: i64,
        issued_at_ms: i64,
    ) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            self.enter(StoreOperation::InsertAuthToken)?;
            let mut inner = self.inner.write().await;
            Ok(push_token(&mut inner, api, token, ttl_secs, issued_at_ms))
        })
    }

    fn latest_auth_token<'a>(&'a self, api: ApiId) -> StoreFuture<'a, Option<AuthTokenRecord>> {
        Box::pin(async move {
            self.enter(StoreOperation::LatestAuthToken)?;
            let inner = self.inner.read().await;
            Ok(inner
                .tokens
                .iter()
                .filter(|record| record.api == api.as_str())
                .max_by_key(|record| record.id)
                .cloned())
        })
    }

    fn upsert_data_product<'a>(
        &'a self,
        product: &'static Product,
        key: &'a LookupKey,
        payload: &'a str,
        obtained_at_ms: i64,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.enter(StoreOperation::UpsertDataProduct)?;
            let mut inner = self.inner.write().await;
            inner
                .products
                .entry((product.provider(), key.as_str().to_owned()))
                .or_default()
                .insert(
                    product.id,
                    ProductRecord {
                        payload: Some(payload.to_owned()),
                        obtained_at: Some(obtained_at_ms),
                    },
                );
            Ok(())
        })
    }

    fn get_data_product<'a>(
        &'a self,
        product: &'static Product,
        key: &'a LookupKey,
    ) -> StoreFuture<'a, Option<ProductRecord>> {
        Box::pin(async move {
            self.enter(StoreOperation::GetDataProduct)?;
            let inner = self.inner.read().await;
            let record = inner
                .products
                .get(&(product.provider(), key.as_str().to_owned()))
                .map(|row| {
                    row.get(product.id).cloned().unwrap_or(ProductRecord {
                        payload: None,
                        obtained_at: None,
                    })
                });
            Ok(record)
        })
    }

    fn insert_idr_params<'a>(
        &'a self,
        params: &'a serde_json::Value,
        params_at_ms: i64,
    ) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            self.enter(StoreOperation::InsertIdrParams)?;
            let mut inner = self.inner.write().await;
            inner.next_idr_id += 1;
            let id = inner.next_idr_id;
            inner.idr.insert(
                id,
                IdrRow {
                    params: params.clone(),
                    params_at_ms,
                    results: None,
                    http_status: None,
                    obtained_at_ms: None,
                    duns: None,
                },
            );
            Ok(id)
        })
    }

    fn update_idr_results<'a>(
        &'a self,
        id: i64,
        results: &'a str,
        http_status: u16,
        obtained_at_ms: i64,
    ) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            self.enter(StoreOperation::UpdateIdrResults)?;
            let mut inner = self.inner.write().await;
            let Some(row) = inner.idr.get_mut(&id) else {
                return Ok(0);
            };
            row.results = Some(results.to_owned());
            row.http_status = Some(http_status);
            row.obtained_at_ms = Some(obtained_at_ms);
            Ok(1)
        })
    }

    fn update_idr_duns<'a>(&'a self, id: i64, duns: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            self.enter(StoreOperation::UpdateIdrDuns)?;
            let mut inner = self.inner.write().await;
            let Some(row) = inner.idr.get_mut(&id) else {
                return Ok(0);
            };
            row.duns = Some(duns.to_owned());
            Ok(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latest_token_is_per_api() {
        let store = MemoryStore::new();
        store.seed_token(ApiId::Dpl, "old", 60, 1).await;
        store.seed_token(ApiId::D2o, "other", 60, 2).await;
        store.seed_token(ApiId::Dpl, "new", 60, 3).await;

        let latest = store
            .latest_auth_token(ApiId::Dpl)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(latest.token, "new");
        assert_eq!(store.calls(StoreOperation::LatestAuthToken), 1);
    }

    #[tokio::test]
    async fn injected_failure_still_counts_the_call() {
        let store = MemoryStore::new();
        store.fail(StoreOperation::InsertIdrParams);

        let result = store.insert_idr_params(&serde_json::json!({}), 1).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.calls(StoreOperation::InsertIdrParams), 1);
    }

    #[tokio::test]
    async fn products_of_one_provider_share_a_row() {
        let store = MemoryStore::new();
        let elk = Product::lookup("cmpelk").expect("product");
        let tcs = Product::lookup("cmptcs").expect("product");
        let key = LookupKey::parse(elk.key, "123456789").expect("key");

        store.upsert_data_product(elk, &key, "{}", 5).await.expect("upsert");
        let other = store.get_data_product(tcs, &key).await.expect("query");
        assert_eq!(
            other,
            Some(ProductRecord {
                payload: None,
                obtained_at: None
            })
        );
    }
}
