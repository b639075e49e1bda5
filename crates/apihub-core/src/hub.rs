//! The hub facade: the three inbound operations plus credential start-up.

use std::sync::{Arc, Mutex, PoisonError};

use apihub_warehouse::Warehouse;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::adapters::AdapterSet;
use crate::background::BackgroundTasks;
use crate::catalog::{ApiId, DataStructure};
use crate::clock::{Clock, SystemClock};
use crate::config::HubConfig;
use crate::credentials::{CredentialManager, Credentials, RenewalTimers};
use crate::error::{pretty_json, ApiHubError};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::identity::IdentityResolver;
use crate::product::{DataProductFetcher, DataProductRequest};
use crate::store::{HubStore, WarehouseStore};

pub const HEADER_FROM_CACHE: &str = "X-API-Hub-Prod-DB";
pub const HEADER_IDR_ID: &str = "X-DNB-DPL-IDR-ID";
pub const HEADER_UPSTREAM_STATUS: &str = "X-DNB-DPL-HTTP-Stat";

/// Successful outcome of a hub operation, ready to be written to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubResponse {
    pub body: String,
    pub content_type: &'static str,
    pub from_cache: Option<bool>,
    pub idr_id: Option<i64>,
    pub upstream_status: Option<u16>,
}

impl HubResponse {
    fn json(body: String) -> Self {
        Self {
            body,
            content_type: DataStructure::Json.content_type(),
            from_cache: None,
            idr_id: None,
            upstream_status: None,
        }
    }

    /// Response headers, `Content-Type` first.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Content-Type", self.content_type.to_owned())];
        if let Some(from_cache) = self.from_cache {
            headers.push((HEADER_FROM_CACHE, from_cache.to_string()));
        }
        if let Some(id) = self.idr_id {
            headers.push((HEADER_IDR_ID, id.to_string()));
        }
        if let Some(status) = self.upstream_status {
            headers.push((HEADER_UPSTREAM_STATUS, status.to_string()));
        }
        headers
    }
}

#[derive(Serialize)]
struct RowCount {
    #[serde(rename = "rowCount")]
    row_count: usize,
}

#[derive(Serialize)]
struct About {
    msg: &'static str,
    license: &'static str,
    #[serde(rename = "licenseDetails")]
    license_details: &'static str,
    version: &'static str,
}

pub struct ApiHub {
    config: HubConfig,
    credentials: Credentials,
    background: BackgroundTasks,
    products: DataProductFetcher,
    identity: IdentityResolver,
    timers: Mutex<Option<RenewalTimers>>,
}

impl ApiHub {
    /// Wire a hub from explicit parts. Credential managers are registered for
    /// every API that issues tokens.
    pub fn new(
        config: HubConfig,
        store: Arc<dyn HubStore>,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_adapters(AdapterSet::from_config(&config), config, store, http_client, clock)
    }

    pub fn with_adapters(
        adapters: AdapterSet,
        config: HubConfig,
        store: Arc<dyn HubStore>,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let credentials = ApiId::ALL
            .into_iter()
            .filter(|api| api.auth_style().issues_tokens())
            .filter_map(|api| adapters.get(api).ok())
            .fold(Credentials::new(), |credentials, adapter| {
                credentials.with(CredentialManager::new(
                    adapter,
                    Arc::clone(&http_client),
                    Arc::clone(&store),
                    Arc::clone(&clock),
                ))
            });

        let background = BackgroundTasks::new();
        let products = DataProductFetcher::new(
            adapters.clone(),
            credentials.clone(),
            Arc::clone(&http_client),
            Arc::clone(&store),
            Arc::clone(&clock),
            background.clone(),
        );
        let identity = IdentityResolver::new(
            adapters,
            credentials.clone(),
            http_client,
            store,
            clock,
            background.clone(),
        );

        Self {
            config,
            credentials,
            background,
            products,
            identity,
            timers: Mutex::new(None),
        }
    }

    /// Open the DuckDB warehouse named by `config` and talk to the real
    /// upstream APIs.
    pub fn open(config: HubConfig) -> Result<Self, ApiHubError> {
        let warehouse = Warehouse::open(config.warehouse.clone()).map_err(|error| {
            ApiHubError::persistence(
                DataStructure::Json,
                format!("unable to open warehouse {}: {error}", config.warehouse.db_path.display()),
            )
        })?;
        tracing::info!(db_path = %config.warehouse.db_path.display(), "warehouse opened");

        Ok(Self::new(
            config,
            Arc::new(WarehouseStore::new(warehouse)),
            Arc::new(ReqwestHttpClient::new()),
            Arc::new(SystemClock),
        ))
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Load or renew every token, then start the periodic checks.
    pub async fn start(&self) {
        self.credentials.initialize_all().await;
        self.start_renewal_timers();
    }

    /// Start (or restart) the periodic token checks.
    pub fn start_renewal_timers(&self) {
        let timers = self
            .credentials
            .spawn_renewal_timers(self.config.token_check_interval);
        *self.timers.lock().unwrap_or_else(PoisonError::into_inner) = Some(timers);
    }

    pub fn stop_renewal_timers(&self) {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Serve a data product from the cache or from its upstream API.
    pub async fn data_product(
        &self,
        key: &str,
        product: &str,
        force_refresh: bool,
        version: Option<&str>,
    ) -> Result<HubResponse, ApiHubError> {
        let ws_path = format!("/hub/{product}/{key}");
        let request = DataProductRequest::new(key, product, force_refresh, version)
            .map_err(|error| error.with_ws_path(ws_path.as_str()))?;

        let delivered = self
            .products
            .fetch(request)
            .wait()
            .await
            .map_err(|error| error.with_ws_path(ws_path.as_str()))?;

        Ok(HubResponse {
            content_type: delivered.content_type(),
            from_cache: Some(delivered.from_cache()),
            idr_id: None,
            upstream_status: None,
            body: delivered.payload,
        })
    }

    /// Run a Direct+ identity resolution search.
    pub async fn resolve_identity(&self, params: serde_json::Value) -> Result<HubResponse, ApiHubError> {
        let resolution = self
            .identity
            .resolve(params)
            .await
            .map_err(|error| error.with_ws_path("/api/idr"))?;

        Ok(HubResponse {
            idr_id: Some(resolution.id),
            upstream_status: Some(resolution.upstream_status),
            ..HubResponse::json(resolution.payload)
        })
    }

    /// Record the DUNS chosen for identity resolution `id`.
    pub async fn update_identity_record(&self, id: i64, duns: &str) -> Result<HubResponse, ApiHubError> {
        let row_count = self
            .identity
            .update_record(id, duns)
            .await
            .map_err(|error| error.with_ws_path(format!("/api/idr/{id}")))?;

        Ok(HubResponse::json(pretty_json(&RowCount { row_count })))
    }

    /// Static description of the hub.
    pub fn about() -> HubResponse {
        HubResponse::json(pretty_json(&About {
            msg: "API Hub for requesting, persisting & passing on 3rd party API data",
            license: "Apache license, v2.0",
            license_details: "http://www.apache.org/licenses/LICENSE-2.0",
            version: env!("CARGO_PKG_VERSION"),
        }))
    }

    /// Failures of writes that happened after an outcome was delivered.
    pub fn background_errors(&self) -> broadcast::Receiver<ApiHubError> {
        self.background.subscribe()
    }

    /// Wait for every trailing write started so far.
    pub async fn settle(&self) {
        self.background.settle().await;
    }
}

impl Drop for ApiHub {
    fn drop(&mut self) {
        self.stop_renewal_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_carry_only_known_values() {
        let response = HubResponse {
            from_cache: Some(true),
            ..HubResponse::json(String::from("{}"))
        };
        assert_eq!(
            response.headers(),
            vec![
                ("Content-Type", String::from("application/json")),
                (HEADER_FROM_CACHE, String::from("true")),
            ]
        );
    }

    #[test]
    fn row_count_uses_camel_case() {
        let body = pretty_json(&RowCount { row_count: 1 });
        let value: serde_json::Value = serde_json::from_str(&body).expect("json");
        assert_eq!(value["rowCount"], 1);
    }
}
