//! Cache-or-fetch orchestration for data products.
//!
//! A request is validated synchronously by [`DataProductRequest::new`]; the
//! flow itself runs on a spawned task and delivers its outcome exactly once
//! through a [`PendingProduct`]. Fresh payloads are written to the store after
//! delivery, so a failed write never invalidates a delivered result.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::adapters::{AdapterSet, ProductCall};
use crate::background::BackgroundTasks;
use crate::catalog::{DataStructure, Product};
use crate::clock::Clock;
use crate::credentials::Credentials;
use crate::domain::LookupKey;
use crate::error::ApiHubError;
use crate::http_client::{execute_with_deadline, HttpClient};
use crate::store::HubStore;

/// A validated data product request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataProductRequest {
    product: &'static Product,
    key: LookupKey,
    version: &'static str,
    force_refresh: bool,
}

impl DataProductRequest {
    /// Validate the product, key and version.
    ///
    /// Unknown products are reported as JSON; other validation failures use
    /// the product's own structure.
    pub fn new(
        key: &str,
        product_id: &str,
        force_refresh: bool,
        version: Option<&str>,
    ) -> Result<Self, ApiHubError> {
        let product = Product::lookup(product_id).map_err(|error| {
            tracing::info!(%error, "data product request rejected");
            ApiHubError::from_validation(DataStructure::Json, &error)
        })?;

        let structure = product.structure();
        let reject = |error: crate::ValidationError| {
            tracing::info!(product = product.id, %error, "data product request rejected");
            ApiHubError::from_validation(structure, &error)
        };

        let key = LookupKey::parse(product.key, key).map_err(reject)?;
        let version = product.resolve_version(version).map_err(reject)?;

        Ok(Self {
            product,
            key,
            version,
            force_refresh,
        })
    }

    pub fn product(&self) -> &'static Product {
        self.product
    }

    pub fn key(&self) -> &LookupKey {
        &self.key
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn force_refresh(&self) -> bool {
        self.force_refresh
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Cache,
    Fresh,
}

/// Steps of one fetch, as they appear in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Initializing,
    CacheCheck,
    Fetching,
    ParsingUpstream,
    Loaded,
    Persisting,
    Failed,
}

/// A delivered data product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataProduct {
    pub product: &'static Product,
    pub key: LookupKey,
    pub version: &'static str,
    pub force_refresh: bool,
    /// Payload text exactly as cached or as normalized from upstream.
    pub payload: String,
    pub obtained_at_ms: Option<i64>,
    pub origin: Origin,
}

impl DataProduct {
    pub fn structure(&self) -> DataStructure {
        self.product.structure()
    }

    pub fn content_type(&self) -> &'static str {
        self.structure().content_type()
    }

    pub fn from_cache(&self) -> bool {
        self.origin == Origin::Cache
    }
}

/// Outcome of a running fetch, delivered once.
#[derive(Debug)]
pub struct PendingProduct {
    structure: DataStructure,
    outcome: oneshot::Receiver<Result<DataProduct, ApiHubError>>,
}

impl PendingProduct {
    pub async fn wait(self) -> Result<DataProduct, ApiHubError> {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ApiHubError::generic(
                self.structure,
                "data product flow ended without an outcome",
            )),
        }
    }
}

#[derive(Clone)]
pub struct DataProductFetcher {
    adapters: AdapterSet,
    credentials: Credentials,
    http_client: Arc<dyn HttpClient>,
    store: Arc<dyn HubStore>,
    clock: Arc<dyn Clock>,
    background: BackgroundTasks,
}

impl DataProductFetcher {
    pub fn new(
        adapters: AdapterSet,
        credentials: Credentials,
        http_client: Arc<dyn HttpClient>,
        store: Arc<dyn HubStore>,
        clock: Arc<dyn Clock>,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            adapters,
            credentials,
            http_client,
            store,
            clock,
            background,
        }
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Start the flow for a validated request.
    pub fn fetch(&self, request: DataProductRequest) -> PendingProduct {
        let (sender, outcome) = oneshot::channel();
        let structure = request.product.structure();
        let fetcher = self.clone();

        self.background.spawn(async move {
            fetcher.run(request, sender).await;
        });

        PendingProduct { structure, outcome }
    }

    async fn run(
        self,
        request: DataProductRequest,
        sender: oneshot::Sender<Result<DataProduct, ApiHubError>>,
    ) {
        let product = request.product;
        self.phase(&request, FetchPhase::Initializing);

        let outcome = self.load(&request).await;
        let fresh = matches!(&outcome, Ok(delivered) if delivered.origin == Origin::Fresh);
        let persist = match &outcome {
            Ok(delivered) if fresh => Some((delivered.payload.clone(), delivered.obtained_at_ms)),
            _ => None,
        };

        match &outcome {
            Ok(delivered) => {
                self.phase(&request, FetchPhase::Loaded);
                tracing::info!(
                    product = product.id,
                    key = %request.key,
                    origin = ?delivered.origin,
                    "data product loaded"
                );
            }
            Err(error) => {
                self.phase(&request, FetchPhase::Failed);
                tracing::warn!(product = product.id, key = %request.key, %error, "data product failed");
            }
        }

        if sender.send(outcome).is_err() {
            tracing::debug!(product = product.id, "caller stopped waiting for data product");
        }

        if let Some((payload, obtained_at_ms)) = persist {
            self.phase(&request, FetchPhase::Persisting);
            let obtained_at_ms = obtained_at_ms.unwrap_or_else(|| self.clock.now_ms());
            if let Err(error) = self
                .store
                .upsert_data_product(product, &request.key, &payload, obtained_at_ms)
                .await
            {
                tracing::error!(product = product.id, key = %request.key, %error, "unable to persist data product");
                self.background.publish(ApiHubError::persistence(
                    product.structure(),
                    format!("unable to persist {} for key {}: {error}", product.id, request.key),
                ));
            }
        }
    }

    async fn load(&self, request: &DataProductRequest) -> Result<DataProduct, ApiHubError> {
        let product = request.product;
        let structure = product.structure();

        if !request.force_refresh {
            self.phase(request, FetchPhase::CacheCheck);
            let cached = self
                .store
                .get_data_product(product, &request.key)
                .await
                .map_err(|error| {
                    ApiHubError::persistence(structure, format!("unable to read cached {}: {error}", product.id))
                })?;

            let hit = cached.and_then(|record| {
                record
                    .payload
                    .filter(|payload| !payload.is_empty())
                    .map(|payload| (payload, record.obtained_at))
            });
            tracing::debug!(product = product.id, key = %request.key, hit = hit.is_some(), "cache checked");

            if let Some((payload, obtained_at_ms)) = hit {
                return Ok(self.delivered(request, payload, obtained_at_ms, Origin::Cache));
            }
        }

        self.phase(request, FetchPhase::Fetching);
        let adapter = self.adapters.get(product.api)?;

        let authorization = if product.api.auth_style().issues_tokens() {
            let manager = self.credentials.get(product.api).ok_or_else(|| {
                ApiHubError::generic(
                    structure,
                    format!("no credential manager registered for API {}", product.api),
                )
            })?;
            Some(manager.authorization_or_renew().await?)
        } else {
            None
        };

        let http_request = adapter.product_request(&ProductCall {
            product,
            key: &request.key,
            version: request.version,
            authorization: authorization.as_deref(),
        })?;

        let response = execute_with_deadline(self.http_client.as_ref(), http_request)
            .await
            .map_err(|error| ApiHubError::from_transport(structure, &error))?;
        let obtained_at_ms = self.clock.now_ms();

        if !response.is_success() {
            tracing::info!(
                product = product.id,
                status = response.status,
                "API call returned an HTTP status code outside the 2XX range"
            );
            return Err(ApiHubError::upstream_rejected(structure, response.status, &response.body));
        }

        self.phase(request, FetchPhase::ParsingUpstream);
        let payload = adapter.parse_product(response.body)?;

        Ok(self.delivered(request, payload, Some(obtained_at_ms), Origin::Fresh))
    }

    fn delivered(
        &self,
        request: &DataProductRequest,
        payload: String,
        obtained_at_ms: Option<i64>,
        origin: Origin,
    ) -> DataProduct {
        DataProduct {
            product: request.product,
            key: request.key.clone(),
            version: request.version,
            force_refresh: request.force_refresh,
            payload,
            obtained_at_ms,
            origin,
        }
    }

    fn phase(&self, request: &DataProductRequest, phase: FetchPhase) {
        tracing::trace!(product = request.product.id, key = %request.key, ?phase, "data product phase");
    }
}
