//! Direct+ identity resolution ("IDR").
//!
//! The match call and the insert of the search parameters run concurrently.
//! Once both succeed the candidates are delivered with the new record id, and
//! the results are attached to that record in the background.

use std::sync::Arc;

use serde::Serialize;

use crate::adapters::AdapterSet;
use crate::background::BackgroundTasks;
use crate::catalog::{ApiId, DataStructure, KeyKind};
use crate::clock::Clock;
use crate::credentials::Credentials;
use crate::domain::LookupKey;
use crate::error::{ApiHubError, ValidationError};
use crate::http_client::{execute_with_deadline, HttpClient};
use crate::store::HubStore;

/// Match candidates returned for one search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityResolution {
    /// Id of the stored search record.
    pub id: i64,
    pub upstream_status: u16,
    pub obtained_at_ms: i64,
    /// Upstream JSON, unmodified.
    pub payload: String,
}

#[derive(Clone)]
pub struct IdentityResolver {
    adapters: AdapterSet,
    credentials: Credentials,
    http_client: Arc<dyn HttpClient>,
    store: Arc<dyn HubStore>,
    clock: Arc<dyn Clock>,
    background: BackgroundTasks,
}

impl IdentityResolver {
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

    pub async fn resolve(&self, params: serde_json::Value) -> Result<IdentityResolution, ApiHubError> {
        let Some(search) = params.as_object() else {
            return Err(ApiHubError::from_validation(
                DataStructure::Json,
                &ValidationError::InvalidSearchParams,
            ));
        };

        let adapter = self.adapters.get(ApiId::Dpl)?;
        let manager = self.credentials.get(ApiId::Dpl).ok_or_else(|| {
            ApiHubError::generic(DataStructure::Json, "no credential manager registered for API dpl")
        })?;
        let authorization = manager.authorization_or_renew().await?;

        let request = adapter
            .identity_request(search, Some(&authorization))
            .unwrap_or_else(|| {
                Err(ApiHubError::generic(
                    DataStructure::Json,
                    "API dpl offers no identity resolution",
                ))
            })?;

        let params_at_ms = self.clock.now_ms();
        let upstream = async {
            execute_with_deadline(self.http_client.as_ref(), request)
                .await
                .map_err(|error| ApiHubError::from_transport(DataStructure::Json, &error))
        };
        let persisted = async {
            self.store
                .insert_idr_params(&params, params_at_ms)
                .await
                .map_err(|error| {
                    ApiHubError::persistence(
                        DataStructure::Json,
                        format!("unable to persist identity resolution parameters: {error}"),
                    )
                })
        };

        let (response, id) = tokio::try_join!(upstream, persisted)?;
        let obtained_at_ms = self.clock.now_ms();

        if !response.is_success() {
            tracing::info!(
                id,
                status = response.status,
                "identity resolution returned an HTTP status code outside the 2XX range"
            );
            return Err(ApiHubError::upstream_rejected(
                DataStructure::Json,
                response.status,
                &response.body,
            ));
        }

        tracing::info!(id, status = response.status, "identity resolution loaded");
        let resolution = IdentityResolution {
            id,
            upstream_status: response.status,
            obtained_at_ms,
            payload: response.body,
        };
        self.attach_results(&resolution);

        Ok(resolution)
    }

    fn attach_results(&self, resolution: &IdentityResolution) {
        let store = Arc::clone(&self.store);
        let background = self.background.clone();
        let id = resolution.id;
        let upstream_status = resolution.upstream_status;
        let obtained_at_ms = resolution.obtained_at_ms;
        let payload = resolution.payload.clone();

        self.background.spawn(async move {
            match store
                .update_idr_results(id, &payload, upstream_status, obtained_at_ms)
                .await
            {
                Ok(1) => tracing::info!(id, "persisted the identity resolution match candidates"),
                Ok(rows) => tracing::warn!(id, rows, "identity resolution results changed an unexpected number of rows"),
                Err(error) => {
                    tracing::error!(id, %error, "unable to persist identity resolution results");
                    background.publish(ApiHubError::persistence(
                        DataStructure::Json,
                        format!("unable to persist results of identity resolution {id}: {error}"),
                    ));
                }
            }
        });
    }

    /// Record the DUNS chosen from the candidates of search `id`.
    pub async fn update_record(&self, id: i64, duns: &str) -> Result<usize, ApiHubError> {
        let duns = LookupKey::parse(KeyKind::Duns, duns)
            .map_err(|error| ApiHubError::from_validation(DataStructure::Json, &error))?;

        let rows = self
            .store
            .update_idr_duns(id, duns.as_str())
            .await
            .map_err(|error| {
                ApiHubError::persistence(
                    DataStructure::Json,
                    format!("unable to update identity resolution {id}: {error}"),
                )
            })?;

        if rows != 1 {
            tracing::info!(id, rows, "identity resolution DUNS update matched no single record");
            return Err(ApiHubError::not_found(
                DataStructure::Json,
                format!("Identity resolution record {id} can not be located (rows changed: {rows})"),
            ));
        }

        tracing::info!(id, duns = %duns, "identity resolution DUNS updated");
        Ok(rows)
    }
}
