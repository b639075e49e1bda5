//! Per-API protocol adapters.
//!
//! An adapter turns a logical request (fetch a token, fetch a product,
//! resolve an identity) into a concrete [`HttpRequest`] and turns the raw
//! upstream response back into a payload. Orchestrators find adapters through
//! [`AdapterSet`] and never branch on the API themselves.

pub mod direct_onboard;
pub mod direct_plus;
pub mod gleif;
pub mod toolkit;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use direct_onboard::DirectOnboardAdapter;
pub use direct_plus::DirectPlusAdapter;
pub use gleif::GleifAdapter;
pub use toolkit::ToolkitAdapter;

use crate::catalog::{ApiId, Product};
use crate::config::{ApiCredentials, HubConfig};
use crate::domain::LookupKey;
use crate::error::ApiHubError;
use crate::http_client::HttpRequest;

/// A token as handed out by an upstream authentication endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub ttl_secs: i64,
}

/// Everything an adapter needs to build one product request.
#[derive(Debug, Clone, Copy)]
pub struct ProductCall<'a> {
    pub product: &'static Product,
    pub key: &'a LookupKey,
    pub version: &'static str,
    /// Current `Authorization` value for token-based APIs.
    pub authorization: Option<&'a str>,
}

pub trait ProtocolAdapter: Send + Sync {
    fn api(&self) -> ApiId;

    /// Request exchanging configured credentials for a token. `None` for
    /// APIs that do not issue tokens.
    fn token_request(&self) -> Option<Result<HttpRequest, ApiHubError>> {
        None
    }

    /// Extract the token and its lifetime from a 2XX token response.
    fn parse_token(&self, body: &str) -> Result<IssuedToken, ApiHubError> {
        let _ = body;
        Err(ApiHubError::generic(
            self.api().structure(),
            format!("API {} does not issue tokens", self.api()),
        ))
    }

    /// Value of the `Authorization` header for a stored token.
    fn authorization(&self, token: &str) -> String {
        token.to_owned()
    }

    fn product_request(&self, call: &ProductCall<'_>) -> Result<HttpRequest, ApiHubError>;

    /// Normalize a 2XX product response into the payload to deliver and
    /// cache.
    fn parse_product(&self, body: String) -> Result<String, ApiHubError> {
        Ok(body)
    }

    /// Request for an identity resolution search. `None` when the API offers
    /// no such search.
    fn identity_request(
        &self,
        params: &serde_json::Map<String, serde_json::Value>,
        authorization: Option<&str>,
    ) -> Option<Result<HttpRequest, ApiHubError>> {
        let _ = (params, authorization);
        None
    }
}

/// Adapters registered by API identifier.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: BTreeMap<ApiId, Arc<dyn ProtocolAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter per catalog API, wired with the configured credentials.
    pub fn from_config(config: &HubConfig) -> Self {
        let timeout_ms = config.http_timeout_ms;
        Self::new()
            .with(Arc::new(
                DirectPlusAdapter::new(config.credentials(ApiId::Dpl).cloned())
                    .with_timeout_ms(timeout_ms),
            ))
            .with(Arc::new(
                DirectOnboardAdapter::new(config.credentials(ApiId::D2o).cloned())
                    .with_timeout_ms(timeout_ms),
            ))
            .with(Arc::new(
                ToolkitAdapter::new(config.credentials(ApiId::Dit).cloned())
                    .with_timeout_ms(timeout_ms),
            ))
            .with(Arc::new(GleifAdapter::new().with_timeout_ms(timeout_ms)))
    }

    pub fn with(mut self, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        self.adapters.insert(adapter.api(), adapter);
        self
    }

    pub fn get(&self, api: ApiId) -> Result<Arc<dyn ProtocolAdapter>, ApiHubError> {
        self.adapters.get(&api).cloned().ok_or_else(|| {
            ApiHubError::generic(
                api.structure(),
                format!("no protocol adapter registered for API {api}"),
            )
        })
    }
}

/// Credentials or a configuration error naming the API.
pub(crate) fn require_credentials(
    api: ApiId,
    credentials: Option<&ApiCredentials>,
) -> Result<&ApiCredentials, ApiHubError> {
    credentials.ok_or_else(|| {
        let prefix = api.as_str().to_ascii_uppercase();
        ApiHubError::generic(
            api.structure(),
            format!("no credentials configured for API {api} (set APIHUB_{prefix}_USER and APIHUB_{prefix}_PASSWORD)"),
        )
    })
}

/// Form-encode `pairs` the way `application/x-www-form-urlencoded` query
/// strings are written.
pub(crate) fn query_string<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(name, value)| format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
