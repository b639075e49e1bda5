//! # API Hub Core
//!
//! Acquisition, caching and credential renewal engine for third-party
//! company data APIs (D&B Direct+, Direct 2.0 Onboard, Data Integration
//! Toolkit and GLEIF).
//!
//! ## Overview
//!
//! - **Product catalog** naming every product, its API, key kind and versions
//! - **Protocol adapters** turning logical requests into HTTP requests
//! - **Credential managers** loading, validating and renewing API tokens
//! - **Data product orchestrator** serving payloads from cache or upstream
//! - **Identity resolution** with a two-phase persisted search record
//! - **Error model** rendering failures as XML or JSON
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | One protocol adapter per upstream API |
//! | [`background`] | Trailing writes and their error channel |
//! | [`catalog`] | APIs, providers and data products |
//! | [`clock`] | Wall-clock abstraction |
//! | [`config`] | Environment-driven configuration |
//! | [`credentials`] | Token life cycle per API |
//! | [`domain`] | Validated lookup keys |
//! | [`error`] | Wire-level error model |
//! | [`http_client`] | HTTP client abstraction |
//! | [`hub`] | The [`ApiHub`] facade |
//! | [`identity`] | Direct+ identity resolution |
//! | [`product`] | Cache-or-fetch orchestration |
//! | [`store`] | Persistence interface and implementations |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use apihub_core::{ApiHub, HubConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = ApiHub::open(HubConfig::from_env())?;
//!     hub.start().await;
//!
//!     let response = hub.data_product("12-345", "cmpelk", false, None).await?;
//!     println!("{}", response.body);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod background;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod hub;
pub mod identity;
pub mod product;
pub mod store;

pub use adapters::{AdapterSet, IssuedToken, ProductCall, ProtocolAdapter};
pub use background::BackgroundTasks;
pub use catalog::{ApiId, AuthStyle, DataStructure, KeyKind, Product, ProviderId, PRODUCTS};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApiCredentials, HubConfig, Secret};
pub use credentials::{
    CredentialManager, CredentialState, Credentials, RenewalCheck, RenewalTimers, Token,
    RENEWAL_THRESHOLD_MINUTES,
};
pub use domain::LookupKey;
pub use error::{ApiHubError, ErrorKind, ExtApiError, UpstreamBody, ValidationError};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use hub::{ApiHub, HubResponse};
pub use identity::{IdentityResolution, IdentityResolver};
pub use product::{DataProduct, DataProductFetcher, DataProductRequest, FetchPhase, Origin, PendingProduct};
pub use store::{HubStore, MemoryStore, StoreError, StoreOperation, WarehouseStore};
