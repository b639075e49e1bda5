//! Environment-driven hub configuration.

use std::collections::BTreeMap;
use std::env;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

use apihub_warehouse::WarehouseConfig;

use crate::catalog::ApiId;
use crate::http_client::DEFAULT_TIMEOUT_MS;

/// Default period of the credential renewal check.
pub const DEFAULT_TOKEN_CHECK_SECS: u64 = 1_800;

/// A string that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// User/password pair provisioned for one upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub user: String,
    pub password: Secret,
}

impl ApiCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: Secret::new(password),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub warehouse: WarehouseConfig,
    credentials: BTreeMap<ApiId, ApiCredentials>,
    pub http_timeout_ms: u64,
    pub token_check_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            warehouse: WarehouseConfig::default(),
            credentials: BTreeMap::new(),
            http_timeout_ms: DEFAULT_TIMEOUT_MS,
            token_check_interval: Duration::from_secs(DEFAULT_TOKEN_CHECK_SECS),
        }
    }
}

impl HubConfig {
    /// Read `APIHUB_*` variables. Missing or unparsable values keep their
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        for api in ApiId::ALL {
            let prefix = format!("APIHUB_{}", api.as_str().to_ascii_uppercase());
            let user = env::var(format!("{prefix}_USER")).ok();
            let password = env::var(format!("{prefix}_PASSWORD")).ok();
            if let (Some(user), Some(password)) = (user, password) {
                config.credentials.insert(api, ApiCredentials::new(user, password));
            }
        }

        if let Some(timeout_ms) = env_u64("APIHUB_HTTP_TIMEOUT_MS") {
            config.http_timeout_ms = timeout_ms;
        }
        if let Some(secs) = env_u64("APIHUB_TOKEN_CHECK_SECS") {
            config.token_check_interval = Duration::from_secs(secs);
        }

        config
    }

    pub fn with_credentials(mut self, api: ApiId, credentials: ApiCredentials) -> Self {
        self.credentials.insert(api, credentials);
        self
    }

    pub fn with_http_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.http_timeout_ms = timeout_ms;
        self
    }

    pub fn with_token_check_interval(mut self, interval: Duration) -> Self {
        self.token_check_interval = interval;
        self
    }

    pub fn credentials(&self, api: ApiId) -> Option<&ApiCredentials> {
        self.credentials.get(&api)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!(variable = name, value = raw.as_str(), "ignoring invalid setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_passwords() {
        let config = HubConfig::default()
            .with_credentials(ApiId::Dpl, ApiCredentials::new("svc-user", "hunter2"));

        let rendered = format!("{config:?}");
        assert!(rendered.contains("svc-user"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = HubConfig::default();
        assert_eq!(config.http_timeout_ms, 30_000);
        assert_eq!(config.token_check_interval, Duration::from_secs(1_800));
        assert!(config.credentials(ApiId::D2o).is_none());
    }
}
