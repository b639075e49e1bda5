//! D&B Direct+ (REST/JSON, Basic credentials exchanged for a bearer token).

use serde::Deserialize;

use super::{query_string, require_credentials, IssuedToken, ProductCall, ProtocolAdapter};
use crate::catalog::{ApiId, DataStructure};
use crate::config::ApiCredentials;
use crate::error::{ApiHubError, ErrorKind};
use crate::http_client::{HttpAuth, HttpRequest, DEFAULT_TIMEOUT_MS};

const HOST: &str = "https://plus.dnb.com";
const ORIGIN: &str = "www.dnb.com";
const TOKEN_BODY: &str = r#"{ "grant_type" : "client_credentials" }"#;

/// Longest lifetime accepted from the token endpoint; larger values are capped.
pub const MAX_TOKEN_TTL_SECS: i64 = 366 * 86_400;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct DirectPlusAdapter {
    credentials: Option<ApiCredentials>,
    timeout_ms: u64,
}

impl DirectPlusAdapter {
    pub fn new(credentials: Option<ApiCredentials>) -> Self {
        Self {
            credentials,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn get(&self, url: String, authorization: Option<&str>) -> HttpRequest {
        let request = HttpRequest::get(url)
            .with_header("Content-Type", "application/json")
            .with_header("Origin", ORIGIN)
            .with_timeout_ms(self.timeout_ms);
        match authorization {
            Some(value) => request.with_auth(&HttpAuth::Authorization(value.to_owned())),
            None => request,
        }
    }
}

impl ProtocolAdapter for DirectPlusAdapter {
    fn api(&self) -> ApiId {
        ApiId::Dpl
    }

    fn token_request(&self) -> Option<Result<HttpRequest, ApiHubError>> {
        let request = require_credentials(ApiId::Dpl, self.credentials.as_ref()).map(|credentials| {
            HttpRequest::post(format!("{HOST}/v2/token"))
                .with_header("Content-Type", "application/json")
                .with_header("Origin", ORIGIN)
                .with_auth(&HttpAuth::Basic {
                    user: credentials.user.clone(),
                    password: credentials.password.expose().to_owned(),
                })
                .with_body(TOKEN_BODY)
                .with_timeout_ms(self.timeout_ms)
        });
        Some(request)
    }

    fn parse_token(&self, body: &str) -> Result<IssuedToken, ApiHubError> {
        let parsed: TokenResponse = serde_json::from_str(body).map_err(|error| {
            ApiHubError::new(ErrorKind::UpstreamStatus, DataStructure::Json)
                .with_msg_info(format!("unable to parse Direct+ token response: {error}"))
        })?;

        let Some(token) = parsed.access_token.filter(|token| !token.is_empty()) else {
            return Err(ApiHubError::new(ErrorKind::UpstreamStatus, DataStructure::Json)
                .with_msg_info("Direct+ token response carries no access_token")
                .with_ext_api(None, Some(body)));
        };

        let ttl_secs = match parsed.expires_in {
            Some(ttl_secs) if ttl_secs > MAX_TOKEN_TTL_SECS => {
                tracing::warn!(ttl_secs, cap = MAX_TOKEN_TTL_SECS, "capping Direct+ token lifetime");
                MAX_TOKEN_TTL_SECS
            }
            Some(ttl_secs) if ttl_secs > 0 => ttl_secs,
            expires_in => {
                return Err(ApiHubError::new(ErrorKind::UpstreamStatus, DataStructure::Json)
                    .with_msg_info(format!("Direct+ token response carries no usable expiresIn ({expires_in:?})"))
                    .with_ext_api(None, Some(body)));
            }
        };

        Ok(IssuedToken { token, ttl_secs })
    }

    fn authorization(&self, token: &str) -> String {
        format!("Bearer {token}")
    }

    fn product_request(&self, call: &ProductCall<'_>) -> Result<HttpRequest, ApiHubError> {
        let key = call.key.as_str();
        let mut params = vec![("productId", call.product.id), ("versionId", call.version)];

        let path = match call.product.id {
            "cmptcs" => {
                params.extend([("tradeUp", "hq"), ("orderReason", "6332")]);
                format!("/v1/data/duns/{key}")
            }
            "cmpcvf" => {
                params.push(("tradeUp", "hq"));
                format!("/v1/data/duns/{key}")
            }
            "cmpbos" => {
                params.extend([
                    ("duns", key),
                    ("ownershipType", "BENF_OWRP"),
                    ("ownershipPercentage", "25"),
                    ("tradeUp", "hq"),
                ]);
                String::from("/v1/beneficialowner")
            }
            _ => format!("/v1/data/duns/{key}"),
        };

        let url = format!("{HOST}{path}?{}", query_string(params));
        Ok(self.get(url, call.authorization))
    }

    fn identity_request(
        &self,
        params: &serde_json::Map<String, serde_json::Value>,
        authorization: Option<&str>,
    ) -> Option<Result<HttpRequest, ApiHubError>> {
        let values: Vec<(&str, String)> = params
            .iter()
            .filter_map(|(name, value)| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(text) => Some((name.as_str(), text.clone())),
                other => Some((name.as_str(), other.to_string())),
            })
            .collect();
        let query = query_string(values.iter().map(|(name, value)| (*name, value.as_str())));

        let url = format!("{HOST}/v1/match/cleanseMatch?{query}");
        Some(Ok(self.get(url, authorization)))
    }
}
