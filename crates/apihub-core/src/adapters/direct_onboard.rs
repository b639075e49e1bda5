//! D&B Direct 2.0 Onboard (REST/JSON, header credentials exchanged for a
//! session token).

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{query_string, require_credentials, IssuedToken, ProductCall, ProtocolAdapter};
use crate::catalog::{ApiId, DataStructure};
use crate::config::ApiCredentials;
use crate::error::{ApiHubError, ErrorKind};
use crate::http_client::{HttpAuth, HttpRequest, DEFAULT_TIMEOUT_MS};

const HOST: &str = "https://direct.dnb.com";
const APPLICATION_TRANSACTION_ID: &str = "apihub";

/// Session tokens are documented to live for 24 hours.
pub const SESSION_TTL_SECS: i64 = 86_400;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationRequest {
    transaction_detail: TransactionDetail,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TransactionDetail {
    #[serde(rename = "ApplicationTransactionID")]
    application_transaction_id: &'static str,
    #[serde(rename = "ServiceTransactionID")]
    service_transaction_id: String,
    transaction_timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResponse {
    authentication_detail: Option<AuthenticationDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationDetail {
    token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DirectOnboardAdapter {
    credentials: Option<ApiCredentials>,
    timeout_ms: u64,
}

impl DirectOnboardAdapter {
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

    fn authentication_body() -> Result<String, ApiHubError> {
        let transaction_timestamp = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|error| {
            ApiHubError::generic(DataStructure::Json, format!("unable to format timestamp: {error}"))
        })?;

        let body = AuthenticationRequest {
            transaction_detail: TransactionDetail {
                application_transaction_id: APPLICATION_TRANSACTION_ID,
                service_transaction_id: Uuid::new_v4().simple().to_string(),
                transaction_timestamp,
            },
        };

        serde_json::to_string(&body).map_err(|error| {
            ApiHubError::generic(DataStructure::Json, format!("unable to encode request: {error}"))
        })
    }
}

impl ProtocolAdapter for DirectOnboardAdapter {
    fn api(&self) -> ApiId {
        ApiId::D2o
    }

    fn token_request(&self) -> Option<Result<HttpRequest, ApiHubError>> {
        let request = require_credentials(ApiId::D2o, self.credentials.as_ref()).and_then(|credentials| {
            let body = Self::authentication_body()?;
            Ok(HttpRequest::post(format!("{HOST}/Authentication/V2.0/"))
                .with_header("Content-Type", "application/json")
                .with_auth(&HttpAuth::Header {
                    name: String::from("x-dnb-user"),
                    value: credentials.user.clone(),
                })
                .with_auth(&HttpAuth::Header {
                    name: String::from("x-dnb-pwd"),
                    value: credentials.password.expose().to_owned(),
                })
                .with_body(body)
                .with_timeout_ms(self.timeout_ms))
        });
        Some(request)
    }

    fn parse_token(&self, body: &str) -> Result<IssuedToken, ApiHubError> {
        let parsed: AuthenticationResponse = serde_json::from_str(body).map_err(|error| {
            ApiHubError::new(ErrorKind::UpstreamStatus, DataStructure::Json)
                .with_msg_info(format!("unable to parse Direct 2.0 authentication response: {error}"))
        })?;

        parsed
            .authentication_detail
            .and_then(|detail| detail.token)
            .filter(|token| !token.is_empty())
            .map(|token| IssuedToken {
                token,
                ttl_secs: SESSION_TTL_SECS,
            })
            .ok_or_else(|| {
                ApiHubError::new(ErrorKind::UpstreamStatus, DataStructure::Json)
                    .with_msg_info("Direct 2.0 authentication response carries no token")
                    .with_ext_api(None, Some(body))
            })
    }

    fn product_request(&self, call: &ProductCall<'_>) -> Result<HttpRequest, ApiHubError> {
        let mut params = vec![("OrderReasonCode", "6332")];
        if call.product.id == "CMP_BOS" {
            params.push(("OwnershipPercentage", "25"));
        }

        let url = format!(
            "{HOST}/{}/organizations/{}/products/{}?{}",
            call.version,
            call.key,
            call.product.id,
            query_string(params)
        );

        let request = HttpRequest::get(url)
            .with_header("Content-Type", "application/json")
            .with_timeout_ms(self.timeout_ms);
        Ok(match call.authorization {
            Some(value) => request.with_auth(&HttpAuth::Authorization(value.to_owned())),
            None => request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use crate::domain::LookupKey;

    fn adapter() -> DirectOnboardAdapter {
        DirectOnboardAdapter::new(Some(ApiCredentials::new("d2o-user", "d2o-pass")))
    }

    #[test]
    fn token_request_sends_header_credentials_and_transaction() {
        let request = adapter().token_request().expect("issues tokens").expect("request");

        assert_eq!(request.url, "https://direct.dnb.com/Authentication/V2.0/");
        assert_eq!(request.header("x-dnb-user"), Some("d2o-user"));
        assert_eq!(request.header("x-dnb-pwd"), Some("d2o-pass"));

        let body: serde_json::Value =
            serde_json::from_str(request.body.as_deref().expect("body")).expect("json body");
        let detail = &body["TransactionDetail"];
        assert!(detail["ServiceTransactionID"].as_str().is_some());
        assert!(detail["TransactionTimestamp"].as_str().is_some());
    }

    #[test]
    fn service_transaction_ids_are_unique() {
        let first = DirectOnboardAdapter::authentication_body().expect("body");
        let second = DirectOnboardAdapter::authentication_body().expect("body");
        assert_ne!(first, second);
    }

    #[test]
    fn parses_nested_token_with_fixed_ttl() {
        let issued = adapter()
            .parse_token(r#"{"AuthenticationDetail":{"Token":"sess"}}"#)
            .expect("token");
        assert_eq!(issued.token, "sess");
        assert_eq!(issued.ttl_secs, SESSION_TTL_SECS);
        assert_eq!(adapter().authorization("sess"), "sess");

        assert!(adapter().parse_token(r#"{"TransactionResult":{}}"#).is_err());
    }

    #[test]
    fn beneficial_ownership_adds_percentage() {
        let product = Product::lookup("CMP_BOS").expect("product");
        let key = LookupKey::parse(product.key, "804735132").expect("key");
        let request = adapter()
            .product_request(&ProductCall {
                product,
                key: &key,
                version: "V6.0",
                authorization: Some("sess"),
            })
            .expect("request");

        assert_eq!(
            request.url,
            "https://direct.dnb.com/V6.0/organizations/804735132/products/CMP_BOS?OrderReasonCode=6332&OwnershipPercentage=25"
        );
        assert_eq!(request.header("authorization"), Some("sess"));
    }
}
