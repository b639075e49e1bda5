//! GLEIF LEI lookup (REST/JSON, no authentication).

use super::{query_string, ProductCall, ProtocolAdapter};
use crate::catalog::ApiId;
use crate::error::ApiHubError;
use crate::http_client::{HttpRequest, DEFAULT_TIMEOUT_MS};

const HOST: &str = "https://leilookup.gleif.org";

#[derive(Debug, Clone)]
pub struct GleifAdapter {
    timeout_ms: u64,
}

impl Default for GleifAdapter {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl GleifAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl ProtocolAdapter for GleifAdapter {
    fn api(&self) -> ApiId {
        ApiId::Lei
    }

    fn product_request(&self, call: &ProductCall<'_>) -> Result<HttpRequest, ApiHubError> {
        let url = format!(
            "{HOST}/api/{}/leirecords?{}",
            call.version,
            query_string([("lei", call.key.as_str())])
        );
        Ok(HttpRequest::get(url)
            .with_header("Content-Type", "application/json")
            .with_timeout_ms(self.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use crate::domain::LookupKey;

    #[test]
    fn lookup_key_travels_as_query_parameter() {
        let product = Product::lookup("lei_ref").expect("product");
        let key = LookupKey::parse(product.key, "529900W18LQJJN6SJ336").expect("key");
        let request = GleifAdapter::new()
            .product_request(&ProductCall {
                product,
                key: &key,
                version: "v2",
                authorization: None,
            })
            .expect("request");

        assert_eq!(
            request.url,
            "https://leilookup.gleif.org/api/v2/leirecords?lei=529900W18LQJJN6SJ336"
        );
        assert!(request.header("authorization").is_none());
        assert!(GleifAdapter::new().token_request().is_none());
    }
}
