//! Shared fixtures for the behavior tests.

#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use apihub_core::{
    ApiCredentials, ApiHub, ApiId, HttpClient, HttpError, HttpRequest, HttpResponse, HubConfig,
    ManualClock, MemoryStore,
};

/// 2023-11-14T22:13:20Z
pub const START_MS: i64 = 1_700_000_000_000;

pub const DPL_TOKEN: &str = r#"{"access_token":"dpl-token-0001","expiresIn":86400}"#;
pub const D2O_TOKEN: &str = r#"{"AuthenticationDetail":{"Token":"d2o-session-0001"}}"#;

/// Answers requests by URL fragment and records every request it sees.
#[derive(Clone, Default)]
pub struct ScriptedHttpClient {
    routes: Arc<Mutex<Vec<(String, Result<HttpResponse, HttpError>)>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests whose URL contains `fragment`. Later routes for the
    /// same fragment win.
    pub fn respond(self, fragment: &str, response: HttpResponse) -> Self {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(0, (fragment.to_owned(), Ok(response)));
        self
    }

    pub fn fail(self, fragment: &str, error: HttpError) -> Self {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(0, (fragment.to_owned(), Err(error)));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn count(&self, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.url.contains(fragment))
            .count()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let answer = self
            .routes
            .lock()
            .expect("routes lock")
            .iter()
            .find(|(fragment, _)| request.url.contains(fragment.as_str()))
            .map(|(_, answer)| answer.clone())
            .unwrap_or_else(|| Err(HttpError::new(format!("no route for {}", request.url))));
        self.requests.lock().expect("requests lock").push(request);
        Box::pin(async move { answer })
    }
}

pub fn config() -> HubConfig {
    HubConfig::default()
        .with_credentials(ApiId::Dpl, ApiCredentials::new("dpl-user", "dpl-pass"))
        .with_credentials(ApiId::D2o, ApiCredentials::new("d2o-user", "d2o-pass"))
        .with_credentials(ApiId::Dit, ApiCredentials::new("dit-user", "dit-pass"))
        .with_http_timeout_ms(2_000)
}

pub struct Fixture {
    pub hub: ApiHub,
    pub store: MemoryStore,
    pub http: ScriptedHttpClient,
    pub clock: ManualClock,
}

pub fn hub(http: ScriptedHttpClient) -> Fixture {
    let store = MemoryStore::new();
    let clock = ManualClock::new(START_MS);
    let hub = ApiHub::new(
        config(),
        Arc::new(store.clone()),
        Arc::new(http.clone()),
        Arc::new(clock.clone()),
    );
    Fixture {
        hub,
        store,
        http,
        clock,
    }
}

pub fn soap_response(dgx: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\">\
         <soapenv:Body><ser:ws_OtherGDPProductsResponse xmlns:ser=\"http://www.dnb.com/ws\">\
         {dgx}</ser:ws_OtherGDPProductsResponse></soapenv:Body></soapenv:Envelope>"
    )
}
