//! Per-API credential life cycle.
//!
//! A [`CredentialManager`] loads the newest stored token for its API, renews
//! it upstream when it is missing or close to expiry, persists every new
//! token and re-checks on a fixed period. Callers read the authorization
//! value at call time through [`CredentialManager::authorization`]; it may be
//! replaced between two reads.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::adapters::ProtocolAdapter;
use crate::catalog::{ApiId, DataStructure};
use crate::clock::Clock;
use crate::error::ApiHubError;
use crate::http_client::{execute_with_deadline, HttpClient};
use crate::store::{AuthTokenRecord, HubStore};

/// Renewal is advised once fewer minutes than this remain.
pub const RENEWAL_THRESHOLD_MINUTES: i64 = 76;

/// A bearer or session token issued by an upstream API.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    /// Store-assigned id, once persisted.
    pub id: Option<i64>,
    pub value: String,
    /// Unix milliseconds at which the token was obtained.
    pub issued_at_ms: i64,
    pub ttl_secs: i64,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("value", &mask(&self.value))
            .field("issued_at_ms", &self.issued_at_ms)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl Token {
    /// Whole minutes until expiry, rounded down. Zero when the lifetime or
    /// issue time is unknown.
    pub fn remaining_minutes(&self, now_ms: i64) -> i64 {
        if self.ttl_secs == 0 || self.issued_at_ms == 0 {
            return 0;
        }
        let expires_at_ms = self
            .issued_at_ms
            .saturating_add(self.ttl_secs.saturating_mul(1_000));
        expires_at_ms.saturating_sub(now_ms).div_euclid(60_000)
    }

    pub fn renewal_advised(&self, now_ms: i64) -> bool {
        self.remaining_minutes(now_ms) < RENEWAL_THRESHOLD_MINUTES
    }

    /// Usable for upstream calls: present, unexpired and not up for renewal.
    pub fn is_valid(&self, now_ms: i64) -> bool {
        !self.value.is_empty() && self.remaining_minutes(now_ms) > 0 && !self.renewal_advised(now_ms)
    }
}

impl From<AuthTokenRecord> for Token {
    fn from(record: AuthTokenRecord) -> Self {
        Self {
            id: Some(record.id),
            value: record.token,
            issued_at_ms: record.obtained_at,
            ttl_secs: record.expires_in,
        }
    }
}

/// First three and last two characters, for logs.
pub fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 5 {
        return String::from("***");
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head} ... {tail}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Loading,
    Validating,
    Valid,
    Renewing,
    Error,
}

/// What one periodic check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalCheck {
    /// The token had enough lifetime left; nothing was sent upstream.
    Skipped,
    Renewed,
    Failed,
}

pub struct CredentialManager {
    api: ApiId,
    adapter: Arc<dyn ProtocolAdapter>,
    http_client: Arc<dyn HttpClient>,
    store: Arc<dyn HubStore>,
    clock: Arc<dyn Clock>,
    token: RwLock<Option<Token>>,
    state: watch::Sender<CredentialState>,
    last_error: Mutex<Option<ApiHubError>>,
    renewal: tokio::sync::Mutex<()>,
}

impl CredentialManager {
    pub fn new(
        adapter: Arc<dyn ProtocolAdapter>,
        http_client: Arc<dyn HttpClient>,
        store: Arc<dyn HubStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(CredentialState::Loading);
        Arc::new(Self {
            api: adapter.api(),
            adapter,
            http_client,
            store,
            clock,
            token: RwLock::new(None),
            state,
            last_error: Mutex::new(None),
            renewal: tokio::sync::Mutex::new(()),
        })
    }

    pub fn api(&self) -> ApiId {
        self.api
    }

    /// Load the newest stored token and renew it upstream if it cannot be
    /// used as is. A manager already holding a valid token keeps it.
    pub async fn initialize(&self) -> Result<(), ApiHubError> {
        let _guard = self.renewal.lock().await;
        if self
            .current_token()
            .is_some_and(|token| token.is_valid(self.clock.now_ms()))
        {
            return Ok(());
        }

        self.set_state(CredentialState::Loading);

        let record = match self.store.latest_auth_token(self.api).await {
            Ok(record) => record,
            Err(error) => {
                let error = ApiHubError::persistence(
                    DataStructure::Json,
                    format!("unable to load {} token: {error}", self.api),
                );
                return Err(self.fail(error));
            }
        };

        self.set_state(CredentialState::Validating);
        let now_ms = self.clock.now_ms();

        if let Some(record) = record {
            let token = Token::from(record);
            tracing::info!(
                api = %self.api,
                token = mask(&token.value).as_str(),
                "token retrieved from store"
            );

            if token.is_valid(now_ms) {
                tracing::info!(
                    api = %self.api,
                    minutes_remaining = token.remaining_minutes(now_ms),
                    "token validated"
                );
                self.replace_token(token);
                self.set_state(CredentialState::Valid);
                return Ok(());
            }

            tracing::info!(api = %self.api, "token invalid or (nearly) expired, renewing");
            self.replace_token(token);
        }

        self.renew_locked().await
    }

    /// One periodic check: renew when advised, otherwise only log.
    pub async fn tick(&self) -> RenewalCheck {
        if !self.should_renew() {
            tracing::info!(
                api = %self.api,
                minutes_remaining = self.minutes_to_expiry(),
                "token verifies okay"
            );
            return RenewalCheck::Skipped;
        }

        tracing::info!(api = %self.api, "token about to expire or expired, renewing");
        match self.renew_when(Self::should_renew).await {
            Ok(true) => RenewalCheck::Renewed,
            Ok(false) => RenewalCheck::Skipped,
            Err(_) => RenewalCheck::Failed,
        }
    }

    /// Fetch a new token upstream, persist it and make it current, whatever
    /// the held token looks like.
    pub async fn renew(&self) -> Result<(), ApiHubError> {
        let _guard = self.renewal.lock().await;
        self.renew_locked().await
    }

    /// Renew only if `due` still holds once the renewal lock is taken; a
    /// concurrent renewal may already have replaced the token.
    async fn renew_when(&self, due: fn(&Self) -> bool) -> Result<bool, ApiHubError> {
        let _guard = self.renewal.lock().await;
        if !due(self) {
            tracing::debug!(api = %self.api, "token already renewed by a concurrent check");
            return Ok(false);
        }
        self.renew_locked().await.map(|()| true)
    }

    /// Caller holds the renewal lock.
    async fn renew_locked(&self) -> Result<(), ApiHubError> {
        self.set_state(CredentialState::Renewing);

        let token = match self.fetch_token().await {
            Ok(token) => token,
            Err(error) => return Err(self.fail(error)),
        };

        let id = match self
            .store
            .insert_auth_token(self.api, &token.value, token.ttl_secs, token.issued_at_ms)
            .await
        {
            Ok(id) => id,
            Err(error) => {
                // The fresh token is still usable even though it was not persisted.
                self.replace_token(token);
                let error = ApiHubError::persistence(
                    DataStructure::Json,
                    format!("unable to persist {} token: {error}", self.api),
                );
                return Err(self.fail(error));
            }
        };

        tracing::info!(api = %self.api, id, token = mask(&token.value).as_str(), "token renewed");
        self.replace_token(Token {
            id: Some(id),
            ..token
        });
        self.set_state(CredentialState::Valid);
        Ok(())
    }

    async fn fetch_token(&self) -> Result<Token, ApiHubError> {
        let request = match self.adapter.token_request() {
            Some(request) => request?,
            None => {
                return Err(ApiHubError::generic(
                    DataStructure::Json,
                    format!("API {} does not issue tokens", self.api),
                ))
            }
        };

        let response = execute_with_deadline(self.http_client.as_ref(), request)
            .await
            .map_err(|error| ApiHubError::from_transport(DataStructure::Json, &error))?;
        let issued_at_ms = self.clock.now_ms();

        if !response.is_success() {
            return Err(ApiHubError::upstream_rejected(
                DataStructure::Json,
                response.status,
                &response.body,
            ));
        }

        let issued = self.adapter.parse_token(&response.body)?;
        Ok(Token {
            id: None,
            value: issued.token,
            issued_at_ms,
            ttl_secs: issued.ttl_secs,
        })
    }

    /// Spawn the periodic check. The first check runs one `period` from now.
    pub fn spawn_renewal_timer(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tracing::debug!(api = %manager.api, "periodic token check");
                manager.tick().await;
            }
        })
    }

    /// Current `Authorization` header value, if a token is held.
    pub fn authorization(&self) -> Option<String> {
        self.current_token()
            .filter(|token| !token.value.is_empty())
            .map(|token| self.adapter.authorization(&token.value))
    }

    /// Current authorization value. A manager that never loaded a token
    /// initializes first; an expired token is renewed first.
    pub async fn authorization_or_renew(&self) -> Result<String, ApiHubError> {
        match self.current_token() {
            None => self.initialize().await?,
            Some(_) if self.is_unusable() => {
                self.renew_when(Self::is_unusable).await?;
            }
            Some(_) => {}
        }

        self.authorization().ok_or_else(|| {
            ApiHubError::generic(
                DataStructure::Json,
                format!("no valid {} token available", self.api),
            )
        })
    }

    pub fn current_token(&self) -> Option<Token> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn minutes_to_expiry(&self) -> i64 {
        self.current_token()
            .map_or(0, |token| token.remaining_minutes(self.clock.now_ms()))
    }

    /// No token, an empty one or one past its expiry.
    fn is_unusable(&self) -> bool {
        self.current_token().map_or(true, |token| {
            token.value.is_empty() || token.remaining_minutes(self.clock.now_ms()) <= 0
        })
    }

    pub fn should_renew(&self) -> bool {
        self.current_token()
            .map_or(true, |token| token.value.is_empty() || token.renewal_advised(self.clock.now_ms()))
    }

    pub fn state(&self) -> CredentialState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CredentialState> {
        self.state.subscribe()
    }

    /// The failure behind the most recent transition to
    /// [`CredentialState::Error`].
    pub fn last_error(&self) -> Option<ApiHubError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_token(&self, token: Token) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn set_state(&self, state: CredentialState) {
        self.state.send_replace(state);
    }

    fn fail(&self, error: ApiHubError) -> ApiHubError {
        tracing::warn!(api = %self.api, %error, "credential manager error");
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
        self.set_state(CredentialState::Error);
        error
    }
}

/// Credential managers registered by API.
#[derive(Clone, Default)]
pub struct Credentials {
    managers: BTreeMap<ApiId, Arc<CredentialManager>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, manager: Arc<CredentialManager>) -> Self {
        self.managers.insert(manager.api(), manager);
        self
    }

    pub fn get(&self, api: ApiId) -> Option<Arc<CredentialManager>> {
        self.managers.get(&api).cloned()
    }

    pub fn managers(&self) -> impl Iterator<Item = &Arc<CredentialManager>> {
        self.managers.values()
    }

    /// Initialize every manager. Failures are logged and left for the
    /// periodic check; they never abort start-up.
    pub async fn initialize_all(&self) {
        for manager in self.managers.values() {
            if let Err(error) = manager.initialize().await {
                tracing::warn!(api = %manager.api(), %error, "credential initialization failed");
            }
        }
    }

    /// Start the periodic check of every manager.
    pub fn spawn_renewal_timers(&self, period: Duration) -> RenewalTimers {
        RenewalTimers {
            handles: self
                .managers
                .values()
                .map(|manager| manager.spawn_renewal_timer(period))
                .collect(),
        }
    }
}

/// Running renewal timers; stopped when dropped.
#[derive(Debug, Default)]
pub struct RenewalTimers {
    handles: Vec<JoinHandle<()>>,
}

impl Drop for RenewalTimers {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE_MS: i64 = 60_000;

    fn token(issued_at_ms: i64, ttl_secs: i64) -> Token {
        Token {
            id: Some(1),
            value: String::from("abcdefghij"),
            issued_at_ms,
            ttl_secs,
        }
    }

    #[test]
    fn remaining_minutes_round_down() {
        let token = token(1_000_000, 86_400);
        let now = 1_000_000 + 60 * MINUTE_MS + 30_000;
        assert_eq!(token.remaining_minutes(now), 24 * 60 - 61);
    }

    #[test]
    fn renewal_threshold_is_seventy_six_minutes() {
        let issued = 10 * MINUTE_MS;
        let token = token(issued, 100 * 60);

        assert!(!token.renewal_advised(issued + 24 * MINUTE_MS));
        assert_eq!(token.remaining_minutes(issued + 24 * MINUTE_MS), 76);
        assert!(token.renewal_advised(issued + 24 * MINUTE_MS + 1));
    }

    #[test]
    fn unknown_lifetime_counts_as_expired() {
        assert_eq!(token(5, 0).remaining_minutes(5), 0);
        assert_eq!(token(0, 86_400).remaining_minutes(5), 0);
        assert!(!token(0, 86_400).is_valid(5));
    }

    #[test]
    fn oversized_lifetime_saturates_instead_of_overflowing() {
        let token = token(1_000_000, i64::MAX);

        assert!(token.remaining_minutes(1_000_000) > 0);
        assert!(!token.renewal_advised(1_000_000));
        assert!(token.is_valid(1_000_000 + 365 * 24 * 60 * MINUTE_MS));
    }

    #[test]
    fn negative_lifetime_counts_as_expired() {
        let token = token(1_000_000, -60);

        assert!(token.remaining_minutes(1_000_000) < 0);
        assert!(token.renewal_advised(1_000_000));
        assert!(!token.is_valid(1_000_000));
        assert!(!Token { ttl_secs: i64::MIN, ..token }.is_valid(i64::MAX));
    }

    #[test]
    fn masking_keeps_only_edges() {
        assert_eq!(mask("abcdefghij"), "abc ... ij");
        assert_eq!(mask("abc"), "***");
        assert!(!format!("{:?}", token(1, 1)).contains("abcdefghij"));
    }
}
