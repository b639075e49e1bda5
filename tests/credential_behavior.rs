//! Behavior-driven tests for API credential life cycles
//!
//! These tests verify when tokens are reused, renewed and persisted, and what
//! callers see while a renewal fails.

mod support;

use std::time::Duration;

use apihub_core::{
    ApiId, CredentialState, ErrorKind, HttpResponse, RenewalCheck, StoreOperation,
    RENEWAL_THRESHOLD_MINUTES,
};

use support::{hub, ScriptedHttpClient, D2O_TOKEN, DPL_TOKEN, START_MS};

const MAX_LIFETIME_TOKEN: &str = r#"{"access_token":"dpl-token-max","expiresIn":9223372036854775807}"#;

const MINUTE_MS: i64 = 60_000;
const DAY_SECS: i64 = 86_400;

fn direct_plus_tokens() -> ScriptedHttpClient {
    ScriptedHttpClient::new().respond("/v2/token", HttpResponse::ok(DPL_TOKEN))
}

// =============================================================================
// Credentials: Start-up
// =============================================================================

#[tokio::test]
async fn when_stored_token_has_ample_lifetime_system_reuses_it_without_upstream_call() {
    // Given: A Direct+ token stored an hour ago with a day of lifetime
    let fixture = hub(direct_plus_tokens());
    fixture
        .store
        .seed_token(ApiId::Dpl, "stored-token-42", DAY_SECS, START_MS - 60 * MINUTE_MS)
        .await;
    let manager = fixture.hub.credentials().get(ApiId::Dpl).expect("dpl manager");

    // When: The manager initializes
    manager.initialize().await.expect("initialized");

    // Then: The stored token is used as is
    assert_eq!(manager.state(), CredentialState::Valid);
    assert_eq!(manager.authorization().as_deref(), Some("Bearer stored-token-42"));
    assert_eq!(manager.minutes_to_expiry(), 23 * 60);
    assert!(fixture.http.requests().is_empty());
    assert_eq!(fixture.store.calls(StoreOperation::InsertAuthToken), 0);
}

#[tokio::test]
async fn when_stored_token_is_inside_renewal_window_system_renews_and_persists_on_start() {
    // Given: A stored token with 75 minutes left
    let fixture = hub(direct_plus_tokens());
    let issued = START_MS - (24 * 60 - 75) * MINUTE_MS;
    fixture
        .store
        .seed_token(ApiId::Dpl, "stale-token-01", DAY_SECS, issued)
        .await;
    let manager = fixture.hub.credentials().get(ApiId::Dpl).expect("dpl manager");

    // When: The manager initializes
    manager.initialize().await.expect("renewed");

    // Then: A new token was fetched with Basic credentials and stored as the newest row
    let requests = fixture.http.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://plus.dnb.com/v2/token");
    assert!(requests[0]
        .header("authorization")
        .is_some_and(|value| value.starts_with("Basic ")));

    let tokens = fixture.store.tokens(ApiId::Dpl).await;
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[1].token, "dpl-token-0001");
    assert_eq!(tokens[1].expires_in, DAY_SECS);
    assert_eq!(tokens[1].obtained_at, START_MS);

    assert_eq!(manager.authorization().as_deref(), Some("Bearer dpl-token-0001"));
    assert_eq!(manager.current_token().and_then(|token| token.id), Some(tokens[1].id));
}

#[tokio::test]
async fn when_d2o_session_is_issued_system_uses_raw_token_with_one_day_lifetime() {
    // Given: Direct 2.0 Onboard issues a session token and nothing is stored
    let http = ScriptedHttpClient::new().respond("/Authentication/V2.0/", HttpResponse::ok(D2O_TOKEN));
    let fixture = hub(http);
    let manager = fixture.hub.credentials().get(ApiId::D2o).expect("d2o manager");

    // When: The manager initializes
    manager.initialize().await.expect("session issued");

    // Then: Header credentials were sent and the token is used without a scheme prefix
    let requests = fixture.http.requests();
    assert_eq!(requests[0].header("x-dnb-user"), Some("d2o-user"));
    assert_eq!(requests[0].header("x-dnb-pwd"), Some("d2o-pass"));
    assert_eq!(manager.authorization().as_deref(), Some("d2o-session-0001"));
    assert_eq!(manager.current_token().map(|token| token.ttl_secs), Some(DAY_SECS));
}

#[tokio::test]
async fn when_only_token_issuing_apis_get_managers_system_registers_dpl_and_d2o() {
    // Given/When: A hub is wired with every adapter
    let fixture = hub(ScriptedHttpClient::new());

    // Then: Credential managers exist only for the token-issuing APIs
    let apis: Vec<ApiId> = fixture
        .hub
        .credentials()
        .managers()
        .map(|manager| manager.api())
        .collect();
    assert_eq!(apis, vec![ApiId::Dpl, ApiId::D2o]);
}

// =============================================================================
// Credentials: Periodic Checks
// =============================================================================

#[tokio::test]
async fn when_periodic_check_runs_system_renews_only_below_threshold_and_once_per_tick() {
    // Given: A freshly issued Direct+ token
    let fixture = hub(direct_plus_tokens());
    let manager = fixture.hub.credentials().get(ApiId::Dpl).expect("dpl manager");
    manager.initialize().await.expect("initialized");
    assert_eq!(fixture.http.count("/v2/token"), 1);

    // When: The clock reaches 77 and then exactly 76 minutes before expiry
    fixture.clock.advance_minutes(24 * 60 - 77);
    assert_eq!(manager.tick().await, RenewalCheck::Skipped);
    fixture.clock.advance_minutes(1);
    assert_eq!(manager.minutes_to_expiry(), RENEWAL_THRESHOLD_MINUTES);
    assert_eq!(manager.tick().await, RenewalCheck::Skipped);

    // Then: No renewal happened yet
    assert_eq!(fixture.http.count("/v2/token"), 1);

    // When: One more minute passes and the check runs twice
    fixture.clock.advance_minutes(1);
    assert_eq!(manager.tick().await, RenewalCheck::Renewed);
    assert_eq!(manager.tick().await, RenewalCheck::Skipped);

    // Then: Exactly one renewal attempt was made
    assert_eq!(fixture.http.count("/v2/token"), 2);
    assert_eq!(fixture.store.calls(StoreOperation::InsertAuthToken), 2);
    assert_eq!(manager.minutes_to_expiry(), 24 * 60);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn when_timer_and_request_both_see_an_expired_token_system_renews_once() {
    // Given: A manager holding a token that has since expired
    let fixture = hub(direct_plus_tokens());
    fixture
        .store
        .seed_token(ApiId::Dpl, "stored-token-42", DAY_SECS, START_MS - 60 * MINUTE_MS)
        .await;
    let manager = fixture.hub.credentials().get(ApiId::Dpl).expect("dpl manager");
    manager.initialize().await.expect("initialized");
    fixture.clock.advance_minutes(24 * 60);

    // When: The renewal timer and a caller needing a token run together
    let (check, authorization) = tokio::join!(manager.tick(), manager.authorization_or_renew());

    // Then: Exactly one token is fetched and both sides see it
    assert_ne!(check, RenewalCheck::Failed);
    assert_eq!(authorization.expect("authorization"), "Bearer dpl-token-0001");
    assert_eq!(fixture.http.count("/v2/token"), 1);
    assert_eq!(fixture.store.calls(StoreOperation::InsertAuthToken), 1);
    assert_eq!(manager.minutes_to_expiry(), 24 * 60);
}

#[tokio::test]
async fn when_upstream_claims_an_unbounded_lifetime_system_caps_it_and_keeps_serving() {
    // Given: A Direct+ token endpoint reporting the largest possible expiry
    let fixture = hub(
        ScriptedHttpClient::new()
            .respond("/v2/token", HttpResponse::ok(MAX_LIFETIME_TOKEN))
            .respond(
                "/v1/data/duns/000012345",
                HttpResponse::ok(r#"{"organization":{"duns":"000012345"}}"#),
            ),
    );

    // When: Products are requested a year apart
    fixture
        .hub
        .data_product("12345", "cmpelk", true, None)
        .await
        .expect("first product");
    fixture.clock.advance_minutes(365 * 24 * 60);
    fixture
        .hub
        .data_product("12345", "cmpelk", true, None)
        .await
        .expect("second product");

    // Then: The capped token stays in use without another fetch
    assert_eq!(fixture.http.count("/v2/token"), 1);
    let manager = fixture.hub.credentials().get(ApiId::Dpl).expect("dpl manager");
    assert_eq!(manager.minutes_to_expiry(), 24 * 60);
    assert_eq!(manager.state(), CredentialState::Valid);
}

#[tokio::test]
async fn when_renewal_timer_fires_system_renews_a_missing_token() {
    // Given: A manager that has not loaded any token
    let fixture = hub(direct_plus_tokens());
    let manager = fixture.hub.credentials().get(ApiId::Dpl).expect("dpl manager");
    let mut states = manager.subscribe();

    // When: The periodic check runs on a short period
    let timer = manager.spawn_renewal_timer(Duration::from_millis(20));
    tokio::time::timeout(Duration::from_secs(5), states.wait_for(|state| *state == CredentialState::Valid))
        .await
        .expect("renewed in time")
        .expect("state channel open");
    tokio::time::sleep(Duration::from_millis(60)).await;
    timer.abort();

    // Then: The token was fetched once; later checks found it valid
    assert_eq!(fixture.http.count("/v2/token"), 1);
    assert_eq!(manager.authorization().as_deref(), Some("Bearer dpl-token-0001"));
}

// =============================================================================
// Credentials: Failures
// =============================================================================

#[tokio::test]
async fn when_renewal_is_rejected_system_reports_error_state_and_keeps_current_token() {
    // Given: A token about to expire and an authentication endpoint that rejects renewals
    let http = ScriptedHttpClient::new().respond(
        "/v2/token",
        HttpResponse::new(401, r#"{"error":{"errorMessage":"Invalid credentials"}}"#),
    );
    let fixture = hub(http);
    fixture
        .store
        .seed_token(ApiId::Dpl, "old-token-0001", DAY_SECS, START_MS - (24 * 60 - 10) * MINUTE_MS)
        .await;
    let manager = fixture.hub.credentials().get(ApiId::Dpl).expect("dpl manager");

    // When: The manager initializes and a periodic check runs
    let error = manager.initialize().await.expect_err("renewal rejected");
    let check = manager.tick().await;

    // Then: Both attempts failed, the error carries the upstream status
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(error.http_status(), 401);
    assert_eq!(check, RenewalCheck::Failed);
    assert_eq!(manager.state(), CredentialState::Error);
    assert_eq!(manager.last_error().map(|error| error.http_status()), Some(401));

    // And: The old token is still handed out while it lasts
    assert_eq!(manager.authorization().as_deref(), Some("Bearer old-token-0001"));
    assert_eq!(fixture.http.count("/v2/token"), 2);
}

#[tokio::test]
async fn when_token_cannot_be_persisted_system_still_uses_the_new_token() {
    // Given: A store that rejects token inserts
    let fixture = hub(direct_plus_tokens());
    fixture.store.fail(StoreOperation::InsertAuthToken);
    let manager = fixture.hub.credentials().get(ApiId::Dpl).expect("dpl manager");

    // When: A renewal runs
    let error = manager.renew().await.expect_err("persistence failure");

    // Then: The failure is reported but the token is current
    assert_eq!(error.kind(), ErrorKind::Persistence);
    assert_eq!(manager.authorization().as_deref(), Some("Bearer dpl-token-0001"));
    assert!(manager.current_token().is_some_and(|token| token.id.is_none()));
}

#[tokio::test]
async fn when_token_debug_output_is_logged_system_masks_the_value() {
    // Given: A manager holding a token
    let fixture = hub(direct_plus_tokens());
    let manager = fixture.hub.credentials().get(ApiId::Dpl).expect("dpl manager");
    manager.renew().await.expect("renewed");

    // When: The token is formatted for diagnostics
    let rendered = format!("{:?}", manager.current_token().expect("token"));

    // Then: Only its edges are visible
    assert!(rendered.contains("dpl ... 01"));
    assert!(!rendered.contains("dpl-token-0001"));
}
