//! Behavior-driven tests for Direct+ identity resolution
//!
//! These tests verify the two-phase search record: parameters persisted
//! alongside the match call, results attached afterwards, and the chosen DUNS
//! recorded on request.

mod support;

use apihub_core::{ErrorKind, HttpResponse, StoreOperation};
use serde_json::json;

use support::{hub, ScriptedHttpClient, DPL_TOKEN, START_MS};

const CANDIDATES: &str = r#"{"candidatesMatchedQuantity":1,"matchCandidates":[{"organization":{"duns":"804735132"}}]}"#;

fn direct_plus_match() -> ScriptedHttpClient {
    ScriptedHttpClient::new()
        .respond("/v2/token", HttpResponse::ok(DPL_TOKEN))
        .respond("/v1/match/cleanseMatch", HttpResponse::ok(CANDIDATES))
}

#[tokio::test]
async fn when_search_succeeds_system_returns_candidates_with_record_id_and_status() {
    // Given: Direct+ returns one match candidate
    let fixture = hub(direct_plus_match());
    let params = json!({"name": "Gorman Manufacturing", "countryISOAlpha2Code": "US"});

    // When: An identity resolution search is run
    let response = fixture
        .hub
        .resolve_identity(params.clone())
        .await
        .expect("candidates");
    fixture.hub.settle().await;

    // Then: The upstream JSON is returned with the record id and upstream status
    assert_eq!(response.body, CANDIDATES);
    assert_eq!(response.content_type, "application/json");
    assert_eq!(response.upstream_status, Some(200));
    let id = response.idr_id.expect("record id");

    // And: The match call carried the search criteria and the bearer token
    let search = fixture
        .http
        .requests()
        .into_iter()
        .find(|request| request.url.contains("cleanseMatch"))
        .expect("match call");
    assert!(search.url.contains("name=Gorman%20Manufacturing"));
    assert!(search.url.contains("countryISOAlpha2Code=US"));
    assert_eq!(search.header("authorization"), Some("Bearer dpl-token-0001"));

    // And: The record holds the parameters and, afterwards, the results
    let row = fixture.store.idr_row(id).await.expect("stored record");
    assert_eq!(row.params, params);
    assert_eq!(row.params_at_ms, START_MS);
    assert_eq!(row.results.as_deref(), Some(CANDIDATES));
    assert_eq!(row.http_status, Some(200));
    assert_eq!(row.duns, None);
}

#[tokio::test]
async fn when_search_parameters_are_not_an_object_system_rejects_before_any_io() {
    // Given: A hub with an idle store and upstream
    let fixture = hub(direct_plus_match());

    // When: The search criteria are a JSON array
    let error = fixture
        .hub
        .resolve_identity(json!(["Gorman Manufacturing"]))
        .await
        .expect_err("invalid parameters");

    // Then: The caller gets a 400 and nothing was touched
    assert_eq!(error.kind(), ErrorKind::InvalidParameters);
    assert_eq!(error.http_status(), 400);
    assert_eq!(error.ws_path(), Some("/api/idr"));
    assert_eq!(fixture.store.total_calls(), 0);
    assert!(fixture.http.requests().is_empty());
}

#[tokio::test]
async fn when_parameters_cannot_be_persisted_system_fails_the_search() {
    // Given: A store that rejects new search records
    let fixture = hub(direct_plus_match());
    fixture.store.fail(StoreOperation::InsertIdrParams);

    // When: A search is run
    let error = fixture
        .hub
        .resolve_identity(json!({"name": "Gorman Manufacturing"}))
        .await
        .expect_err("persistence failure");

    // Then: Both halves had to succeed, so the search fails with a persistence error
    assert_eq!(error.kind(), ErrorKind::Persistence);
    assert_eq!(error.http_status(), 500);
    assert_eq!(fixture.store.calls(StoreOperation::UpdateIdrResults), 0);
}

#[tokio::test]
async fn when_match_call_is_rejected_system_reports_upstream_status() {
    // Given: Direct+ rejects the search criteria
    let http = ScriptedHttpClient::new()
        .respond("/v2/token", HttpResponse::ok(DPL_TOKEN))
        .respond(
            "/v1/match/cleanseMatch",
            HttpResponse::new(400, r#"{"error":{"errorCode":"20502","errorMessage":"Invalid country"}}"#),
        );
    let fixture = hub(http);

    // When: A search is run
    let error = fixture
        .hub
        .resolve_identity(json!({"name": "Gorman Manufacturing", "countryISOAlpha2Code": "XX"}))
        .await
        .expect_err("rejected search");
    fixture.hub.settle().await;

    // Then: The upstream status and body reach the caller, no results are attached
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(error.http_status(), 400);
    assert_eq!(fixture.store.calls(StoreOperation::InsertIdrParams), 1);
    assert_eq!(fixture.store.calls(StoreOperation::UpdateIdrResults), 0);
}

#[tokio::test]
async fn when_results_cannot_be_attached_system_still_delivers_candidates() {
    // Given: A store that rejects result updates
    let fixture = hub(direct_plus_match());
    fixture.store.fail(StoreOperation::UpdateIdrResults);
    let mut errors = fixture.hub.background_errors();

    // When: A search is run
    let response = fixture
        .hub
        .resolve_identity(json!({"name": "Gorman Manufacturing"}))
        .await
        .expect("candidates");
    fixture.hub.settle().await;

    // Then: The caller got the candidates and the failure was published
    assert_eq!(response.body, CANDIDATES);
    let published = errors.try_recv().expect("published failure");
    assert_eq!(published.kind(), ErrorKind::Persistence);
}

// =============================================================================
// Identity Resolution: Chosen DUNS
// =============================================================================

#[tokio::test]
async fn when_chosen_duns_is_recorded_system_updates_exactly_one_record() {
    // Given: A completed search
    let fixture = hub(direct_plus_match());
    let response = fixture
        .hub
        .resolve_identity(json!({"name": "Gorman Manufacturing"}))
        .await
        .expect("candidates");
    fixture.hub.settle().await;
    let id = response.idr_id.expect("record id");

    // When: The caller records the DUNS it picked
    let updated = fixture
        .hub
        .update_identity_record(id, "80-473-5132")
        .await
        .expect("updated");

    // Then: One row changed and the normalized DUNS is stored
    let body: serde_json::Value = serde_json::from_str(&updated.body).expect("json body");
    assert_eq!(body["rowCount"], 1);
    let row = fixture.store.idr_row(id).await.expect("stored record");
    assert_eq!(row.duns.as_deref(), Some("804735132"));
}

#[tokio::test]
async fn when_record_does_not_exist_system_reports_not_found() {
    // Given: A hub without any search records
    let fixture = hub(direct_plus_match());

    // When: A DUNS is recorded for an unknown id
    let error = fixture
        .hub
        .update_identity_record(4711, "804735132")
        .await
        .expect_err("unknown record");

    // Then: The caller gets a JSON 404 naming the path
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(error.http_status(), 404);
    assert_eq!(error.ws_path(), Some("/api/idr/4711"));
    assert!(error.render().contains("\"err_num\": 3"));
}
