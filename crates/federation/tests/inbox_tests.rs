//! Inbox endpoint tests driving the router directly.

#![allow(clippy::unwrap_used)]

mod support;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use support::{ALICE, CAROL, Harness, local_id, signed_request};
use tower::ServiceExt;
use vernissage_federation::{InboxState, SignedRequest, inbox_router};

fn router(harness: &Harness, require_signatures: bool) -> Router {
    inbox_router(
        InboxState::new(harness.verifier.clone(), harness.dispatcher.clone())
            .with_require_signatures(require_signatures),
    )
}

fn follow_body(actor: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": "https://remote.example/activities/follow/1",
        "type": "Follow",
        "actor": actor,
        "object": local_id("bob"),
    }))
    .unwrap()
}

fn http_request(signed: SignedRequest) -> Request<Body> {
    let mut builder = Request::builder().method(signed.method).uri(signed.path);
    for (name, value) in &signed.headers {
        builder = builder.header(name, value);
    }
    builder
        .header("content-type", "application/activity+json")
        .body(Body::from(signed.body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_signed_follow_is_accepted_and_applied() {
    let harness = Harness::new().with_remote(&[ALICE]).await;
    harness.local_actor("bob", false).await;
    let body = follow_body(json!(ALICE));

    let response = router(&harness, true)
        .oneshot(http_request(signed_request(ALICE, "/inbox", &body, Utc::now())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(harness.store.edges().await.len(), 1);
}

#[tokio::test]
async fn test_actor_inbox_verifies_its_own_path() {
    let harness = Harness::new().with_remote(&[ALICE]).await;
    harness.local_actor("bob", false).await;
    let body = follow_body(json!(ALICE));

    let response = router(&harness, true)
        .oneshot(http_request(signed_request(
            ALICE,
            "/actors/bob/inbox",
            &body,
            Utc::now(),
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(harness.store.edges().await.len(), 1);
}

#[tokio::test]
async fn test_unparseable_payload_is_dropped() {
    let harness = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/inbox")
        .body(Body::from("{\"not\": \"an activity\""))
        .unwrap();

    let response = router(&harness, true).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(harness.fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_forged_signature_is_unauthorized() {
    let harness = Harness::new().with_remote(&[ALICE]).await;
    harness.local_actor("bob", false).await;
    let body = follow_body(json!(ALICE));
    let mut signed = signed_request(ALICE, "/inbox", &body, Utc::now());
    // Signed for another inbox, replayed here.
    signed.path = "/actors/bob/inbox".to_string();

    let response = router(&harness, true)
        .oneshot(http_request(signed))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "signatureIsNotValid");
    assert!(harness.store.edges().await.is_empty());
}

#[tokio::test]
async fn test_stale_request_is_rejected_without_side_effects() {
    let harness = Harness::new().with_remote(&[ALICE]).await;
    harness.local_actor("bob", false).await;
    let body = follow_body(json!(ALICE));
    let signed = signed_request(ALICE, "/inbox", &body, Utc::now() - Duration::hours(2));

    let response = router(&harness, true)
        .oneshot(http_request(signed))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "badTimeWindow");
    assert_eq!(harness.fetcher.fetch_count(), 0);
    assert!(harness.store.actor(ALICE).await.is_none());
    assert!(harness.store.edges().await.is_empty());
}

#[tokio::test]
async fn test_multiple_actors_are_refused() {
    let harness = Harness::new().with_remote(&[ALICE, CAROL]).await;
    harness.local_actor("bob", false).await;
    let body = follow_body(json!([ALICE, CAROL]));

    let response = router(&harness, true)
        .oneshot(http_request(signed_request(ALICE, "/inbox", &body, Utc::now())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["code"],
        "singleActorIsSupportedInSigning"
    );
    assert!(harness.store.edges().await.is_empty());
}

#[tokio::test]
async fn test_unsigned_request_is_processed_when_signatures_are_optional() {
    let harness = Harness::new().with_remote(&[ALICE]).await;
    harness.local_actor("bob", false).await;
    let request = Request::builder()
        .method("POST")
        .uri("/inbox")
        .body(Body::from(follow_body(json!(ALICE))))
        .unwrap();

    let response = router(&harness, false).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(harness.store.edges().await.len(), 1);
}

#[tokio::test]
async fn test_storage_failure_asks_for_redelivery() {
    let harness = Harness::new().with_remote(&[ALICE]).await;
    let bob = harness.local_actor("bob", false).await;
    harness.store.fail_timeline_inserts(&bob.id).await;
    let body = serde_json::to_vec(&json!({
        "id": "https://remote.example/activities/create/1",
        "type": "Create",
        "actor": ALICE,
        "object": {
            "id": "https://remote.example/notes/1",
            "type": "Note",
            "attributedTo": ALICE,
            "to": [local_id("bob")],
            "tag": [{ "type": "Mention", "href": local_id("bob") }],
            "content": "<p>hello</p>",
        },
    }))
    .unwrap();

    let response = router(&harness, true)
        .oneshot(http_request(signed_request(ALICE, "/inbox", &body, Utc::now())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "storageError");
    assert!(
        harness
            .store
            .content("https://remote.example/notes/1")
            .await
            .is_some()
    );
}
