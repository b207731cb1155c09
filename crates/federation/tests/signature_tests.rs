//! HTTP signature verification, signing and actor resolution tests.

#![allow(clippy::unwrap_used)]

mod support;

use axum::http::HeaderValue;
use chrono::{Duration, Utc};
use serde_json::json;
use support::{
    ALICE, CAROL, Harness, activity, header, local_id, person, resign_over, signed_request,
};
use vernissage_federation::{
    ActivityDelivery, SignatureVerificationError, SignatureVerifier, VerifierSettings,
    signature::format_http_date,
    store::{ActorResolver, ActorStore, RemoteProfile},
};

fn follow_from(actor: serde_json::Value) -> serde_json::Value {
    json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": "https://remote.example/activities/follow/1",
        "type": "Follow",
        "actor": actor,
        "object": local_id("bob"),
    })
}

mod verification {
    use super::*;

    #[tokio::test]
    async fn test_valid_signature_resolves_actor() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let body = serde_json::to_vec(&follow_from(json!(ALICE))).unwrap();
        let request = signed_request(ALICE, "/inbox", &body, Utc::now());

        let verified = harness
            .verifier
            .verify(&request, &activity(&follow_from(json!(ALICE))))
            .await
            .unwrap();

        assert_eq!(verified.actor.activity_pub_id, ALICE);
        assert_eq!(verified.key_id.as_deref(), Some("https://remote.example/users/alice#main-key"));
        assert!(harness.store.actor(ALICE).await.is_some());
    }

    #[tokio::test]
    async fn test_inlined_actor_object_is_accepted() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!({ "id": ALICE, "type": "Person" }));
        let body = serde_json::to_vec(&payload).unwrap();
        let request = signed_request(ALICE, "/actors/bob/inbox", &body, Utc::now());

        let verified = harness.verifier.verify(&request, &activity(&payload)).await.unwrap();
        assert_eq!(verified.actor.activity_pub_id, ALICE);
    }

    #[tokio::test]
    async fn test_multiple_actors_are_refused_first() {
        let harness = Harness::new().with_remote(&[ALICE, CAROL]).await;
        let payload = follow_from(json!([ALICE, CAROL]));
        let mut request = signed_request(ALICE, "/inbox", b"{}", Utc::now());
        request.headers.remove("signature");

        let result = harness.verifier.verify(&request, &activity(&payload)).await;

        assert!(matches!(
            result,
            Err(SignatureVerificationError::SingleActorIsSupportedInSigning)
        ));
        assert_eq!(harness.fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_signature_header() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let mut request = signed_request(ALICE, "/inbox", &body, Utc::now());
        request.headers.remove("signature");

        let result = harness.verifier.verify(&request, &activity(&payload)).await;
        assert!(matches!(result, Err(SignatureVerificationError::MissingSignatureHeader)));
    }

    #[tokio::test]
    async fn test_missing_headers_list() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let mut request = signed_request(ALICE, "/inbox", b"{}", Utc::now());
        request.headers.insert(
            "signature",
            HeaderValue::from_static(r#"keyId="https://remote.example/users/alice#main-key",signature="AAAA""#),
        );

        let result = harness.verifier.verify(&request, &activity(&payload)).await;
        assert!(matches!(result, Err(SignatureVerificationError::MissingSignedHeadersList)));
    }

    #[tokio::test]
    async fn test_missing_signed_header_is_named() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let mut request = signed_request(ALICE, "/inbox", b"{}", Utc::now());
        request.headers.insert(
            "signature",
            HeaderValue::from_static(
                r#"keyId="https://remote.example/users/alice#main-key",headers="(request-target) host date x-custom",signature="AAAA""#,
            ),
        );

        let result = harness.verifier.verify(&request, &activity(&payload)).await;
        match result {
            Err(SignatureVerificationError::MissingSignedHeader(name)) => {
                assert_eq!(name, "x-custom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_signature_parameter() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let mut request = signed_request(ALICE, "/inbox", b"{}", Utc::now());
        request.headers.insert(
            "signature",
            HeaderValue::from_static(
                r#"keyId="https://remote.example/users/alice#main-key",headers="(request-target) host date""#,
            ),
        );

        let result = harness.verifier.verify(&request, &activity(&payload)).await;
        assert!(matches!(result, Err(SignatureVerificationError::MissingSignatureInHeader)));
    }

    #[tokio::test]
    async fn test_stale_date_is_refused_without_fetching() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let request = signed_request(ALICE, "/inbox", &body, Utc::now() - Duration::minutes(10));

        let result = harness.verifier.verify(&request, &activity(&payload)).await;

        assert!(matches!(result, Err(SignatureVerificationError::BadTimeWindow)));
        assert_eq!(harness.fetcher.fetch_count(), 0);
        assert!(harness.store.actor(ALICE).await.is_none());
    }

    #[tokio::test]
    async fn test_future_date_beyond_skew_is_refused() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let now = Utc::now();
        let request = signed_request(ALICE, "/inbox", &body, now + Duration::minutes(6));

        let result = harness.verifier.verify_at(&request, &activity(&payload), now).await;
        assert!(matches!(result, Err(SignatureVerificationError::BadTimeWindow)));
    }

    #[tokio::test]
    async fn test_configured_skew_is_honoured() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let verifier = SignatureVerifier::new(
            harness.resolver.clone(),
            VerifierSettings {
                max_clock_skew: Duration::minutes(15),
            },
        );
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let request = signed_request(ALICE, "/inbox", &body, Utc::now() - Duration::minutes(10));

        assert!(verifier.verify(&request, &activity(&payload)).await.is_ok());
    }

    #[tokio::test]
    async fn test_replay_with_unsigned_date_is_refused() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let mut request = signed_request(ALICE, "/inbox", &body, Utc::now() - Duration::hours(6));
        resign_over(ALICE, &mut request, &["(request-target)", "host", "digest"]);
        request.headers.insert(
            "date",
            HeaderValue::from_str(&format_http_date(Utc::now())).unwrap(),
        );

        let result = harness.verifier.verify(&request, &activity(&payload)).await;

        match result {
            Err(SignatureVerificationError::MissingSignedHeader(name)) => assert_eq!(name, "date"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(harness.fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_body_without_signed_digest_is_refused() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let mut request = signed_request(ALICE, "/inbox", &body, Utc::now());
        resign_over(ALICE, &mut request, &["(request-target)", "host", "date"]);

        let result = harness.verifier.verify(&request, &activity(&payload)).await;

        match result {
            Err(SignatureVerificationError::MissingSignedHeader(name)) => assert_eq!(name, "digest"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(harness.fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_body_needs_no_signed_digest() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let mut request = signed_request(ALICE, "/inbox", b"", Utc::now());
        resign_over(ALICE, &mut request, &["(request-target)", "host", "date"]);

        let verified = harness.verifier.verify(&request, &activity(&payload)).await.unwrap();
        assert_eq!(verified.actor.activity_pub_id, ALICE);
    }

    #[tokio::test]
    async fn test_tampered_body_fails_digest() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let mut request = signed_request(ALICE, "/inbox", &body, Utc::now());
        request.body = bytes::Bytes::from_static(b"{\"tampered\":true}");

        let result = harness.verifier.verify(&request, &activity(&payload)).await;
        assert!(matches!(result, Err(SignatureVerificationError::DigestMismatch)));
    }

    #[tokio::test]
    async fn test_signature_for_other_path_is_invalid() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let mut request = signed_request(ALICE, "/inbox", &body, Utc::now());
        request.path = "/actors/bob/inbox".to_string();

        let result = harness.verifier.verify(&request, &activity(&payload)).await;
        assert!(matches!(result, Err(SignatureVerificationError::SignatureIsNotValid)));
    }

    #[tokio::test]
    async fn test_garbage_signature_is_invalid() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let mut request = signed_request(ALICE, "/inbox", &body, Utc::now());
        let header = header(&request.headers, "signature");
        let start = header.find("signature=\"").unwrap();
        let forged = format!("{}signature=\"not base64!\"", &header[..start]);
        request
            .headers
            .insert("signature", HeaderValue::from_str(&forged).unwrap());

        let result = harness.verifier.verify(&request, &activity(&payload)).await;
        assert!(matches!(result, Err(SignatureVerificationError::SignatureIsNotValid)));
    }

    #[tokio::test]
    async fn test_unknown_actor() {
        let harness = Harness::new();
        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let request = signed_request(ALICE, "/inbox", &body, Utc::now());

        let result = harness.verifier.verify(&request, &activity(&payload)).await;
        assert!(matches!(
            result,
            Err(SignatureVerificationError::UserNotExistsInDatabase(id)) if id == ALICE
        ));
    }

    #[tokio::test]
    async fn test_actor_without_key() {
        let harness = Harness::new();
        let mut alice = person(ALICE);
        alice.public_key = None;
        harness.fetcher.insert_actor(alice).await;

        let payload = follow_from(json!(ALICE));
        let body = serde_json::to_vec(&payload).unwrap();
        let request = signed_request(ALICE, "/inbox", &body, Utc::now());

        let result = harness.verifier.verify(&request, &activity(&payload)).await;
        assert!(matches!(result, Err(SignatureVerificationError::PublicKeyNotExists(_))));
    }
}

mod resolution {
    use super::*;

    #[tokio::test]
    async fn test_fresh_actor_is_not_refetched() {
        let harness = Harness::new().with_remote(&[ALICE]).await;

        harness.resolver.resolve(ALICE).await.unwrap().unwrap();
        harness.resolver.resolve(ALICE).await.unwrap().unwrap();

        assert_eq!(harness.fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_actor_is_refreshed() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let stored = harness
            .store
            .upsert_remote(RemoteProfile::from(&person(ALICE)))
            .await
            .unwrap();
        let mut stale = stored.clone();
        stale.updated_at = Utc::now() - Duration::days(3);
        stale.username = "old-name".to_string();
        harness.store.insert_actor(stale).await;

        let refreshed = harness.resolver.resolve(ALICE).await.unwrap().unwrap();

        assert_eq!(refreshed.id, stored.id);
        assert_eq!(refreshed.username, "alice");
        assert_eq!(harness.fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_stored() {
        let harness = Harness::new();
        let stored = harness
            .store
            .upsert_remote(RemoteProfile::from(&person(ALICE)))
            .await
            .unwrap();
        let mut stale = stored.clone();
        stale.updated_at = Utc::now() - Duration::days(3);
        harness.store.insert_actor(stale).await;

        let resolved = harness.resolver.resolve(ALICE).await.unwrap().unwrap();

        assert_eq!(resolved.id, stored.id);
        assert_eq!(harness.fetcher.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_document_is_not_stored() {
        let harness = Harness::new();
        harness.fetcher.insert_actor_at(ALICE, person(CAROL)).await;

        assert!(harness.resolver.resolve(ALICE).await.unwrap().is_none());
        assert!(harness.store.actor(CAROL).await.is_none());
    }

    #[tokio::test]
    async fn test_find_never_fetches() {
        let harness = Harness::new().with_remote(&[ALICE]).await;

        assert!(harness.resolver.find(ALICE).await.unwrap().is_none());
        assert_eq!(harness.fetcher.fetch_count(), 0);
    }
}

mod delivery {
    use super::*;

    #[tokio::test]
    async fn test_signed_delivery_verifies_at_the_receiver() {
        let harness = Harness::new().with_remote(&[ALICE]).await;
        let bob = harness.local_actor("bob", false).await;
        let alice = harness.resolver.resolve(ALICE).await.unwrap().unwrap();

        ActivityDelivery::new(harness.queue.clone())
            .accept_follow(&bob, &alice, "https://remote.example/activities/follow/1")
            .await
            .unwrap();

        let deliveries = harness.queue.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        let delivery = &deliveries[0];
        assert_eq!(delivery.inbox, "https://remote.example/users/alice/inbox");
        assert_eq!(header(&delivery.headers, "host"), "remote.example");
        let key_id = format!("keyId=\"{}#main-key\"", bob.activity_pub_id);
        assert!(header(&delivery.headers, "signature").contains(&key_id));

        // On the receiving instance bob is a remote actor.
        let receiver = Harness::new().with_remote(&[bob.activity_pub_id.as_str()]).await;

        let accept = vernissage_activitypub::ActivityDto::parse(&delivery.body).unwrap();
        let request = vernissage_federation::SignedRequest {
            method: axum::http::Method::POST,
            path: "/users/alice/inbox".to_string(),
            headers: delivery.headers.clone(),
            body: delivery.body.clone(),
        };

        let verified = receiver.verifier.verify(&request, &accept).await.unwrap();
        assert_eq!(verified.actor.activity_pub_id, bob.activity_pub_id);
    }

    #[tokio::test]
    async fn test_deliver_deduplicates_inboxes() {
        let harness = Harness::new();
        let bob = harness.local_actor("bob", false).await;
        let like = vernissage_activitypub::ActivityDto::like(
            "https://vernissage.example/actors/bob#like/1",
            &bob.activity_pub_id,
            "https://remote.example/notes/1",
        );
        let shared = "https://remote.example/inbox".to_string();

        ActivityDelivery::new(harness.queue.clone())
            .deliver(&like, &bob, &[shared.clone(), shared])
            .await
            .unwrap();

        assert_eq!(harness.queue.deliveries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_actor_without_private_key_cannot_sign() {
        let harness = Harness::new();
        let bob = harness
            .store
            .insert_local_actor("bob", &local_id("bob"), false)
            .await;
        let like = vernissage_activitypub::ActivityDto::like(
            "https://vernissage.example/actors/bob#like/1",
            &bob.activity_pub_id,
            "https://remote.example/notes/1",
        );

        let result = ActivityDelivery::new(harness.queue.clone())
            .sign(&like, &bob, "https://remote.example/inbox");
        assert!(result.is_err());
    }
}
