//! Shared fixtures for the federation integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{Arc, OnceLock};

use axum::http::{HeaderMap, HeaderValue, Method};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rsa::{
    RsaPrivateKey,
    pkcs1v15::{Signature, SigningKey},
    pkcs8::{EncodePrivateKey, LineEnding},
};
use serde_json::Value;
use sha2::Sha256;
use signature::{SignatureEncoding, hazmat::PrehashSigner};
use url::Url;
use vernissage_activitypub::{ActivityDto, ObjectType, PersonDto, PublicKeyDto};
use vernissage_common::crypto::{parse_private_key, public_key_pem_of};
use vernissage_federation::{
    ActivityDelivery, ActivityDispatcher, DispatcherDeps, HttpSigner, MemoryDeliveryQueue,
    MemoryFetcher, MemoryStore, RemoteActorResolver, SignatureVerifier, SignedRequest,
    VerifierSettings,
    signature::{SignatureHeader, canonical_string, signing_digest},
    store::ActorRecord,
};

pub const LOCAL: &str = "https://vernissage.example";
pub const ALICE: &str = "https://remote.example/users/alice";
pub const CAROL: &str = "https://remote.example/users/carol";
pub const OTHER_ALICE: &str = "https://elsewhere.example/users/alice";

/// An RSA key pair in PEM form.
#[derive(Clone)]
pub struct Keys {
    pub private_key_pem: String,
    pub public_key_pem: String,
}

/// Key pair shared by every test in the binary; generation is slow.
pub fn keys() -> Keys {
    static KEYS: OnceLock<Keys> = OnceLock::new();
    KEYS.get_or_init(|| {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        Keys {
            private_key_pem: private_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
            public_key_pem: public_key_pem_of(&private_key).unwrap(),
        }
    })
    .clone()
}

pub fn local_id(username: &str) -> String {
    format!("{LOCAL}/actors/{username}")
}

/// Actor document for a remote actor signing with [`keys`].
pub fn person(id: &str) -> PersonDto {
    let username = id.rsplit('/').next().unwrap_or("user").to_string();
    PersonDto {
        context: None,
        id: id.to_string(),
        kind: ObjectType::Person,
        preferred_username: username,
        name: None,
        summary: None,
        inbox: format!("{id}/inbox"),
        outbox: None,
        followers: Some(format!("{id}/followers")),
        following: None,
        endpoints: None,
        shared_inbox: None,
        manually_approves_followers: Some(false),
        public_key: Some(PublicKeyDto {
            id: format!("{id}#main-key"),
            owner: id.to_string(),
            public_key_pem: keys().public_key_pem,
        }),
        icon: None,
        image: None,
    }
}

pub fn activity(json: &Value) -> ActivityDto {
    ActivityDto::parse(&serde_json::to_vec(json).unwrap()).unwrap()
}

/// Everything wired together over in-memory collaborators.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<MemoryFetcher>,
    pub queue: Arc<MemoryDeliveryQueue>,
    pub resolver: Arc<RemoteActorResolver<MemoryStore, MemoryFetcher>>,
    pub dispatcher: ActivityDispatcher,
    pub verifier: SignatureVerifier,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(MemoryFetcher::new());
        let queue = Arc::new(MemoryDeliveryQueue::new());
        let resolver = Arc::new(RemoteActorResolver::new(store.clone(), fetcher.clone()));

        let dispatcher = ActivityDispatcher::new(DispatcherDeps {
            actors: resolver.clone(),
            graph: store.clone(),
            content: store.clone(),
            media: store.clone(),
            fetcher: fetcher.clone(),
        })
        .with_delivery(ActivityDelivery::new(queue.clone()));
        let verifier = SignatureVerifier::new(resolver.clone(), VerifierSettings::default());

        Self {
            store,
            fetcher,
            queue,
            resolver,
            dispatcher,
            verifier,
        }
    }

    /// Register remote actors that can be fetched.
    pub async fn with_remote(self, ids: &[&str]) -> Self {
        for id in ids {
            self.fetcher.insert_actor(person(id)).await;
        }
        self
    }

    /// Insert a local actor owning [`keys`].
    pub async fn local_actor(&self, username: &str, manually_approves: bool) -> ActorRecord {
        let mut actor = self
            .store
            .insert_local_actor(username, &local_id(username), manually_approves)
            .await;
        let keys = keys();
        actor.public_key_pem = Some(keys.public_key_pem);
        actor.private_key_pem = Some(keys.private_key_pem);
        self.store.insert_actor(actor.clone()).await;
        actor
    }
}

/// Sign `body` for `path` on the local instance, as `actor_id` at `now`.
pub fn signed_request(actor_id: &str, path: &str, body: &[u8], now: DateTime<Utc>) -> SignedRequest {
    let signer = HttpSigner::new(&keys().private_key_pem, format!("{actor_id}#main-key")).unwrap();
    let url = Url::parse(&format!("{LOCAL}{path}")).unwrap();
    let headers = signer.sign_request_at("POST", &url, body, now).unwrap();

    SignedRequest {
        method: Method::POST,
        path: path.to_string(),
        headers,
        body: Bytes::copy_from_slice(body),
    }
}

/// Replace the signature of `request` with one covering only `names`.
pub fn resign_over(actor_id: &str, request: &mut SignedRequest, names: &[&str]) {
    let owned: Vec<String> = names.iter().map(ToString::to_string).collect();
    let canonical =
        canonical_string(request.method.as_str(), &request.path, &request.headers, &owned).unwrap();
    let signing_key = SigningKey::<Sha256>::new(parse_private_key(&keys().private_key_pem).unwrap());
    let signature: Signature = signing_key.sign_prehash(&signing_digest(&canonical)).unwrap();
    let value = SignatureHeader::render(
        &format!("{actor_id}#main-key"),
        names,
        &BASE64.encode(signature.to_bytes()),
    );
    request
        .headers
        .insert("signature", HeaderValue::from_str(&value).unwrap());
}

pub fn header(headers: &HeaderMap, name: &str) -> String {
    headers.get(name).unwrap().to_str().unwrap().to_string()
}
