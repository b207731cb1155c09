//! Inbound HTTP signature verification.

use std::sync::Arc;

use ::signature::hazmat::PrehashVerifier;
use axum::http::{HeaderMap, Method, header};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use sha2::Sha256;
use tracing::{debug, warn};
use vernissage_activitypub::ActivityDto;
use vernissage_common::{FederationConfig, crypto::parse_public_key};

use crate::{
    error::SignatureVerificationError,
    signature::{SignatureHeader, canonical_string, parse_http_date, signing_digest, verify_digest},
    store::{ActorRecord, ActorResolver},
};

/// Default accepted distance between the `Date` header and now.
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: i64 = 5 * 60;

/// Tunables for [`SignatureVerifier`].
#[derive(Debug, Clone, Copy)]
pub struct VerifierSettings {
    /// Accepted distance between the `Date` header and now, in either direction.
    pub max_clock_skew: Duration,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            max_clock_skew: Duration::seconds(DEFAULT_MAX_CLOCK_SKEW_SECS),
        }
    }
}

impl From<&FederationConfig> for VerifierSettings {
    fn from(config: &FederationConfig) -> Self {
        Self {
            max_clock_skew: Duration::seconds(config.max_clock_skew_secs),
        }
    }
}

/// The parts of an inbound request covered by its signature.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    /// Path and query, exactly as requested.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// An actor whose signature checked out.
#[derive(Debug, Clone)]
pub struct VerifiedActor {
    pub actor: ActorRecord,
    /// `keyId` from the signature header, for logging.
    pub key_id: Option<String>,
}

/// Verifies draft-cavage HTTP signatures on inbound activities.
#[derive(Clone)]
pub struct SignatureVerifier {
    actors: Arc<dyn ActorResolver>,
    settings: VerifierSettings,
}

impl SignatureVerifier {
    /// Create a verifier resolving keys through `actors`.
    #[must_use]
    pub fn new(actors: Arc<dyn ActorResolver>, settings: VerifierSettings) -> Self {
        Self { actors, settings }
    }

    /// Verify `request`, which carried `activity`, against the current time.
    pub async fn verify(
        &self,
        request: &SignedRequest,
        activity: &ActivityDto,
    ) -> Result<VerifiedActor, SignatureVerificationError> {
        self.verify_at(request, activity, Utc::now()).await
    }

    /// Verify `request` as if received at `now`.
    ///
    /// Every check that needs no I/O runs before the actor is resolved, so a
    /// stale or malformed request never triggers a remote fetch.
    pub async fn verify_at(
        &self,
        request: &SignedRequest,
        activity: &ActivityDto,
        now: DateTime<Utc>,
    ) -> Result<VerifiedActor, SignatureVerificationError> {
        let actor_ids = activity.actor_ids();
        let [actor_id] = actor_ids.as_slice() else {
            return Err(SignatureVerificationError::SingleActorIsSupportedInSigning);
        };

        let signature_header = request
            .headers
            .get("signature")
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .ok_or(SignatureVerificationError::MissingSignatureHeader)?;
        let parsed = SignatureHeader::parse(&signature_header);

        let signed_headers = parsed
            .headers
            .as_ref()
            .ok_or(SignatureVerificationError::MissingSignedHeadersList)?;

        let canonical = canonical_string(
            request.method.as_str(),
            &request.path,
            &request.headers,
            signed_headers,
        )
        .map_err(SignatureVerificationError::MissingSignedHeader)?;
        debug!(signing_string = %canonical, "Verifying signing string");
        let digest = signing_digest(&canonical);

        let signature = parsed
            .signature
            .as_deref()
            .ok_or(SignatureVerificationError::MissingSignatureInHeader)?;

        require_covered_headers(signed_headers, &request.body)?;
        self.check_time_window(&request.headers, now)?;

        if let Some(digest_header) = request.headers.get("digest") {
            let digest_header = String::from_utf8_lossy(digest_header.as_bytes());
            if !verify_digest(&request.body, &digest_header) {
                return Err(SignatureVerificationError::DigestMismatch);
            }
        }

        let actor = self
            .actors
            .resolve(actor_id)
            .await
            .map_err(SignatureVerificationError::ActorResolution)?
            .ok_or_else(|| SignatureVerificationError::UserNotExistsInDatabase(actor_id.clone()))?;

        let public_key_pem = actor
            .public_key_pem
            .as_deref()
            .ok_or_else(|| SignatureVerificationError::PublicKeyNotExists(actor_id.clone()))?;

        verify_signature(public_key_pem, signature, &digest)?;

        debug!(actor = %actor_id, key_id = ?parsed.key_id, "Signature verified");

        Ok(VerifiedActor {
            actor,
            key_id: parsed.key_id,
        })
    }

    fn check_time_window(
        &self,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureVerificationError> {
        let Some(date) = headers
            .get(header::DATE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_http_date)
        else {
            warn!("Missing or unparseable Date header");
            return Err(SignatureVerificationError::BadTimeWindow);
        };

        let skew = now.signed_duration_since(date);
        if skew.abs() > self.settings.max_clock_skew {
            warn!(
                clock_skew_secs = skew.num_seconds(),
                max_allowed_secs = self.settings.max_clock_skew.num_seconds(),
                "Request date outside accepted window"
            );
            return Err(SignatureVerificationError::BadTimeWindow);
        }

        Ok(())
    }
}

/// The signature must cover `Date`, and `Digest` when there is a body;
/// otherwise either could be rewritten without breaking it.
fn require_covered_headers(
    signed_headers: &[String],
    body: &[u8],
) -> Result<(), SignatureVerificationError> {
    let covers = |name: &str| signed_headers.iter().any(|signed| signed == name);

    if !covers("date") {
        warn!("Signature does not cover the Date header");
        return Err(SignatureVerificationError::MissingSignedHeader("date".to_string()));
    }
    if !body.is_empty() && !covers("digest") {
        warn!("Signature does not cover the Digest header");
        return Err(SignatureVerificationError::MissingSignedHeader("digest".to_string()));
    }
    Ok(())
}

fn verify_signature(
    public_key_pem: &str,
    signature: &str,
    digest: &[u8; 32],
) -> Result<(), SignatureVerificationError> {
    let public_key = parse_public_key(public_key_pem).map_err(|e| {
        warn!(error = %e, "Stored public key is malformed");
        SignatureVerificationError::SignatureIsNotValid
    })?;

    let signature_bytes = BASE64
        .decode(signature)
        .map_err(|_| SignatureVerificationError::SignatureIsNotValid)?;
    let signature = Signature::try_from(signature_bytes.as_slice())
        .map_err(|_| SignatureVerificationError::SignatureIsNotValid)?;

    VerifyingKey::<Sha256>::new(public_key)
        .verify_prehash(digest, &signature)
        .map_err(|e| {
            warn!(error = %e, "Signature verification failed");
            SignatureVerificationError::SignatureIsNotValid
        })
}
