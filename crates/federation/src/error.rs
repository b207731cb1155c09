//! Error types for inbound federation.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};
use vernissage_common::AppError;

/// Why an inbound request failed HTTP signature verification.
#[derive(Debug, Error)]
pub enum SignatureVerificationError {
    #[error("Request date is outside the accepted time window")]
    BadTimeWindow,

    #[error("Request has no signature header")]
    MissingSignatureHeader,

    #[error("Signature header has no signed headers list")]
    MissingSignedHeadersList,

    #[error("Signed header is missing from the request: {0}")]
    MissingSignedHeader(String),

    #[error("Signature header has no signature value")]
    MissingSignatureInHeader,

    #[error("Only activities with a single actor can be verified")]
    SingleActorIsSupportedInSigning,

    #[error("Actor does not exist: {0}")]
    UserNotExistsInDatabase(String),

    #[error("Actor has no public key: {0}")]
    PublicKeyNotExists(String),

    #[error("Signature is not valid")]
    SignatureIsNotValid,

    #[error("Digest header does not match the request body")]
    DigestMismatch,

    #[error("Actor resolution failed: {0}")]
    ActorResolution(#[source] AppError),
}

impl SignatureVerificationError {
    /// Machine-readable code reported in the `{code, reason}` body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadTimeWindow => "badTimeWindow",
            Self::MissingSignatureHeader => "missingSignatureHeader",
            Self::MissingSignedHeadersList => "missingSignedHeadersList",
            Self::MissingSignedHeader(_) => "missingSignedHeader",
            Self::MissingSignatureInHeader => "missingSignatureInHeader",
            Self::SingleActorIsSupportedInSigning => "singleActorIsSupportedInSigning",
            Self::UserNotExistsInDatabase(_) => "userNotExistsInDatabase",
            Self::PublicKeyNotExists(_) => "publicKeyNotExists",
            Self::SignatureIsNotValid => "signatureIsNotValid",
            Self::DigestMismatch => "digestMismatch",
            Self::ActorResolution(e) => e.error_code(),
        }
    }

    /// HTTP status answered to the sending instance.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadTimeWindow
            | Self::MissingSignatureHeader
            | Self::MissingSignedHeadersList
            | Self::MissingSignedHeader(_)
            | Self::MissingSignatureInHeader
            | Self::SingleActorIsSupportedInSigning
            | Self::DigestMismatch => StatusCode::BAD_REQUEST,
            Self::UserNotExistsInDatabase(_)
            | Self::PublicKeyNotExists(_)
            | Self::SignatureIsNotValid => StatusCode::UNAUTHORIZED,
            Self::ActorResolution(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether the sender should redeliver later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ActorResolution(_))
    }
}

impl IntoResponse for SignatureVerificationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        if status.is_server_error() {
            error!(error = %self, code = code, "Signature verification could not complete");
        } else {
            debug!(error = %self, code = code, "Signature verification rejected request");
        }

        (status, Json(json!({ "code": code, "reason": self.to_string() }))).into_response()
    }
}

/// Why an activity could not be applied.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The activity has no actor or no object. Redelivery cannot fix it.
    #[error("Incomplete activity: {0}")]
    Incomplete(String),

    /// A collaborator failed for at least one unit of work.
    #[error("Collaborator failure: {0}")]
    Collaborator(#[from] AppError),
}

impl DispatchError {
    /// Whether the sender should redeliver later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Collaborator(_))
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match self {
            Self::Incomplete(reason) => {
                debug!(reason = %reason, "Dropping incomplete activity");
                StatusCode::ACCEPTED.into_response()
            }
            Self::Collaborator(e) => {
                error!(error = %e, "Activity processing failed, asking sender to retry");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "code": e.error_code(), "reason": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failures_are_client_errors() {
        let errors = [
            SignatureVerificationError::BadTimeWindow,
            SignatureVerificationError::MissingSignatureHeader,
            SignatureVerificationError::MissingSignedHeader("date".to_string()),
            SignatureVerificationError::SignatureIsNotValid,
            SignatureVerificationError::PublicKeyNotExists("a".to_string()),
        ];

        for error in errors {
            assert!(error.status_code().is_client_error(), "{error}");
            assert!(!error.is_retryable());
        }
    }

    #[test]
    fn test_resolution_failure_is_retryable() {
        let error =
            SignatureVerificationError::ActorResolution(AppError::Storage("down".to_string()));
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(error.is_retryable());
        assert_eq!(error.code(), "storageError");
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            SignatureVerificationError::SingleActorIsSupportedInSigning.code(),
            "singleActorIsSupportedInSigning"
        );
        assert_eq!(
            SignatureVerificationError::MissingSignatureInHeader.code(),
            "missingSignatureInHeader"
        );
    }
}
