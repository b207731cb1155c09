//! HTTP Signature primitives for `ActivityPub`.
//!
//! Implements draft-cavage-http-signatures: the `Signature` header format, the
//! canonical signing string, body digests and the signer used for outbound
//! deliveries. Inbound verification lives in [`crate::verifier`].

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, NaiveDateTime, Utc};
use rsa::{
    RsaPrivateKey,
    pkcs1v15::{Signature, SigningKey},
};
use sha2::{Digest, Sha256};
use signature::{SignatureEncoding, hazmat::PrehashSigner};
use tracing::debug;
use url::Url;
use vernissage_common::crypto::parse_private_key;

/// Pseudo-header carrying the lowercased method and the request path.
pub const REQUEST_TARGET: &str = "(request-target)";

/// Headers covered by outbound signatures, in signing order.
pub const SIGNED_HEADERS: [&str; 4] = [REQUEST_TARGET, "host", "date", "digest"];

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// HTTP Signature error.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

/// Parameters of a `Signature` header.
///
/// Every parameter is optional here; callers decide which absences are fatal.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureHeader {
    pub key_id: Option<String>,
    pub algorithm: Option<String>,
    pub headers: Option<Vec<String>>,
    pub signature: Option<String>,
}

impl SignatureHeader {
    /// Parse `keyId="...",headers="...",signature="..."`.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut parsed = Self::default();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "keyId" => parsed.key_id = Some(value),
                "algorithm" => parsed.algorithm = Some(value),
                "headers" => {
                    parsed.headers = Some(
                        value
                            .split_whitespace()
                            .map(str::to_lowercase)
                            .collect(),
                    );
                }
                "signature" => parsed.signature = Some(value),
                _ => {}
            }
        }

        parsed
    }

    /// Render the header value.
    #[must_use]
    pub fn render(key_id: &str, headers: &[&str], signature: &str) -> String {
        format!(
            "keyId=\"{key_id}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{signature}\"",
            headers.join(" ")
        )
    }
}

/// Build the canonical signing string.
///
/// Each named header becomes `"<lowercased name>: <value>"`; lines are joined
/// by `\n` without a trailing newline. Header lookup is case-insensitive and
/// repeated headers are joined with `", "`. On failure the missing header's
/// name is returned.
pub fn canonical_string(
    method: &str,
    path: &str,
    headers: &HeaderMap,
    names: &[String],
) -> Result<String, String> {
    let mut lines = Vec::with_capacity(names.len());

    for name in names {
        let name = name.to_lowercase();
        let value = if name == REQUEST_TARGET {
            format!("{} {path}", method.to_lowercase())
        } else {
            let values: Vec<String> = headers
                .get_all(name.as_str())
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
                .collect();
            if values.is_empty() {
                return Err(name);
            }
            values.join(", ")
        };
        lines.push(format!("{name}: {value}"));
    }

    Ok(lines.join("\n"))
}

/// SHA-256 of the canonical string; this is what gets signed.
#[must_use]
pub fn signing_digest(canonical: &str) -> [u8; 32] {
    Sha256::digest(canonical.as_bytes()).into()
}

/// Calculate the `Digest` header value of a body.
#[must_use]
pub fn calculate_digest(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64.encode(Sha256::digest(body)))
}

/// Verify that a `Digest` header matches the body.
///
/// The algorithm token is compared case-insensitively.
#[must_use]
pub fn verify_digest(body: &[u8], digest_header: &str) -> bool {
    let Some((algorithm, value)) = digest_header.trim().split_once('=') else {
        return false;
    };
    algorithm.eq_ignore_ascii_case("SHA-256") && value == BASE64.encode(Sha256::digest(body))
}

/// Format a timestamp as an HTTP date (RFC 7231).
#[must_use]
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an HTTP `Date` header.
///
/// Accepts RFC 7231 as well as the obsolete RFC 850 and asctime forms.
#[must_use]
pub fn parse_http_date(date: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(date) {
        return Some(parsed.with_timezone(&Utc));
    }

    let formats = [
        HTTP_DATE_FORMAT,
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
    ];

    formats.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(date, format)
            .ok()
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
    })
}

/// HTTP Signature signer for outgoing requests.
pub struct HttpSigner {
    private_key: RsaPrivateKey,
    key_id: String,
}

impl HttpSigner {
    /// Create a new HTTP signer from a PEM-encoded private key.
    pub fn new(private_key_pem: &str, key_id: String) -> Result<Self, SignatureError> {
        let private_key = parse_private_key(private_key_pem)
            .map_err(|e| SignatureError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self {
            private_key,
            key_id,
        })
    }

    /// Key id advertised in the `Signature` header.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign a request and return the `Host`, `Date`, `Digest` and
    /// `Signature` headers.
    pub fn sign_request(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
    ) -> Result<HeaderMap, SignatureError> {
        self.sign_request_at(method, url, body, Utc::now())
    }

    /// [`Self::sign_request`] with an explicit clock.
    pub fn sign_request_at(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<HeaderMap, SignatureError> {
        let host = url
            .host_str()
            .ok_or_else(|| SignatureError::InvalidUrl(format!("No host in URL: {url}")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let path = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, header_value(&host)?);
        headers.insert(header::DATE, header_value(&format_http_date(now))?);
        headers.insert(
            HeaderName::from_static("digest"),
            header_value(&calculate_digest(body))?,
        );

        let names: Vec<String> = SIGNED_HEADERS.iter().map(ToString::to_string).collect();
        let canonical = canonical_string(method, &path, &headers, &names)
            .map_err(|name| SignatureError::SigningFailed(format!("Missing header: {name}")))?;

        debug!(signing_string = %canonical, "Signing string");

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature: Signature = signing_key
            .sign_prehash(&signing_digest(&canonical))
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;
        let signature = BASE64.encode(signature.to_bytes());

        headers.insert(
            HeaderName::from_static("signature"),
            header_value(&SignatureHeader::render(
                &self.key_id,
                &SIGNED_HEADERS,
                &signature,
            ))?,
        );

        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, SignatureError> {
    HeaderValue::from_str(value).map_err(|e| SignatureError::InvalidHeader(e.to_string()))
}
