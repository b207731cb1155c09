//! Inbox handler for receiving `ActivityPub` activities.

use axum::{
    Router,
    body::Bytes,
    extract::{OriginalUri, Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::{debug, info, warn};
use vernissage_activitypub::ActivityDto;

use crate::{
    dispatcher::ActivityDispatcher,
    verifier::{SignatureVerifier, SignedRequest},
};

/// State required for the inbox handlers.
#[derive(Clone)]
pub struct InboxState {
    pub verifier: SignatureVerifier,
    pub dispatcher: ActivityDispatcher,
    /// When false, unsigned or badly signed requests are logged and processed.
    pub require_signatures: bool,
}

impl InboxState {
    /// Create a new inbox state that requires valid signatures.
    #[must_use]
    pub const fn new(verifier: SignatureVerifier, dispatcher: ActivityDispatcher) -> Self {
        Self {
            verifier,
            dispatcher,
            require_signatures: true,
        }
    }

    /// Override whether signatures are required.
    #[must_use]
    pub fn with_require_signatures(mut self, require_signatures: bool) -> Self {
        self.require_signatures = require_signatures;
        self
    }
}

/// Routes for the shared inbox and the per-actor inboxes.
pub fn inbox_router(state: InboxState) -> Router {
    Router::new()
        .route("/inbox", post(inbox_handler))
        .route("/actors/{name}/inbox", post(user_inbox_handler))
        .with_state(state)
}

/// Handle incoming `ActivityPub` activities.
///
/// This is the shared inbox endpoint that receives activities from remote servers.
pub async fn inbox_handler(
    State(state): State<InboxState>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);

    process(
        &state,
        SignedRequest {
            method,
            path,
            headers,
            body,
        },
    )
    .await
}

/// Handle incoming activities for a specific actor's inbox.
pub async fn user_inbox_handler(
    State(state): State<InboxState>,
    Path(name): Path<String>,
    uri: OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    debug!(actor = %name, "Activity posted to actor inbox");
    inbox_handler(State(state), uri, method, headers, body).await
}

async fn process(state: &InboxState, request: SignedRequest) -> Response {
    let Some(activity) = ActivityDto::parse(&request.body) else {
        warn!(path = %request.path, "Dropping unrecognized payload");
        return StatusCode::ACCEPTED.into_response();
    };

    info!(
        activity = %activity.id,
        activity_type = %activity.kind,
        "Received activity"
    );

    match state.verifier.verify(&request, &activity).await {
        Ok(verified) => {
            debug!(
                actor = %verified.actor.activity_pub_id,
                key_id = ?verified.key_id,
                "Signature verified"
            );
        }
        Err(e) if state.require_signatures => {
            warn!(activity = %activity.id, code = e.code(), error = %e, "Signature verification failed");
            return e.into_response();
        }
        Err(e) => {
            warn!(
                activity = %activity.id,
                code = e.code(),
                error = %e,
                "Signature verification failed, processing anyway"
            );
        }
    }

    match state.dispatcher.dispatch(&activity).await {
        Ok(summary) => {
            debug!(
                activity = %activity.id,
                applied = summary.applied,
                skipped = summary.skipped,
                unsupported = summary.unsupported,
                "Activity processed"
            );
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            warn!(activity = %activity.id, error = %e, "Activity processing failed");
            e.into_response()
        }
    }
}
