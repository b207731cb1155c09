//! Applies verified inbound activities to local state.
//!
//! Each activity is broken into independent units of work: one per
//! (actor, object) pair, or one per object. Units run concurrently; a failing
//! unit is logged and does not stop the others. Once all units finish, the
//! first collaborator failure is reported so that the sender redelivers.
//! Every unit checks for existing state before writing, which makes
//! redelivery safe.

mod accept;
mod announce;
mod create;
mod delete;
mod follow;
mod like;
mod undo;

use std::{future::Future, sync::Arc};

use futures::future::join_all;
use tracing::{info, warn};
use vernissage_activitypub::{ActivityDto, ActivityType};
use vernissage_common::{AppError, AppResult};

use crate::{
    delivery::ActivityDelivery,
    error::DispatchError,
    store::{ActorResolver, ContentStore, FollowGraph, MediaFetcher, RemoteFetcher},
};

/// What happened to a single unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// State was changed.
    Applied,
    /// Nothing to do: already applied, unknown target, or not allowed.
    Skipped,
}

/// Counts of units applied and skipped for one activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Units that changed state.
    pub applied: usize,
    /// Units that were skipped.
    pub skipped: usize,
    /// Whether the activity type is outside the handled vocabulary.
    pub unsupported: bool,
}

impl DispatchSummary {
    fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::default()
        }
    }
}

/// Collaborators used by the dispatcher.
#[allow(missing_docs)]
#[derive(Clone)]
pub struct DispatcherDeps {
    pub actors: Arc<dyn ActorResolver>,
    pub graph: Arc<dyn FollowGraph>,
    pub content: Arc<dyn ContentStore>,
    pub media: Arc<dyn MediaFetcher>,
    pub fetcher: Arc<dyn RemoteFetcher>,
}

/// Routes verified activities to the matching handler.
#[derive(Clone)]
pub struct ActivityDispatcher {
    actors: Arc<dyn ActorResolver>,
    graph: Arc<dyn FollowGraph>,
    content: Arc<dyn ContentStore>,
    media: Arc<dyn MediaFetcher>,
    fetcher: Arc<dyn RemoteFetcher>,
    delivery: Option<ActivityDelivery>,
}

impl ActivityDispatcher {
    /// Create a dispatcher. Without [`Self::with_delivery`], automatic
    /// `Accept` replies are not sent.
    #[must_use]
    pub fn new(deps: DispatcherDeps) -> Self {
        Self {
            actors: deps.actors,
            graph: deps.graph,
            content: deps.content,
            media: deps.media,
            fetcher: deps.fetcher,
            delivery: None,
        }
    }

    /// Send replies (such as `Accept` for auto-approved follows) through
    /// `delivery`.
    #[must_use]
    pub fn with_delivery(mut self, delivery: ActivityDelivery) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Apply `activity`.
    pub async fn dispatch(&self, activity: &ActivityDto) -> Result<DispatchSummary, DispatchError> {
        if activity.actor.is_empty() {
            warn!(activity = %activity.id, "Activity has no actor");
            return Err(DispatchError::Incomplete(format!(
                "{} has no actor",
                activity.id
            )));
        }
        if activity.object.is_empty() {
            warn!(activity = %activity.id, "Activity has no object");
            return Err(DispatchError::Incomplete(format!(
                "{} has no object",
                activity.id
            )));
        }

        info!(
            activity = %activity.id,
            activity_type = %activity.kind,
            "Dispatching activity"
        );

        match &activity.kind {
            ActivityType::Follow => self.follow(activity).await,
            ActivityType::Undo => self.undo(activity).await,
            ActivityType::Accept => self.accept(activity).await,
            ActivityType::Reject => self.reject(activity).await,
            ActivityType::Delete => self.delete(activity).await,
            ActivityType::Like => self.like(activity).await,
            ActivityType::Create => self.create(activity).await,
            ActivityType::Announce => self.announce(activity).await,
            ActivityType::Update | ActivityType::Unknown(_) => {
                info!(
                    activity = %activity.id,
                    activity_type = %activity.kind,
                    "Unsupported activity type"
                );
                Ok(DispatchSummary::unsupported())
            }
        }
    }
}

/// Every (first, second) pair of the two lists.
pub(crate) fn cross_product(first: &[String], second: &[String]) -> Vec<(String, String)> {
    first
        .iter()
        .flat_map(|a| second.iter().map(move |b| (a.clone(), b.clone())))
        .collect()
}

/// Run `units` concurrently and fold their outcomes.
pub(crate) async fn run_units<F>(kind: &str, units: Vec<F>) -> Result<DispatchSummary, DispatchError>
where
    F: Future<Output = AppResult<Outcome>>,
{
    summarize(kind, join_all(units).await)
}

fn summarize(
    kind: &str,
    results: Vec<AppResult<Outcome>>,
) -> Result<DispatchSummary, DispatchError> {
    let mut summary = DispatchSummary::default();
    let mut first_error: Option<AppError> = None;

    for result in results {
        match result {
            Ok(Outcome::Applied) => summary.applied += 1,
            Ok(Outcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                warn!(activity_type = kind, error = %e, "Unit of work failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(DispatchError::Collaborator(e)),
        None => Ok(summary),
    }
}
