//! Remote actor resolution.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use vernissage_common::{AppError, AppResult, FederationConfig};

use crate::store::{ActorRecord, ActorResolver, ActorStore, RemoteFetcher, RemoteProfile};

/// Default age after which a remote profile is refetched: 2 days.
pub const DEFAULT_ACTOR_REFRESH_AFTER_SECS: i64 = 2 * 24 * 60 * 60;

/// [`ActorResolver`] backed by an [`ActorStore`], fetching remote profiles
/// through a [`RemoteFetcher`] when they are unknown or stale.
pub struct RemoteActorResolver<S: ?Sized, F: ?Sized> {
    store: Arc<S>,
    fetcher: Arc<F>,
    refresh_after: Duration,
}

impl<S, F> RemoteActorResolver<S, F>
where
    S: ActorStore + ?Sized,
    F: RemoteFetcher + ?Sized,
{
    /// Create a resolver with the default refresh age.
    #[must_use]
    pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
        Self {
            store,
            fetcher,
            refresh_after: Duration::seconds(DEFAULT_ACTOR_REFRESH_AFTER_SECS),
        }
    }

    /// Create a resolver using the configured refresh age.
    #[must_use]
    pub fn from_config(store: Arc<S>, fetcher: Arc<F>, config: &FederationConfig) -> Self {
        Self::new(store, fetcher).with_refresh_after(Duration::seconds(
            config.actor_refresh_after_secs,
        ))
    }

    /// Override the refresh age.
    #[must_use]
    pub fn with_refresh_after(mut self, refresh_after: Duration) -> Self {
        self.refresh_after = refresh_after;
        self
    }

    async fn fetch_and_store(&self, activity_pub_id: &str) -> AppResult<ActorRecord> {
        info!(actor = %activity_pub_id, "Fetching remote actor");
        let person = self.fetcher.fetch_actor(activity_pub_id).await?;

        if person.id != activity_pub_id {
            return Err(AppError::NotFound(format!(
                "Actor document {} does not match requested id {activity_pub_id}",
                person.id
            )));
        }

        let actor = self.store.upsert_remote(RemoteProfile::from(&person)).await?;
        info!(actor = %activity_pub_id, username = %actor.username, "Stored remote actor");
        Ok(actor)
    }
}

#[async_trait]
impl<S, F> ActorResolver for RemoteActorResolver<S, F>
where
    S: ActorStore + ?Sized,
    F: RemoteFetcher + ?Sized,
{
    async fn find(&self, activity_pub_id: &str) -> AppResult<Option<ActorRecord>> {
        self.store.find_by_activity_pub_id(activity_pub_id).await
    }

    async fn resolve(&self, activity_pub_id: &str) -> AppResult<Option<ActorRecord>> {
        let stored = self.store.find_by_activity_pub_id(activity_pub_id).await?;

        match stored {
            Some(actor) if !actor.is_stale(self.refresh_after, Utc::now()) => {
                debug!(actor = %activity_pub_id, "Found stored actor");
                Ok(Some(actor))
            }
            Some(actor) => match self.fetch_and_store(activity_pub_id).await {
                Ok(refreshed) => Ok(Some(refreshed)),
                Err(e) => {
                    warn!(actor = %activity_pub_id, error = %e, "Refresh failed, using stored profile");
                    Ok(Some(actor))
                }
            },
            None => match self.fetch_and_store(activity_pub_id).await {
                Ok(actor) => Ok(Some(actor)),
                Err(AppError::NotFound(_)) => {
                    debug!(actor = %activity_pub_id, "Remote actor does not exist");
                    Ok(None)
                }
                Err(e) => Err(e),
            },
        }
    }

    async fn mark_deleted(&self, id: &str) -> AppResult<()> {
        self.store.mark_deleted(id).await
    }
}
