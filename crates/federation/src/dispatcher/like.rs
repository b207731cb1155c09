//! Like activity handling.

use tracing::{debug, info};
use vernissage_activitypub::ActivityDto;
use vernissage_common::AppResult;

use super::{ActivityDispatcher, DispatchSummary, Outcome, cross_product, run_units};
use crate::error::DispatchError;

impl ActivityDispatcher {
    /// Favourite local content.
    pub(super) async fn like(&self, activity: &ActivityDto) -> Result<DispatchSummary, DispatchError> {
        let pairs = cross_product(&activity.actor_ids(), &activity.object_ids());
        let units = pairs
            .iter()
            .map(|(actor, object)| self.like_pair(&activity.id, actor, object))
            .collect();

        run_units("Like", units).await
    }

    async fn like_pair(&self, activity_id: &str, actor_id: &str, object_id: &str) -> AppResult<Outcome> {
        let Some(actor) = self.actors.resolve(actor_id).await? else {
            debug!(actor = %actor_id, "Like from unresolvable actor, skipping");
            return Ok(Outcome::Skipped);
        };
        let Some(content) = self.content.find_by_activity_pub_id(object_id).await? else {
            debug!(object = %object_id, "Like of unknown content, skipping");
            return Ok(Outcome::Skipped);
        };
        if self.content.find_favourite(&actor.id, &content.id).await?.is_some() {
            debug!(actor = %actor_id, object = %object_id, "Favourite already exists");
            return Ok(Outcome::Skipped);
        }

        self.content
            .create_favourite(&actor.id, &content.id, Some(activity_id))
            .await?;
        let count = self.content.recount_favourites(&content.id).await?;

        info!(actor = %actor_id, object = %object_id, favourites = count, "Favourite created");
        Ok(Outcome::Applied)
    }
}
