//! Follow activity handling.

use tracing::{debug, info, warn};
use vernissage_activitypub::ActivityDto;
use vernissage_common::AppResult;

use super::{ActivityDispatcher, Outcome, cross_product, run_units};
use crate::{error::DispatchError, store::ActorRecord};

impl ActivityDispatcher {
    /// Create a follow edge for every (actor, object) pair.
    pub(super) async fn follow(
        &self,
        activity: &ActivityDto,
    ) -> Result<super::DispatchSummary, DispatchError> {
        let pairs = cross_product(&activity.actor_ids(), &activity.object_ids());
        let units = pairs
            .iter()
            .map(|(source, target)| self.follow_pair(&activity.id, source, target))
            .collect();

        run_units("Follow", units).await
    }

    async fn follow_pair(
        &self,
        activity_id: &str,
        source_id: &str,
        target_id: &str,
    ) -> AppResult<Outcome> {
        let Some(source) = self.actors.resolve(source_id).await? else {
            warn!(actor = %source_id, "Follow source cannot be resolved, skipping");
            return Ok(Outcome::Skipped);
        };
        let Some(target) = self.actors.find(target_id).await? else {
            warn!(object = %target_id, "Follow target does not exist, skipping");
            return Ok(Outcome::Skipped);
        };
        if !target.is_local {
            warn!(object = %target_id, "Follow target is not a local actor, skipping");
            return Ok(Outcome::Skipped);
        }

        if let Some(edge) = self.graph.find_edge(&source.id, &target.id).await? {
            debug!(
                actor = %source_id,
                object = %target_id,
                approved = edge.approved,
                "Follow already exists"
            );
            // Peers re-send Follow when they missed our Accept.
            if edge.approved {
                self.send_accept(&target, &source, activity_id).await?;
            }
            return Ok(Outcome::Skipped);
        }

        let approved = !target.manually_approves_followers;
        self.graph
            .create_edge(&source.id, &target.id, approved, Some(activity_id))
            .await?;
        self.graph.recount_followers(&target.id).await?;
        self.graph.recount_following(&source.id).await?;

        info!(
            actor = %source_id,
            object = %target_id,
            approved = approved,
            "Follow created"
        );

        if approved {
            self.send_accept(&target, &source, activity_id).await?;
        }

        Ok(Outcome::Applied)
    }

    async fn send_accept(
        &self,
        local: &ActorRecord,
        follower: &ActorRecord,
        follow_id: &str,
    ) -> AppResult<()> {
        match &self.delivery {
            Some(delivery) if !follower.is_local => {
                delivery.accept_follow(local, follower, follow_id).await
            }
            _ => Ok(()),
        }
    }
}
