//! Delete activity handling.

use tracing::{debug, info, warn};
use vernissage_activitypub::ActivityDto;
use vernissage_common::AppResult;

use super::{ActivityDispatcher, DispatchSummary, Outcome, run_units};
use crate::error::DispatchError;

impl ActivityDispatcher {
    /// Remove actors and content deleted by their owners.
    pub(super) async fn delete(&self, activity: &ActivityDto) -> Result<DispatchSummary, DispatchError> {
        let senders = activity.actor_ids();
        let object_ids = activity.object_ids();
        let units = object_ids
            .iter()
            .map(|object_id| self.delete_object(&senders, object_id))
            .collect();

        run_units("Delete", units).await
    }

    async fn delete_object(&self, senders: &[String], object_id: &str) -> AppResult<Outcome> {
        if let Some(actor) = self.actors.find(object_id).await? {
            if actor.is_local {
                warn!(object = %object_id, "Remote Delete of a local actor ignored");
                return Ok(Outcome::Skipped);
            }
            if !senders.iter().any(|sender| sender == &actor.activity_pub_id) {
                warn!(object = %object_id, "Actor deleted by someone else, skipping");
                return Ok(Outcome::Skipped);
            }
            if actor.is_deleted {
                debug!(object = %object_id, "Actor already deleted");
                return Ok(Outcome::Skipped);
            }

            self.actors.mark_deleted(&actor.id).await?;
            info!(object = %object_id, "Remote actor deleted");
            return Ok(Outcome::Applied);
        }

        let Some(content) = self.content.find_by_activity_pub_id(object_id).await? else {
            debug!(object = %object_id, "Delete of unknown object, skipping");
            return Ok(Outcome::Skipped);
        };
        if content.is_local {
            warn!(object = %object_id, "Remote Delete of local content ignored");
            return Ok(Outcome::Skipped);
        }

        let mut authored_by_sender = false;
        for sender in senders {
            if let Some(actor) = self.actors.find(sender).await? {
                authored_by_sender |= actor.id == content.author_id;
            }
        }
        if !authored_by_sender {
            warn!(object = %object_id, "Content deleted by someone other than its author, skipping");
            return Ok(Outcome::Skipped);
        }

        self.content.delete_content(&content.id).await?;
        info!(object = %object_id, "Remote content deleted");
        Ok(Outcome::Applied)
    }
}
