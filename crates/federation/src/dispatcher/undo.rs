//! Undo activity handling.

use tracing::{debug, info, warn};
use vernissage_activitypub::{ActivityDto, BaseObjectDto, ObjectType};
use vernissage_common::AppResult;

use super::{ActivityDispatcher, DispatchSummary, Outcome, cross_product, run_units};
use crate::error::DispatchError;

/// One unit of an Undo.
#[derive(Debug)]
enum UndoTarget {
    Follow { source: String, target: String },
    Like { actor: String, object: String },
    /// Id of an earlier Follow.
    Reference(String),
}

impl ActivityDispatcher {
    /// Reverse an earlier `Follow` or `Like`.
    pub(super) async fn undo(&self, activity: &ActivityDto) -> Result<DispatchSummary, DispatchError> {
        let senders = activity.actor_ids();
        let mut targets = Vec::new();
        let mut unsupported = 0;

        for object in activity.objects() {
            match &object.kind {
                ObjectType::Follow => targets.extend(
                    Self::nested_pairs(&senders, &object)
                        .into_iter()
                        .map(|(source, target)| UndoTarget::Follow { source, target }),
                ),
                ObjectType::Like => targets.extend(
                    Self::nested_pairs(&senders, &object)
                        .into_iter()
                        .map(|(actor, object)| UndoTarget::Like { actor, object }),
                ),
                ObjectType::Reference => targets.push(UndoTarget::Reference(object.id.clone())),
                other => {
                    info!(
                        activity = %activity.id,
                        object_type = %other,
                        "Unsupported Undo object type"
                    );
                    unsupported += 1;
                }
            }
        }

        let units = targets
            .iter()
            .map(|unit| self.undo_unit(&senders, unit))
            .collect();
        let mut summary = run_units("Undo", units).await?;
        summary.skipped += unsupported;
        Ok(summary)
    }

    /// Pairs of the nested activity limited to actors that sent the Undo.
    fn nested_pairs(senders: &[String], nested: &BaseObjectDto) -> Vec<(String, String)> {
        let nested_actors: Vec<String> = nested
            .actor_ids()
            .into_iter()
            .filter(|actor| {
                let allowed = senders.contains(actor);
                if !allowed {
                    warn!(actor = %actor, "Undo of an activity sent by another actor, skipping");
                }
                allowed
            })
            .collect();
        let nested_objects: Vec<String> = nested.objects().into_iter().map(|o| o.id).collect();

        cross_product(&nested_actors, &nested_objects)
    }

    async fn undo_unit(&self, senders: &[String], unit: &UndoTarget) -> AppResult<Outcome> {
        match unit {
            UndoTarget::Follow { source, target } => self.undo_follow_pair(source, target).await,
            UndoTarget::Like { actor, object } => self.undo_like_pair(actor, object).await,
            UndoTarget::Reference(activity_id) => {
                self.undo_reference_unit(senders, activity_id).await
            }
        }
    }

    async fn undo_follow_pair(&self, source_id: &str, target_id: &str) -> AppResult<Outcome> {
        let (Some(source), Some(target)) = (
            self.actors.find(source_id).await?,
            self.actors.find(target_id).await?,
        ) else {
            debug!(actor = %source_id, object = %target_id, "Unfollow of unknown actors, skipping");
            return Ok(Outcome::Skipped);
        };

        let Some(edge) = self.graph.find_edge(&source.id, &target.id).await? else {
            debug!(actor = %source_id, object = %target_id, "No follow to undo");
            return Ok(Outcome::Skipped);
        };

        self.graph.delete_edge(&edge.id).await?;
        self.graph.recount_followers(&target.id).await?;
        self.graph.recount_following(&source.id).await?;

        info!(actor = %source_id, object = %target_id, "Follow removed");
        Ok(Outcome::Applied)
    }

    async fn undo_like_pair(&self, actor_id: &str, object_id: &str) -> AppResult<Outcome> {
        let Some(actor) = self.actors.find(actor_id).await? else {
            debug!(actor = %actor_id, "Unlike from unknown actor, skipping");
            return Ok(Outcome::Skipped);
        };
        let Some(content) = self.content.find_by_activity_pub_id(object_id).await? else {
            debug!(object = %object_id, "Unlike of unknown content, skipping");
            return Ok(Outcome::Skipped);
        };
        let Some(favourite) = self.content.find_favourite(&actor.id, &content.id).await? else {
            debug!(actor = %actor_id, object = %object_id, "No favourite to undo");
            return Ok(Outcome::Skipped);
        };

        self.content.delete_favourite(&favourite.id).await?;
        self.content.recount_favourites(&content.id).await?;

        info!(actor = %actor_id, object = %object_id, "Favourite removed");
        Ok(Outcome::Applied)
    }

    /// Some peers only send the id of the activity being undone.
    async fn undo_reference_unit(&self, senders: &[String], activity_id: &str) -> AppResult<Outcome> {
        let Some(edge) = self.graph.find_edge_by_activity_id(activity_id).await? else {
            info!(object = %activity_id, "Undo of an unknown activity reference");
            return Ok(Outcome::Skipped);
        };

        let mut owned_by_sender = false;
        for sender in senders {
            if let Some(actor) = self.actors.find(sender).await? {
                owned_by_sender |= actor.id == edge.source_id;
            }
        }
        if !owned_by_sender {
            warn!(object = %activity_id, "Undo of a follow sent by another actor, skipping");
            return Ok(Outcome::Skipped);
        }

        self.graph.delete_edge(&edge.id).await?;
        self.graph.recount_followers(&edge.target_id).await?;
        self.graph.recount_following(&edge.source_id).await?;

        info!(object = %activity_id, "Follow removed by reference");
        Ok(Outcome::Applied)
    }
}
