//! Accept and Reject of follow requests.

use tracing::{debug, info, warn};
use vernissage_activitypub::{ActivityDto, ObjectType};
use vernissage_common::AppResult;

use super::{ActivityDispatcher, DispatchSummary, Outcome, cross_product, run_units};
use crate::{error::DispatchError, store::FollowEdge};

/// What the followed actor decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Accept,
    Reject,
}

impl Decision {
    const fn name(self) -> &'static str {
        match self {
            Self::Accept => "Accept",
            Self::Reject => "Reject",
        }
    }
}

impl ActivityDispatcher {
    /// Approve pending follows of the sender.
    pub(super) async fn accept(&self, activity: &ActivityDto) -> Result<DispatchSummary, DispatchError> {
        self.decide(activity, Decision::Accept).await
    }

    /// Drop follows of the sender.
    pub(super) async fn reject(&self, activity: &ActivityDto) -> Result<DispatchSummary, DispatchError> {
        self.decide(activity, Decision::Reject).await
    }

    async fn decide(
        &self,
        activity: &ActivityDto,
        decision: Decision,
    ) -> Result<DispatchSummary, DispatchError> {
        let senders = activity.actor_ids();
        let mut units = Vec::new();

        for object in activity.objects() {
            match &object.kind {
                ObjectType::Follow => {
                    let targets: Vec<String> = object.objects().into_iter().map(|o| o.id).collect();
                    for (source, target) in cross_product(&object.actor_ids(), &targets) {
                        if !senders.contains(&target) {
                            warn!(
                                activity = %activity.id,
                                object = %target,
                                "{} sent on behalf of another actor, skipping",
                                decision.name()
                            );
                            continue;
                        }
                        units.push(FollowRef::Pair { source, target });
                    }
                }
                ObjectType::Reference => units.push(FollowRef::ActivityId(object.id.clone())),
                other => {
                    info!(
                        activity = %activity.id,
                        object_type = %other,
                        "Unsupported {} object type",
                        decision.name()
                    );
                }
            }
        }

        let units = units
            .iter()
            .map(|follow| self.decide_unit(&senders, follow, decision))
            .collect();

        run_units(decision.name(), units).await
    }

    async fn decide_unit(
        &self,
        senders: &[String],
        follow: &FollowRef,
        decision: Decision,
    ) -> AppResult<Outcome> {
        let Some(edge) = self.find_follow(senders, follow).await? else {
            debug!(follow = ?follow, "No matching follow request");
            return Ok(Outcome::Skipped);
        };

        match decision {
            Decision::Accept if edge.approved => {
                debug!(edge = %edge.id, "Follow already approved");
                return Ok(Outcome::Skipped);
            }
            Decision::Accept => self.graph.approve_edge(&edge.id).await?,
            Decision::Reject => self.graph.delete_edge(&edge.id).await?,
        }
        self.graph.recount_followers(&edge.target_id).await?;
        self.graph.recount_following(&edge.source_id).await?;

        info!(
            source = %edge.source_id,
            target = %edge.target_id,
            "Follow {}ed",
            decision.name().to_lowercase()
        );
        Ok(Outcome::Applied)
    }

    async fn find_follow(&self, senders: &[String], follow: &FollowRef) -> AppResult<Option<FollowEdge>> {
        match follow {
            FollowRef::Pair { source, target } => {
                let (Some(source), Some(target)) =
                    (self.actors.find(source).await?, self.actors.find(target).await?)
                else {
                    return Ok(None);
                };
                self.graph.find_edge(&source.id, &target.id).await
            }
            FollowRef::ActivityId(activity_id) => {
                let Some(edge) = self.graph.find_edge_by_activity_id(activity_id).await? else {
                    return Ok(None);
                };
                for sender in senders {
                    if let Some(actor) = self.actors.find(sender).await? {
                        if actor.id == edge.target_id {
                            return Ok(Some(edge));
                        }
                    }
                }
                warn!(follow = %activity_id, "Follow decided by an actor other than its target");
                Ok(None)
            }
        }
    }
}

/// A follow named either by its two actors or by its activity id.
#[derive(Debug)]
enum FollowRef {
    Pair { source: String, target: String },
    ActivityId(String),
}
