//! Announce (reblog) handling.

use tracing::{debug, info};
use vernissage_activitypub::{ActivityDto, ComplexType};
use vernissage_common::AppResult;

use super::{ActivityDispatcher, DispatchSummary, Outcome, cross_product, create::Ingested, run_units};
use crate::{
    error::DispatchError,
    store::{NewReblog, Visibility},
};

impl ActivityDispatcher {
    /// Record reblogs and put them on the booster's followers' timelines.
    /// A redelivered Announce repeats the fan-out of its stored reblog.
    pub(super) async fn announce(&self, activity: &ActivityDto) -> Result<DispatchSummary, DispatchError> {
        let object_ids = activity.object_ids();
        let single_object = object_ids.len() == 1;
        let to = activity.to.as_ref().map(ComplexType::actor_ids).unwrap_or_default();
        let cc = activity.cc.as_ref().map(ComplexType::actor_ids).unwrap_or_default();
        let visibility = Visibility::from_audience(&to, &cc, None);

        let pairs = cross_product(&activity.actor_ids(), &object_ids);
        let units = pairs
            .iter()
            .map(|(actor, object)| {
                let key = if single_object {
                    activity.id.clone()
                } else {
                    format!("{}#{object}", activity.id)
                };
                self.announce_pair(key, actor, object, visibility)
            })
            .collect();

        run_units("Announce", units).await
    }

    async fn announce_pair(
        &self,
        reblog_id: String,
        actor_id: &str,
        object_id: &str,
        visibility: Visibility,
    ) -> AppResult<Outcome> {
        let Some(booster) = self.actors.resolve(actor_id).await? else {
            debug!(actor = %actor_id, "Announce from unresolvable actor, skipping");
            return Ok(Outcome::Skipped);
        };
        if let Some(reblog) = self.content.find_reblog(&reblog_id).await? {
            debug!(reblog = %reblog_id, "Reblog already stored");
            if reblog.author_id == booster.id {
                self.fan_out(&booster, &reblog, &[]).await?;
            }
            return Ok(Outcome::Skipped);
        }

        let original = match self.content.find_by_activity_pub_id(object_id).await? {
            Some(original) => original,
            None => {
                let Some(note) = self.fetch_remote_note(object_id).await? else {
                    return Ok(Outcome::Skipped);
                };
                match self.ingest_note(&note, None).await? {
                    Ingested::Created(record) | Ingested::Existing(record) => record,
                    Ingested::Refused => return Ok(Outcome::Skipped),
                }
            }
        };

        let reblog = self
            .content
            .create_reblog(NewReblog {
                activity_pub_id: reblog_id,
                author_id: booster.id.clone(),
                reblog_of_id: original.id.clone(),
                visibility,
            })
            .await?;

        info!(actor = %actor_id, object = %object_id, "Reblog stored");

        self.fan_out(&booster, &reblog, &[]).await?;
        Ok(Outcome::Applied)
    }
}
