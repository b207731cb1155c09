//! Outbound activity delivery.
//!
//! Builds activities for local actors, signs them for each destination inbox
//! and hands them to the [`DeliveryQueue`]. Retries belong to the queue.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};
use url::Url;
use vernissage_activitypub::{ActivityDto, BaseObjectDto};
use vernissage_common::{AppError, AppResult, IdGenerator};

use crate::{
    signature::HttpSigner,
    store::{ActorRecord, DeliveryQueue, SignedDelivery},
};

/// Builds, signs and enqueues outbound activities.
#[derive(Clone)]
pub struct ActivityDelivery {
    queue: Arc<dyn DeliveryQueue>,
    id_gen: IdGenerator,
}

impl ActivityDelivery {
    /// Create a delivery service feeding `queue`.
    #[must_use]
    pub fn new(queue: Arc<dyn DeliveryQueue>) -> Self {
        Self {
            queue,
            id_gen: IdGenerator::new(),
        }
    }

    /// Sign `activity` on behalf of `sender` for a single inbox.
    pub fn sign(
        &self,
        activity: &ActivityDto,
        sender: &ActorRecord,
        inbox: &str,
    ) -> AppResult<SignedDelivery> {
        let private_key_pem = sender.private_key_pem.as_deref().ok_or_else(|| {
            AppError::Internal(format!("Actor {} has no private key", sender.activity_pub_id))
        })?;
        let url = Url::parse(inbox)
            .map_err(|e| AppError::BadRequest(format!("Invalid inbox URL {inbox}: {e}")))?;
        let body = activity
            .to_bytes()
            .map_err(|e| AppError::Internal(format!("Failed to serialize activity: {e}")))?;

        let signer = HttpSigner::new(private_key_pem, sender.key_id())
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let headers = signer
            .sign_request("POST", &url, &body)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(SignedDelivery {
            inbox: inbox.to_string(),
            body: Bytes::from(body),
            headers,
        })
    }

    /// Sign and enqueue `activity` for every distinct inbox.
    pub async fn deliver(
        &self,
        activity: &ActivityDto,
        sender: &ActorRecord,
        inboxes: &[String],
    ) -> AppResult<()> {
        let mut seen = Vec::with_capacity(inboxes.len());
        for inbox in inboxes {
            if seen.contains(inbox) {
                continue;
            }
            seen.push(inbox.clone());

            let delivery = self.sign(activity, sender, inbox)?;
            debug!(inbox = %inbox, activity = %activity.id, "Enqueueing delivery");
            self.queue.enqueue(delivery).await?;
        }

        info!(
            activity = %activity.id,
            activity_type = %activity.kind,
            inbox_count = seen.len(),
            "Queued activity for delivery"
        );
        Ok(())
    }

    async fn deliver_to(
        &self,
        activity: &ActivityDto,
        sender: &ActorRecord,
        recipient: &ActorRecord,
    ) -> AppResult<()> {
        let inbox = recipient.delivery_inbox().ok_or_else(|| {
            AppError::NotFound(format!("Actor {} has no inbox", recipient.activity_pub_id))
        })?;
        self.deliver(activity, sender, &[inbox.to_string()]).await
    }

    /// Accept `follower`'s follow request of `local`.
    pub async fn accept_follow(
        &self,
        local: &ActorRecord,
        follower: &ActorRecord,
        follow_id: &str,
    ) -> AppResult<()> {
        let follow = BaseObjectDto::follow(
            follow_id,
            &follower.activity_pub_id,
            &local.activity_pub_id,
        );
        let activity = ActivityDto::accept(
            self.id_gen.activity_id(&local.activity_pub_id, "accept"),
            &local.activity_pub_id,
            follow,
        );
        self.deliver_to(&activity, local, follower).await
    }

    /// Reject `follower`'s follow request of `local`.
    pub async fn reject_follow(
        &self,
        local: &ActorRecord,
        follower: &ActorRecord,
        follow_id: &str,
    ) -> AppResult<()> {
        let follow = BaseObjectDto::follow(
            follow_id,
            &follower.activity_pub_id,
            &local.activity_pub_id,
        );
        let activity = ActivityDto::reject(
            self.id_gen.activity_id(&local.activity_pub_id, "reject"),
            &local.activity_pub_id,
            follow,
        );
        self.deliver_to(&activity, local, follower).await
    }

    /// Follow a remote actor. Returns the `Follow` activity id.
    pub async fn follow(&self, local: &ActorRecord, target: &ActorRecord) -> AppResult<String> {
        let id = self.id_gen.activity_id(&local.activity_pub_id, "follow");
        let activity = ActivityDto::follow(
            id.clone(),
            &local.activity_pub_id,
            &target.activity_pub_id,
        );
        self.deliver_to(&activity, local, target).await?;
        Ok(id)
    }

    /// Undo an earlier follow identified by `follow_id`.
    pub async fn unfollow(
        &self,
        local: &ActorRecord,
        target: &ActorRecord,
        follow_id: &str,
    ) -> AppResult<()> {
        let follow = BaseObjectDto::follow(
            follow_id,
            &local.activity_pub_id,
            &target.activity_pub_id,
        );
        let activity = ActivityDto::unfollow(
            self.id_gen.activity_id(&local.activity_pub_id, "undo"),
            &local.activity_pub_id,
            follow,
        );
        self.deliver_to(&activity, local, target).await
    }

    /// Like remote content. Returns the `Like` activity id.
    pub async fn like(
        &self,
        local: &ActorRecord,
        author: &ActorRecord,
        object_id: &str,
    ) -> AppResult<String> {
        let id = self.id_gen.activity_id(&local.activity_pub_id, "like");
        let activity = ActivityDto::like(id.clone(), &local.activity_pub_id, object_id);
        self.deliver_to(&activity, local, author).await?;
        Ok(id)
    }

    /// Undo an earlier like identified by `like_id`.
    pub async fn undo_like(
        &self,
        local: &ActorRecord,
        author: &ActorRecord,
        like_id: &str,
        object_id: &str,
    ) -> AppResult<()> {
        let activity = ActivityDto::undo_like(
            self.id_gen.activity_id(&local.activity_pub_id, "undo"),
            &local.activity_pub_id,
            like_id,
            object_id,
        );
        self.deliver_to(&activity, local, author).await
    }
}
