//! Activity envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{ActivityType, BaseActorDto, BaseObjectDto, ComplexType, ItemKind, ObjectType};

/// The `ActivityStreams` JSON-LD context.
pub const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// The security vocabulary context used for `publicKey`.
pub const SECURITY_CONTEXT: &str = "https://w3id.org/security/v1";

/// The public addressing collection.
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

/// `@context` value: a string, an object, or a list of either.
pub type ContextDto = ComplexType<Value>;

/// An activity as received in an inbox or sent to one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDto {
    /// JSON-LD context, preserved as received.
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextDto>,
    /// Activity type.
    #[serde(rename = "type")]
    pub kind: ActivityType,
    /// Activity id.
    pub id: String,
    /// One or more actors performing the activity. Decoded actors are
    /// always [`ItemKind::Object`], bare ids included.
    pub actor: ComplexType<ItemKind<BaseActorDto>>,
    /// Primary audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ComplexType<ItemKind<BaseActorDto>>>,
    /// Secondary audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<ComplexType<ItemKind<BaseActorDto>>>,
    /// One or more objects acted upon.
    pub object: ComplexType<ItemKind<BaseObjectDto>>,
    /// Summary text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Linked-data signature, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Value>,
    /// Publication timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

impl ActivityDto {
    /// Decode an activity from wire bytes.
    ///
    /// Returns `None` for anything that is not a well-formed activity; the
    /// failure is logged and never surfaces to the sender.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match serde_json::from_slice(bytes) {
            Ok(activity) => Some(activity),
            Err(e) => {
                debug!(error = %e, "Unrecognized activity payload");
                None
            }
        }
    }

    /// Ids of every actor, in wire order.
    #[must_use]
    pub fn actor_ids(&self) -> Vec<String> {
        self.actor.actor_ids()
    }

    /// Every object in wire order; bare references become
    /// [`ObjectType::Reference`] stand-ins.
    #[must_use]
    pub fn objects(&self) -> Vec<BaseObjectDto> {
        self.object.objects()
    }

    /// Ids of every object, in wire order.
    #[must_use]
    pub fn object_ids(&self) -> Vec<String> {
        self.object.object_ids()
    }

    /// Ids in `to` and `cc`, in that order.
    #[must_use]
    pub fn audience_ids(&self) -> Vec<String> {
        [&self.to, &self.cc]
            .into_iter()
            .flatten()
            .flat_map(|audience| audience.actor_ids())
            .collect()
    }

    /// Serialize for delivery.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn outbound(
        kind: ActivityType,
        id: impl Into<String>,
        actor_id: &str,
        object: ItemKind<BaseObjectDto>,
    ) -> Self {
        Self {
            context: Some(ComplexType::Many(vec![
                Value::String(ACTIVITY_STREAMS_CONTEXT.to_string()),
                Value::String(SECURITY_CONTEXT.to_string()),
            ])),
            kind,
            id: id.into(),
            actor: ComplexType::One(ItemKind::Reference(actor_id.to_string())),
            to: None,
            cc: None,
            object: ComplexType::One(object),
            summary: None,
            signature: None,
            published: None,
        }
    }

    fn addressed_to(mut self, to: &str) -> Self {
        self.to = Some(ComplexType::One(ItemKind::Reference(to.to_string())));
        self
    }

    /// `Follow` of `target_id` by `actor_id`.
    #[must_use]
    pub fn follow(id: impl Into<String>, actor_id: &str, target_id: &str) -> Self {
        Self::outbound(
            ActivityType::Follow,
            id,
            actor_id,
            ItemKind::Reference(target_id.to_string()),
        )
        .addressed_to(target_id)
    }

    /// `Undo` of an earlier `Follow` by `actor_id`.
    #[must_use]
    pub fn unfollow(id: impl Into<String>, actor_id: &str, follow: BaseObjectDto) -> Self {
        let target = follow.objects().first().map(|object| object.id.clone());
        let activity = Self::outbound(ActivityType::Undo, id, actor_id, ItemKind::Object(follow));
        match target {
            Some(target) => activity.addressed_to(&target),
            None => activity,
        }
    }

    /// `Accept` of a received `Follow`, sent back to its author.
    #[must_use]
    pub fn accept(id: impl Into<String>, actor_id: &str, follow: BaseObjectDto) -> Self {
        Self::answer(ActivityType::Accept, id, actor_id, follow)
    }

    /// `Reject` of a received `Follow`, sent back to its author.
    #[must_use]
    pub fn reject(id: impl Into<String>, actor_id: &str, follow: BaseObjectDto) -> Self {
        Self::answer(ActivityType::Reject, id, actor_id, follow)
    }

    fn answer(
        kind: ActivityType,
        id: impl Into<String>,
        actor_id: &str,
        follow: BaseObjectDto,
    ) -> Self {
        let follower = follow.actor_ids().into_iter().next();
        let activity = Self::outbound(kind, id, actor_id, ItemKind::Object(follow));
        match follower {
            Some(follower) => activity.addressed_to(&follower),
            None => activity,
        }
    }

    /// `Create` wrapping `object`, addressed like the object itself.
    #[must_use]
    pub fn create(id: impl Into<String>, actor_id: &str, object: BaseObjectDto) -> Self {
        let mut activity = Self::outbound(
            ActivityType::Create,
            id,
            actor_id,
            ItemKind::Object(object.clone()),
        );
        activity.to = object.to;
        activity.cc = object.cc;
        activity.published = object.published;
        activity
    }

    /// `Delete` of a local object, replaced by a `Tombstone`.
    #[must_use]
    pub fn delete(id: impl Into<String>, actor_id: &str, object_id: &str) -> Self {
        Self::outbound(
            ActivityType::Delete,
            id,
            actor_id,
            ItemKind::Object(BaseObjectDto::new(object_id, ObjectType::Tombstone)),
        )
        .addressed_to(PUBLIC_COLLECTION)
    }

    /// `Like` of `object_id`.
    #[must_use]
    pub fn like(id: impl Into<String>, actor_id: &str, object_id: &str) -> Self {
        Self::outbound(
            ActivityType::Like,
            id,
            actor_id,
            ItemKind::Reference(object_id.to_string()),
        )
    }

    /// `Undo` of the `Like` identified by `like_id`.
    #[must_use]
    pub fn undo_like(
        id: impl Into<String>,
        actor_id: &str,
        like_id: &str,
        object_id: &str,
    ) -> Self {
        let mut like = BaseObjectDto::new(like_id, ObjectType::Like);
        like.actor = Some(ComplexType::One(ItemKind::Reference(actor_id.to_string())));
        like.object = Some(Box::new(ComplexType::One(ItemKind::Reference(
            object_id.to_string(),
        ))));
        Self::outbound(ActivityType::Undo, id, actor_id, ItemKind::Object(like))
    }

    /// Public `Announce` of `object_id`, copied to the booster's followers.
    #[must_use]
    pub fn announce(
        id: impl Into<String>,
        actor_id: &str,
        object_id: &str,
        followers: Option<&str>,
    ) -> Self {
        let mut activity = Self::outbound(
            ActivityType::Announce,
            id,
            actor_id,
            ItemKind::Reference(object_id.to_string()),
        )
        .addressed_to(PUBLIC_COLLECTION);
        activity.cc =
            followers.map(|followers| ComplexType::One(ItemKind::Reference(followers.to_string())));
        activity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_non_activity() {
        assert!(ActivityDto::parse(b"not json").is_none());
        assert!(ActivityDto::parse(br#"{"id":"x"}"#).is_none());
        assert!(ActivityDto::parse(br#"{"type":"Follow","id":"x","actor":42,"object":"y"}"#).is_none());
    }

    #[test]
    fn test_empty_sequences_decode() {
        let activity = ActivityDto::parse(
            br#"{"type":"Follow","id":"https://a.example/1","actor":[],"object":[]}"#,
        )
        .unwrap();
        assert!(activity.actor_ids().is_empty());
        assert!(activity.objects().is_empty());
    }

    #[test]
    fn test_accept_is_addressed_to_follower() {
        let follow = BaseObjectDto::follow(
            "https://a.example/follows/1",
            "https://a.example/users/alice",
            "https://b.example/users/bob",
        );
        let accept = ActivityDto::accept(
            "https://b.example/users/bob#accept/1",
            "https://b.example/users/bob",
            follow,
        );

        assert_eq!(accept.kind, ActivityType::Accept);
        assert_eq!(accept.audience_ids(), vec!["https://a.example/users/alice"]);
        assert_eq!(accept.objects()[0].kind, ObjectType::Follow);
    }

    #[test]
    fn test_context_is_preserved() {
        let activity = ActivityDto::parse(
            br#"{
                "@context": {"@vocab": "https://www.w3.org/ns/activitystreams"},
                "type": "Like",
                "id": "https://a.example/likes/1",
                "actor": "https://a.example/users/alice",
                "object": "https://b.example/notes/1"
            }"#,
        )
        .unwrap();

        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["@context"]["@vocab"], ACTIVITY_STREAMS_CONTEXT);
    }
}
