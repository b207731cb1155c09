//! Collaborator contracts.
//!
//! The federation core never touches durable storage, object storage or the
//! job queue directly. Everything it needs from the rest of the server goes
//! through the traits in this module, injected as `Arc<dyn Trait>`.

#![allow(missing_docs)]

use async_trait::async_trait;
use axum::http::HeaderMap;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use vernissage_activitypub::{BaseObjectDto, PersonDto, is_public_collection};
use vernissage_common::AppResult;

/// An actor as known locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRecord {
    /// Local primary key.
    pub id: String,
    /// `ActivityPub` id.
    pub activity_pub_id: String,
    pub username: String,
    pub is_local: bool,
    pub public_key_pem: Option<String>,
    /// Only present for local actors.
    pub private_key_pem: Option<String>,
    pub inbox: Option<String>,
    pub shared_inbox: Option<String>,
    pub manually_approves_followers: bool,
    pub is_deleted: bool,
    /// When the profile was last stored or refreshed.
    pub updated_at: DateTime<Utc>,
}

impl ActorRecord {
    /// Whether a remote profile should be refetched. Local actors never are.
    #[must_use]
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        !self.is_local && now.signed_duration_since(self.updated_at) > max_age
    }

    /// Key id used in outbound `Signature` headers.
    #[must_use]
    pub fn key_id(&self) -> String {
        format!("{}#main-key", self.activity_pub_id)
    }

    /// Inbox to deliver to, preferring the shared inbox.
    #[must_use]
    pub fn delivery_inbox(&self) -> Option<&str> {
        self.shared_inbox.as_deref().or(self.inbox.as_deref())
    }
}

/// Remote profile data to upsert, taken from a fetched actor document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProfile {
    pub activity_pub_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub summary: Option<String>,
    pub public_key_pem: Option<String>,
    pub inbox: String,
    pub shared_inbox: Option<String>,
    pub avatar_url: Option<String>,
    pub manually_approves_followers: bool,
    pub is_bot: bool,
}

impl From<&PersonDto> for RemoteProfile {
    fn from(person: &PersonDto) -> Self {
        Self {
            activity_pub_id: person.id.clone(),
            username: person.preferred_username.clone(),
            display_name: person.name.clone(),
            summary: person.summary.clone(),
            public_key_pem: person.public_key_pem().map(ToString::to_string),
            inbox: person.inbox.clone(),
            shared_inbox: person.shared_inbox().map(ToString::to_string),
            avatar_url: person.icon_url().map(ToString::to_string),
            manually_approves_followers: person.manually_approves_followers.unwrap_or(false),
            is_bot: matches!(
                person.kind,
                vernissage_activitypub::ObjectType::Service
                    | vernissage_activitypub::ObjectType::Application
            ),
        }
    }
}

/// A follow relationship, pending until `approved`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub approved: bool,
    /// Id of the `Follow` activity that created the edge.
    pub activity_id: Option<String>,
}

/// Audience of a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Addressed to the public collection.
    Public,
    /// Public collection in `cc` only.
    Unlisted,
    /// Followers collection without the public collection.
    Followers,
    /// Only the addressed actors.
    Direct,
}

impl Visibility {
    /// Derive visibility from addressing.
    ///
    /// `followers_collection` is the author's followers collection when known;
    /// otherwise any id ending in `/followers` counts as one.
    #[must_use]
    pub fn from_audience(to: &[String], cc: &[String], followers_collection: Option<&str>) -> Self {
        if to.iter().any(|id| is_public_collection(id)) {
            return Self::Public;
        }
        if cc.iter().any(|id| is_public_collection(id)) {
            return Self::Unlisted;
        }

        let is_followers = |id: &String| match followers_collection {
            Some(collection) => id == collection,
            None => id.ends_with("/followers"),
        };
        if to.iter().chain(cc).any(is_followers) {
            Self::Followers
        } else {
            Self::Direct
        }
    }

    /// Whether approved followers receive the content on their timelines.
    #[must_use]
    pub const fn reaches_followers(self) -> bool {
        !matches!(self, Self::Direct)
    }
}

/// Content as known locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub id: String,
    pub activity_pub_id: String,
    pub author_id: String,
    pub is_local: bool,
    pub visibility: Visibility,
    /// Set for reblogs.
    pub reblog_of_id: Option<String>,
}

/// A downloaded media file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub url: String,
    pub media_type: Option<String>,
    pub data: Bytes,
}

/// An attachment to persist together with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub media: DownloadedMedia,
    pub description: Option<String>,
    pub blurhash: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Everything persisted by one [`ContentStore::create_content`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    pub activity_pub_id: String,
    pub url: Option<String>,
    pub author_id: String,
    pub body: Option<String>,
    pub content_warning: Option<String>,
    pub sensitive: bool,
    pub visibility: Visibility,
    pub in_reply_to_id: Option<String>,
    pub attachments: Vec<NewAttachment>,
    /// Lowercased, without the leading `#`.
    pub hashtags: Vec<String>,
    /// Local ids of mentioned local actors.
    pub mention_ids: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A reblog to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReblog {
    /// Id of the `Announce` activity.
    pub activity_pub_id: String,
    pub author_id: String,
    pub reblog_of_id: String,
    pub visibility: Visibility,
}

/// A favourite of a piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavouriteRecord {
    pub id: String,
    pub user_id: String,
    pub content_id: String,
    pub activity_id: Option<String>,
}

/// A signed outbound request, ready for the delivery queue.
#[derive(Debug, Clone)]
pub struct SignedDelivery {
    pub inbox: String,
    pub body: Bytes,
    pub headers: HeaderMap,
}

/// Looks up actors by `ActivityPub` id, fetching remote profiles when needed.
#[async_trait]
pub trait ActorResolver: Send + Sync {
    /// Stored actor, without any network access.
    async fn find(&self, activity_pub_id: &str) -> AppResult<Option<ActorRecord>>;

    /// Stored actor, fetched and upserted first when unknown or stale.
    async fn resolve(&self, activity_pub_id: &str) -> AppResult<Option<ActorRecord>>;

    /// Mark an actor as deleted by its local id.
    async fn mark_deleted(&self, id: &str) -> AppResult<()>;
}

/// Durable actor storage.
#[async_trait]
pub trait ActorStore: Send + Sync {
    async fn find_by_activity_pub_id(&self, activity_pub_id: &str)
    -> AppResult<Option<ActorRecord>>;

    /// Insert or refresh a remote actor, keyed by its `ActivityPub` id.
    async fn upsert_remote(&self, profile: RemoteProfile) -> AppResult<ActorRecord>;

    async fn mark_deleted(&self, id: &str) -> AppResult<()>;
}

/// Follow relationships between actors, by local id.
#[async_trait]
pub trait FollowGraph: Send + Sync {
    async fn find_edge(&self, source_id: &str, target_id: &str) -> AppResult<Option<FollowEdge>>;

    async fn find_edge_by_activity_id(&self, activity_id: &str) -> AppResult<Option<FollowEdge>>;

    async fn create_edge(
        &self,
        source_id: &str,
        target_id: &str,
        approved: bool,
        activity_id: Option<&str>,
    ) -> AppResult<FollowEdge>;

    async fn approve_edge(&self, edge_id: &str) -> AppResult<()>;

    async fn delete_edge(&self, edge_id: &str) -> AppResult<()>;

    /// Recompute and store the approved follower count.
    async fn recount_followers(&self, actor_id: &str) -> AppResult<u64>;

    /// Recompute and store the approved following count.
    async fn recount_following(&self, actor_id: &str) -> AppResult<u64>;

    /// Local ids of local actors with an approved edge to `actor_id`.
    async fn approved_local_followers(&self, actor_id: &str) -> AppResult<Vec<String>>;
}

/// Content, favourites, reblogs and timelines.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find_by_activity_pub_id(&self, activity_pub_id: &str)
    -> AppResult<Option<ContentRecord>>;

    /// Persist content with its attachments, hashtags and mentions atomically.
    async fn create_content(&self, content: NewContent) -> AppResult<ContentRecord>;

    async fn delete_content(&self, content_id: &str) -> AppResult<()>;

    /// Insert content into a user's home timeline. Inserting twice is a no-op.
    async fn add_to_timeline(&self, user_id: &str, content_id: &str) -> AppResult<()>;

    async fn find_favourite(
        &self,
        user_id: &str,
        content_id: &str,
    ) -> AppResult<Option<FavouriteRecord>>;

    async fn create_favourite(
        &self,
        user_id: &str,
        content_id: &str,
        activity_id: Option<&str>,
    ) -> AppResult<FavouriteRecord>;

    async fn delete_favourite(&self, favourite_id: &str) -> AppResult<()>;

    /// Recompute and store the favourite count.
    async fn recount_favourites(&self, content_id: &str) -> AppResult<u64>;

    /// Reblog by the id of its `Announce` activity.
    async fn find_reblog(&self, activity_pub_id: &str) -> AppResult<Option<ContentRecord>>;

    async fn create_reblog(&self, reblog: NewReblog) -> AppResult<ContentRecord>;
}

/// Downloads remote media.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn download(&self, url: &str, media_type: Option<&str>) -> AppResult<DownloadedMedia>;
}

/// Fetches remote `ActivityPub` documents.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch_actor(&self, url: &str) -> AppResult<PersonDto>;

    async fn fetch_note(&self, url: &str) -> AppResult<BaseObjectDto>;
}

/// Hands signed requests to the outbound job queue.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn enqueue(&self, delivery: SignedDelivery) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_visibility_from_audience() {
        let public = "https://www.w3.org/ns/activitystreams#Public";
        let followers = "https://a.example/users/alice/followers";

        assert_eq!(
            Visibility::from_audience(&ids(&[public]), &ids(&[followers]), None),
            Visibility::Public
        );
        assert_eq!(
            Visibility::from_audience(&ids(&[followers]), &ids(&["as:Public"]), None),
            Visibility::Unlisted
        );
        assert_eq!(
            Visibility::from_audience(&ids(&[followers]), &[], Some(followers)),
            Visibility::Followers
        );
        assert_eq!(
            Visibility::from_audience(&ids(&["https://b.example/users/bob"]), &[], None),
            Visibility::Direct
        );
    }

    #[test]
    fn test_local_actor_is_never_stale() {
        let now = Utc::now();
        let mut actor = ActorRecord {
            id: "1".to_string(),
            activity_pub_id: "https://v.example/actors/bob".to_string(),
            username: "bob".to_string(),
            is_local: true,
            public_key_pem: None,
            private_key_pem: None,
            inbox: None,
            shared_inbox: None,
            manually_approves_followers: false,
            is_deleted: false,
            updated_at: now - Duration::days(30),
        };

        assert!(!actor.is_stale(Duration::days(2), now));
        actor.is_local = false;
        assert!(actor.is_stale(Duration::days(2), now));
        assert_eq!(actor.key_id(), "https://v.example/actors/bob#main-key");
    }
}
