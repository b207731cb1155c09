//! In-memory collaborators.
//!
//! Used for development setups without a database and by the test suites.
//! Everything lives behind a single `RwLock`, so each call is atomic.

#![allow(missing_docs)]

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use vernissage_activitypub::{BaseObjectDto, PersonDto};
use vernissage_common::{AppError, AppResult, IdGenerator};

use crate::store::{
    ActorRecord, ActorStore, ContentRecord, ContentStore, DeliveryQueue, DownloadedMedia,
    FavouriteRecord, FollowEdge, FollowGraph, MediaFetcher, NewContent, NewReblog, RemoteFetcher,
    RemoteProfile, SignedDelivery,
};

#[derive(Default)]
struct State {
    actors: HashMap<String, ActorRecord>,
    edges: HashMap<String, FollowEdge>,
    follower_counts: HashMap<String, u64>,
    following_counts: HashMap<String, u64>,
    contents: HashMap<String, ContentRecord>,
    content_payloads: HashMap<String, NewContent>,
    favourites: HashMap<String, FavouriteRecord>,
    favourite_counts: HashMap<String, u64>,
    timelines: HashMap<String, Vec<String>>,
    media: HashMap<String, DownloadedMedia>,
    failing_timelines: HashSet<String>,
    failing_actor_lookups: HashSet<String>,
}

impl State {
    fn actor_by_ap_id(&self, activity_pub_id: &str) -> Option<&ActorRecord> {
        self.actors
            .values()
            .find(|actor| actor.activity_pub_id == activity_pub_id)
    }

    fn content_by_ap_id(&self, activity_pub_id: &str) -> Option<&ContentRecord> {
        self.contents
            .values()
            .find(|content| content.activity_pub_id == activity_pub_id)
    }
}

/// Actors, follows, content and media kept in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    id_gen: IdGenerator,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an actor as-is.
    pub async fn insert_actor(&self, actor: ActorRecord) {
        self.state
            .write()
            .await
            .actors
            .insert(actor.id.clone(), actor);
    }

    /// Insert a local actor with a fresh id.
    pub async fn insert_local_actor(
        &self,
        username: &str,
        activity_pub_id: &str,
        manually_approves_followers: bool,
    ) -> ActorRecord {
        let actor = ActorRecord {
            id: self.id_gen.generate(),
            activity_pub_id: activity_pub_id.to_string(),
            username: username.to_string(),
            is_local: true,
            public_key_pem: None,
            private_key_pem: None,
            inbox: Some(format!("{activity_pub_id}/inbox")),
            shared_inbox: None,
            manually_approves_followers,
            is_deleted: false,
            updated_at: Utc::now(),
        };
        self.insert_actor(actor.clone()).await;
        actor
    }

    /// Register media served by [`MediaFetcher::download`].
    pub async fn insert_media(&self, media: DownloadedMedia) {
        self.state
            .write()
            .await
            .media
            .insert(media.url.clone(), media);
    }

    /// Make timeline inserts for `user_id` fail.
    pub async fn fail_timeline_inserts(&self, user_id: &str) {
        self.state
            .write()
            .await
            .failing_timelines
            .insert(user_id.to_string());
    }

    /// Let timeline inserts for `user_id` succeed again.
    pub async fn restore_timeline_inserts(&self, user_id: &str) {
        self.state.write().await.failing_timelines.remove(user_id);
    }

    /// Make store lookups of the actor `activity_pub_id` fail.
    pub async fn fail_actor_lookups(&self, activity_pub_id: &str) {
        self.state
            .write()
            .await
            .failing_actor_lookups
            .insert(activity_pub_id.to_string());
    }

    pub async fn actor(&self, activity_pub_id: &str) -> Option<ActorRecord> {
        self.state.read().await.actor_by_ap_id(activity_pub_id).cloned()
    }

    pub async fn edges(&self) -> Vec<FollowEdge> {
        self.state.read().await.edges.values().cloned().collect()
    }

    pub async fn follower_count(&self, actor_id: &str) -> u64 {
        self.state
            .read()
            .await
            .follower_counts
            .get(actor_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn following_count(&self, actor_id: &str) -> u64 {
        self.state
            .read()
            .await
            .following_counts
            .get(actor_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn content(&self, activity_pub_id: &str) -> Option<ContentRecord> {
        self.state.read().await.content_by_ap_id(activity_pub_id).cloned()
    }

    /// Everything passed to [`ContentStore::create_content`] for the content.
    pub async fn content_payload(&self, activity_pub_id: &str) -> Option<NewContent> {
        self.state
            .read()
            .await
            .content_payloads
            .get(activity_pub_id)
            .cloned()
    }

    pub async fn content_count(&self) -> usize {
        self.state.read().await.contents.len()
    }

    pub async fn favourite_count(&self, content_id: &str) -> u64 {
        self.state
            .read()
            .await
            .favourite_counts
            .get(content_id)
            .copied()
            .unwrap_or_default()
    }

    /// Content ids on a user's home timeline, oldest first.
    pub async fn timeline(&self, user_id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .timelines
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActorStore for MemoryStore {
    async fn find_by_activity_pub_id(
        &self,
        activity_pub_id: &str,
    ) -> AppResult<Option<ActorRecord>> {
        let state = self.state.read().await;
        if state.failing_actor_lookups.contains(activity_pub_id) {
            return Err(AppError::Storage(format!(
                "Actor {activity_pub_id} is unavailable"
            )));
        }
        Ok(state.actor_by_ap_id(activity_pub_id).cloned())
    }

    async fn upsert_remote(&self, profile: RemoteProfile) -> AppResult<ActorRecord> {
        let mut state = self.state.write().await;
        let existing = state.actor_by_ap_id(&profile.activity_pub_id).cloned();
        if existing.as_ref().is_some_and(|actor| actor.is_local) {
            return Err(AppError::Conflict(format!(
                "{} is a local actor",
                profile.activity_pub_id
            )));
        }

        let actor = ActorRecord {
            id: existing.map_or_else(|| self.id_gen.generate(), |actor| actor.id),
            activity_pub_id: profile.activity_pub_id,
            username: profile.username,
            is_local: false,
            public_key_pem: profile.public_key_pem,
            private_key_pem: None,
            inbox: Some(profile.inbox),
            shared_inbox: profile.shared_inbox,
            manually_approves_followers: profile.manually_approves_followers,
            is_deleted: false,
            updated_at: Utc::now(),
        };
        state.actors.insert(actor.id.clone(), actor.clone());
        Ok(actor)
    }

    async fn mark_deleted(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        let actor = state
            .actors
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Actor {id}")))?;
        actor.is_deleted = true;
        Ok(())
    }
}

#[async_trait]
impl FollowGraph for MemoryStore {
    async fn find_edge(&self, source_id: &str, target_id: &str) -> AppResult<Option<FollowEdge>> {
        Ok(self
            .state
            .read()
            .await
            .edges
            .values()
            .find(|edge| edge.source_id == source_id && edge.target_id == target_id)
            .cloned())
    }

    async fn find_edge_by_activity_id(&self, activity_id: &str) -> AppResult<Option<FollowEdge>> {
        Ok(self
            .state
            .read()
            .await
            .edges
            .values()
            .find(|edge| edge.activity_id.as_deref() == Some(activity_id))
            .cloned())
    }

    async fn create_edge(
        &self,
        source_id: &str,
        target_id: &str,
        approved: bool,
        activity_id: Option<&str>,
    ) -> AppResult<FollowEdge> {
        let mut state = self.state.write().await;
        if state
            .edges
            .values()
            .any(|edge| edge.source_id == source_id && edge.target_id == target_id)
        {
            return Err(AppError::Conflict(format!(
                "{source_id} already follows {target_id}"
            )));
        }

        let edge = FollowEdge {
            id: self.id_gen.generate(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            approved,
            activity_id: activity_id.map(ToString::to_string),
        };
        state.edges.insert(edge.id.clone(), edge.clone());
        Ok(edge)
    }

    async fn approve_edge(&self, edge_id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        let edge = state
            .edges
            .get_mut(edge_id)
            .ok_or_else(|| AppError::NotFound(format!("Follow {edge_id}")))?;
        edge.approved = true;
        Ok(())
    }

    async fn delete_edge(&self, edge_id: &str) -> AppResult<()> {
        self.state.write().await.edges.remove(edge_id);
        Ok(())
    }

    async fn recount_followers(&self, actor_id: &str) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let count = state
            .edges
            .values()
            .filter(|edge| edge.approved && edge.target_id == actor_id)
            .count() as u64;
        state.follower_counts.insert(actor_id.to_string(), count);
        Ok(count)
    }

    async fn recount_following(&self, actor_id: &str) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let count = state
            .edges
            .values()
            .filter(|edge| edge.approved && edge.source_id == actor_id)
            .count() as u64;
        state.following_counts.insert(actor_id.to_string(), count);
        Ok(count)
    }

    async fn approved_local_followers(&self, actor_id: &str) -> AppResult<Vec<String>> {
        let state = self.state.read().await;
        let mut followers: Vec<String> = state
            .edges
            .values()
            .filter(|edge| edge.approved && edge.target_id == actor_id)
            .filter(|edge| {
                state
                    .actors
                    .get(&edge.source_id)
                    .is_some_and(|actor| actor.is_local)
            })
            .map(|edge| edge.source_id.clone())
            .collect();
        followers.sort();
        Ok(followers)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn find_by_activity_pub_id(
        &self,
        activity_pub_id: &str,
    ) -> AppResult<Option<ContentRecord>> {
        Ok(self.content(activity_pub_id).await)
    }

    async fn create_content(&self, content: NewContent) -> AppResult<ContentRecord> {
        let mut state = self.state.write().await;
        if state.content_by_ap_id(&content.activity_pub_id).is_some() {
            return Err(AppError::Conflict(format!(
                "Content {} already exists",
                content.activity_pub_id
            )));
        }

        let is_local = state
            .actors
            .get(&content.author_id)
            .is_some_and(|actor| actor.is_local);
        let record = ContentRecord {
            id: self.id_gen.generate(),
            activity_pub_id: content.activity_pub_id.clone(),
            author_id: content.author_id.clone(),
            is_local,
            visibility: content.visibility,
            reblog_of_id: None,
        };
        state.contents.insert(record.id.clone(), record.clone());
        state
            .content_payloads
            .insert(content.activity_pub_id.clone(), content);
        Ok(record)
    }

    async fn delete_content(&self, content_id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        if let Some(record) = state.contents.remove(content_id) {
            state.content_payloads.remove(&record.activity_pub_id);
        }
        state
            .favourites
            .retain(|_, favourite| favourite.content_id != content_id);
        state.favourite_counts.remove(content_id);
        for timeline in state.timelines.values_mut() {
            timeline.retain(|id| id != content_id);
        }
        Ok(())
    }

    async fn add_to_timeline(&self, user_id: &str, content_id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.failing_timelines.contains(user_id) {
            return Err(AppError::Storage(format!(
                "Timeline of {user_id} is unavailable"
            )));
        }

        let timeline = state.timelines.entry(user_id.to_string()).or_default();
        if !timeline.iter().any(|id| id == content_id) {
            timeline.push(content_id.to_string());
        }
        Ok(())
    }

    async fn find_favourite(
        &self,
        user_id: &str,
        content_id: &str,
    ) -> AppResult<Option<FavouriteRecord>> {
        Ok(self
            .state
            .read()
            .await
            .favourites
            .values()
            .find(|favourite| favourite.user_id == user_id && favourite.content_id == content_id)
            .cloned())
    }

    async fn create_favourite(
        &self,
        user_id: &str,
        content_id: &str,
        activity_id: Option<&str>,
    ) -> AppResult<FavouriteRecord> {
        let favourite = FavouriteRecord {
            id: self.id_gen.generate(),
            user_id: user_id.to_string(),
            content_id: content_id.to_string(),
            activity_id: activity_id.map(ToString::to_string),
        };
        self.state
            .write()
            .await
            .favourites
            .insert(favourite.id.clone(), favourite.clone());
        Ok(favourite)
    }

    async fn delete_favourite(&self, favourite_id: &str) -> AppResult<()> {
        self.state.write().await.favourites.remove(favourite_id);
        Ok(())
    }

    async fn recount_favourites(&self, content_id: &str) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let count = state
            .favourites
            .values()
            .filter(|favourite| favourite.content_id == content_id)
            .count() as u64;
        state
            .favourite_counts
            .insert(content_id.to_string(), count);
        Ok(count)
    }

    async fn find_reblog(&self, activity_pub_id: &str) -> AppResult<Option<ContentRecord>> {
        Ok(self
            .content(activity_pub_id)
            .await
            .filter(|record| record.reblog_of_id.is_some()))
    }

    async fn create_reblog(&self, reblog: NewReblog) -> AppResult<ContentRecord> {
        let mut state = self.state.write().await;
        if state.content_by_ap_id(&reblog.activity_pub_id).is_some() {
            return Err(AppError::Conflict(format!(
                "Reblog {} already exists",
                reblog.activity_pub_id
            )));
        }

        let is_local = state
            .actors
            .get(&reblog.author_id)
            .is_some_and(|actor| actor.is_local);
        let record = ContentRecord {
            id: self.id_gen.generate(),
            activity_pub_id: reblog.activity_pub_id,
            author_id: reblog.author_id,
            is_local,
            visibility: reblog.visibility,
            reblog_of_id: Some(reblog.reblog_of_id),
        };
        state.contents.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}

#[async_trait]
impl MediaFetcher for MemoryStore {
    async fn download(&self, url: &str, media_type: Option<&str>) -> AppResult<DownloadedMedia> {
        let media = self
            .state
            .read()
            .await
            .media
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Media {url}")))?;

        Ok(DownloadedMedia {
            media_type: media_type.map(ToString::to_string).or(media.media_type),
            ..media
        })
    }
}

/// Serves registered documents instead of fetching them over HTTP.
#[derive(Default)]
pub struct MemoryFetcher {
    actors: RwLock<HashMap<String, PersonDto>>,
    notes: RwLock<HashMap<String, BaseObjectDto>>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_actor(&self, person: PersonDto) {
        let url = person.id.clone();
        self.insert_actor_at(&url, person).await;
    }

    /// Serve `person` at `url`, whatever its own id says.
    pub async fn insert_actor_at(&self, url: &str, person: PersonDto) {
        self.actors.write().await.insert(url.to_string(), person);
    }

    pub async fn insert_note(&self, note: BaseObjectDto) {
        self.notes.write().await.insert(note.id.clone(), note);
    }

    /// Number of fetches attempted so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteFetcher for MemoryFetcher {
    async fn fetch_actor(&self, url: &str) -> AppResult<PersonDto> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.actors
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Actor {url}")))
    }

    async fn fetch_note(&self, url: &str) -> AppResult<BaseObjectDto> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.notes
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Note {url}")))
    }
}

/// Collects deliveries instead of sending them.
#[derive(Default)]
pub struct MemoryDeliveryQueue {
    deliveries: RwLock<Vec<SignedDelivery>>,
}

impl MemoryDeliveryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn deliveries(&self) -> Vec<SignedDelivery> {
        self.deliveries.read().await.clone()
    }
}

#[async_trait]
impl DeliveryQueue for MemoryDeliveryQueue {
    async fn enqueue(&self, delivery: SignedDelivery) -> AppResult<()> {
        self.deliveries.write().await.push(delivery);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::Visibility;

    fn new_content(activity_pub_id: &str, author_id: &str) -> NewContent {
        NewContent {
            activity_pub_id: activity_pub_id.to_string(),
            url: None,
            author_id: author_id.to_string(),
            body: Some("<p>hello</p>".to_string()),
            content_warning: None,
            sensitive: false,
            visibility: Visibility::Public,
            in_reply_to_id: None,
            attachments: Vec::new(),
            hashtags: Vec::new(),
            mention_ids: Vec::new(),
            published_at: None,
        }
    }

    #[tokio::test]
    async fn test_recount_only_counts_approved_edges() {
        let store = MemoryStore::new();
        store.create_edge("a", "b", true, None).await.unwrap();
        store.create_edge("c", "b", false, Some("https://c.example/follow/1")).await.unwrap();

        assert_eq!(store.recount_followers("b").await.unwrap(), 1);
        assert_eq!(store.recount_following("c").await.unwrap(), 0);
        assert!(store.create_edge("a", "b", true, None).await.is_err());

        let pending = store
            .find_edge_by_activity_id("https://c.example/follow/1")
            .await
            .unwrap()
            .unwrap();
        store.approve_edge(&pending.id).await.unwrap();
        assert_eq!(store.recount_followers("b").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_content_clears_timelines() {
        let store = MemoryStore::new();
        let record = store
            .create_content(new_content("https://a.example/notes/1", "author"))
            .await
            .unwrap();
        store.add_to_timeline("reader", &record.id).await.unwrap();
        store.add_to_timeline("reader", &record.id).await.unwrap();
        assert_eq!(store.timeline("reader").await, vec![record.id.clone()]);

        store.delete_content(&record.id).await.unwrap();
        assert!(store.timeline("reader").await.is_empty());
        assert!(store.content("https://a.example/notes/1").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_media_is_not_found() {
        let store = MemoryStore::new();
        let result = store.download("https://a.example/missing.jpg", None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
