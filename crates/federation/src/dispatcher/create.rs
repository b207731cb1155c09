//! Create activity handling and note ingestion.

use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use tracing::{debug, info, warn};
use vernissage_activitypub::{ActivityDto, BaseObjectDto, ObjectType};
use vernissage_common::{AppError, AppResult};

use super::{ActivityDispatcher, DispatchSummary, Outcome, run_units};
use crate::{
    error::DispatchError,
    store::{ActorRecord, ContentRecord, NewAttachment, NewContent, Visibility},
};

#[allow(clippy::expect_used)]
static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid HTML tag pattern"));

/// Tags that end a line or a paragraph.
#[allow(clippy::expect_used)]
static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*/?\s*(?:p|br|div|li|ul|ol|pre|blockquote|h[1-6])\b[^>]*>")
        .expect("valid block tag pattern")
});

#[allow(clippy::expect_used)]
static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w&/])#(\w+)").expect("valid hashtag pattern")
});

/// Result of ingesting a note.
#[derive(Debug)]
pub(super) enum Ingested {
    /// Newly stored.
    Created(ContentRecord),
    /// Stored earlier.
    Existing(ContentRecord),
    /// Not stored: foreign author, unknown author or unsupported type.
    Refused,
}

/// Whether an object type is stored as content.
const fn is_content_type(kind: &ObjectType) -> bool {
    matches!(kind, ObjectType::Note | ObjectType::Article | ObjectType::Question)
}

impl ActivityDispatcher {
    /// Store new remote content and put it on timelines.
    pub(super) async fn create(&self, activity: &ActivityDto) -> Result<DispatchSummary, DispatchError> {
        let senders = activity.actor_ids();
        let objects = activity.objects();
        let units = objects
            .iter()
            .map(|object| self.create_object(&senders, object))
            .collect();

        run_units("Create", units).await
    }

    async fn create_object(&self, senders: &[String], object: &BaseObjectDto) -> AppResult<Outcome> {
        let note = match &object.kind {
            kind if is_content_type(kind) => object.clone(),
            ObjectType::Reference => match self.fetch_remote_note(&object.id).await? {
                Some(note) => note,
                None => return Ok(Outcome::Skipped),
            },
            other => {
                info!(object = %object.id, object_type = %other, "Unsupported Create object type");
                return Ok(Outcome::Skipped);
            }
        };

        match self.ingest_note(&note, Some(senders)).await? {
            Ingested::Created(_) => Ok(Outcome::Applied),
            Ingested::Existing(_) | Ingested::Refused => Ok(Outcome::Skipped),
        }
    }

    /// Fetch a note by id. `None` when it is gone or not content.
    pub(super) async fn fetch_remote_note(&self, id: &str) -> AppResult<Option<BaseObjectDto>> {
        let note = match self.fetcher.fetch_note(id).await {
            Ok(note) => note,
            Err(AppError::NotFound(reason)) => {
                debug!(object = %id, reason = %reason, "Remote note is gone");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if note.id != id {
            warn!(object = %id, fetched = %note.id, "Fetched note id does not match, skipping");
            return Ok(None);
        }
        if !is_content_type(&note.kind) {
            info!(object = %id, object_type = %note.kind, "Fetched object is not content");
            return Ok(None);
        }
        Ok(Some(note))
    }

    /// Store `note` unless it is already known.
    ///
    /// With `expected_authors`, the note is refused unless it is attributed
    /// to one of them. Known content is put on timelines again, so a
    /// redelivery fills the timelines an earlier attempt missed.
    pub(super) async fn ingest_note(
        &self,
        note: &BaseObjectDto,
        expected_authors: Option<&[String]>,
    ) -> AppResult<Ingested> {
        let Some(author_id) = note.attributed_to_ids().into_iter().next() else {
            warn!(object = %note.id, "Content without an author, skipping");
            return Ok(Ingested::Refused);
        };
        if let Some(expected) = expected_authors {
            if !expected.contains(&author_id) {
                warn!(object = %note.id, author = %author_id, "Content attributed to another actor, skipping");
                return Ok(Ingested::Refused);
            }
        }

        if let Some(existing) = self.content.find_by_activity_pub_id(&note.id).await? {
            debug!(object = %note.id, "Content already stored");
            self.refill_timelines(note, &author_id, &existing).await?;
            return Ok(Ingested::Existing(existing));
        }

        let Some(author) = self.actors.resolve(&author_id).await? else {
            warn!(object = %note.id, author = %author_id, "Content author cannot be resolved, skipping");
            return Ok(Ingested::Refused);
        };

        let (to, cc) = (note.to_ids(), note.cc_ids());
        let visibility = Visibility::from_audience(&to, &cc, None);
        let mention_ids = self.local_mentions(note).await?;
        let new_content = NewContent {
            activity_pub_id: note.id.clone(),
            url: note.page_url().map(ToString::to_string),
            author_id: author.id.clone(),
            body: note.content.clone(),
            content_warning: note.summary.clone().filter(|summary| !summary.is_empty()),
            sensitive: note.sensitive.unwrap_or(false),
            visibility,
            in_reply_to_id: note.in_reply_to.clone(),
            attachments: self.download_attachments(note).await?,
            hashtags: hashtags(note),
            mention_ids,
            published_at: note.published_at(),
        };

        let mentioned = new_content.mention_ids.clone();
        let record = self.content.create_content(new_content).await?;
        info!(
            object = %note.id,
            author = %author_id,
            visibility = ?visibility,
            "Content stored"
        );

        self.fan_out(&author, &record, &mentioned).await?;
        Ok(Ingested::Created(record))
    }

    /// Repeat the fan-out of stored content. Timeline inserts are idempotent.
    async fn refill_timelines(
        &self,
        note: &BaseObjectDto,
        author_id: &str,
        existing: &ContentRecord,
    ) -> AppResult<()> {
        let Some(author) = self.actors.find(author_id).await? else {
            return Ok(());
        };
        if author.id != existing.author_id {
            warn!(object = %note.id, author = %author_id, "Stored content has another author, skipping");
            return Ok(());
        }

        let mentioned = self.local_mentions(note).await?;
        self.fan_out(&author, existing, &mentioned).await
    }

    async fn download_attachments(&self, note: &BaseObjectDto) -> AppResult<Vec<NewAttachment>> {
        let mut attachments = Vec::new();
        for attachment in note.attachments() {
            let media = match self
                .media
                .download(&attachment.url, attachment.media_type.as_deref())
                .await
            {
                Ok(media) => media,
                Err(AppError::NotFound(reason)) => {
                    warn!(url = %attachment.url, reason = %reason, "Attachment is gone, skipping it");
                    continue;
                }
                Err(e) => return Err(e),
            };

            attachments.push(NewAttachment {
                media,
                description: attachment.name.clone(),
                blurhash: attachment.blurhash.clone(),
                width: attachment.width,
                height: attachment.height,
            });
        }
        Ok(attachments)
    }

    /// Local ids of mentioned local actors.
    async fn local_mentions(&self, note: &BaseObjectDto) -> AppResult<Vec<String>> {
        let mut mention_ids: Vec<String> = Vec::new();
        for tag in note.tags() {
            if tag.kind != "Mention" {
                continue;
            }
            let Some(href) = tag.href.as_deref() else {
                continue;
            };
            if let Some(actor) = self.actors.find(href).await? {
                if actor.is_local && !mention_ids.contains(&actor.id) {
                    mention_ids.push(actor.id);
                }
            }
        }
        Ok(mention_ids)
    }

    /// Insert stored content into every timeline that should show it.
    pub(super) async fn fan_out(
        &self,
        author: &ActorRecord,
        record: &ContentRecord,
        mentioned: &[String],
    ) -> AppResult<()> {
        if record.visibility.reaches_followers() {
            self.fan_out_to_followers(record, author).await
        } else {
            self.fan_out_to_mentioned(record, author, mentioned).await
        }
    }

    /// Approved local followers of `author`.
    async fn fan_out_to_followers(
        &self,
        record: &ContentRecord,
        author: &ActorRecord,
    ) -> AppResult<()> {
        let followers = self.graph.approved_local_followers(&author.id).await?;
        self.insert_into_timelines(record, author, followers).await
    }

    /// Only the mentioned local users.
    async fn fan_out_to_mentioned(
        &self,
        record: &ContentRecord,
        author: &ActorRecord,
        users: &[String],
    ) -> AppResult<()> {
        self.insert_into_timelines(record, author, users.to_vec()).await
    }

    /// One independent insert per user. A local author always sees their own
    /// content.
    async fn insert_into_timelines(
        &self,
        record: &ContentRecord,
        author: &ActorRecord,
        mut recipients: Vec<String>,
    ) -> AppResult<()> {
        if author.is_local {
            recipients.push(author.id.clone());
        }
        recipients.sort();
        recipients.dedup();

        let results = join_all(
            recipients
                .iter()
                .map(|user_id| self.content.add_to_timeline(user_id, &record.id)),
        )
        .await;

        let mut first_error = None;
        for (user_id, result) in recipients.iter().zip(results) {
            if let Err(e) = result {
                warn!(user = %user_id, content = %record.id, error = %e, "Timeline insert failed");
                first_error.get_or_insert(e);
            }
        }

        debug!(content = %record.id, recipients = recipients.len(), "Fanned out to timelines");
        first_error.map_or(Ok(()), Err)
    }
}

/// Visible text of an HTML body.
/// Block tags become spaces, inline tags vanish so `#<span>tag</span>` stays
/// one word.
fn strip_html(html: &str) -> String {
    let spaced = BLOCK_TAG_RE.replace_all(html, " ");
    HTML_TAG_RE.replace_all(&spaced, "").into_owned()
}

/// Hashtags from `Hashtag` tags and from the body text, lowercased, without
/// the leading `#`, first occurrence first.
fn hashtags(note: &BaseObjectDto) -> Vec<String> {
    let from_tags = note
        .tags()
        .into_iter()
        .filter(|tag| tag.kind == "Hashtag")
        .filter_map(|tag| tag.name.as_deref())
        .map(|name| name.trim_start_matches('#').to_lowercase());

    let text = note.content.as_deref().map(strip_html).unwrap_or_default();
    let from_body = HASHTAG_RE
        .captures_iter(&text)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str().to_lowercase())
        .collect::<Vec<_>>();

    let mut tags: Vec<String> = Vec::new();
    for tag in from_tags.chain(from_body) {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use vernissage_activitypub::{ComplexType, TagDto};

    use super::*;

    #[test]
    fn test_hashtags_merge_tags_and_body() {
        let mut note = BaseObjectDto::new("https://a.example/notes/1", ObjectType::Note);
        note.content = Some(
            "<p>Golden hour <a href=\"https://a.example/tags/Street\">#<span>Street</span></a> #photography and #Film</p>"
                .to_string(),
        );
        note.tag = Some(ComplexType::Many(vec![
            TagDto {
                kind: "Hashtag".to_string(),
                name: Some("#Photography".to_string()),
                href: None,
            },
            TagDto {
                kind: "Mention".to_string(),
                name: Some("@bob".to_string()),
                href: Some("https://v.example/actors/bob".to_string()),
            },
        ]));

        assert_eq!(hashtags(&note), vec!["photography", "street", "film"]);
    }

    #[test]
    fn test_hashtags_ignore_anchors_and_entities() {
        let mut note = BaseObjectDto::new("https://a.example/notes/2", ObjectType::Note);
        note.content = Some("see https://a.example/page#section &#39; ok #Night".to_string());

        assert_eq!(hashtags(&note), vec!["night"]);
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>a<br/>b</p>").trim(), "a b");
        assert_eq!(strip_html("<p>x</p><P>y</P>").trim(), "x  y");
        assert_eq!(strip_html("<a href=\"u\">#<span>Tag</span></a>"), "#Tag");
    }
}
