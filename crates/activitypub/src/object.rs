//! Object references and content objects.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BaseActorDto, ComplexType, Identified, ItemKind, ObjectType, PUBLIC_COLLECTION};

/// An object as it appears in an activity's `object` property.
///
/// Carries enough payload to describe a Note (for `Create`) or a nested
/// activity (for `Undo`, `Accept`, `Reject`). Identity is `(id, type)` only;
/// every other field is payload.
#[allow(missing_docs)]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseObjectDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ComplexType<ItemKind<BaseActorDto>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<ComplexType<ItemKind<BaseActorDto>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ComplexType<ItemKind<BaseActorDto>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<ComplexType<ItemKind<BaseActorDto>>>,
    /// Nested object; for an embedded `Follow` this is the followed actor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Box<ComplexType<ItemKind<BaseObjectDto>>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Content warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<ComplexType<MediaAttachmentDto>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<ComplexType<TagDto>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    /// Human-facing page; peers send a string, a `Link` or a list of either.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,
}

impl BaseObjectDto {
    /// An object with only an id and a type.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ObjectType) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            actor: None,
            attributed_to: None,
            to: None,
            cc: None,
            object: None,
            content: None,
            summary: None,
            sensitive: None,
            attachment: None,
            tag: None,
            in_reply_to: None,
            published: None,
            url: None,
        }
    }

    /// Stand-in for an object that was sent as a bare id.
    #[must_use]
    pub fn reference(id: impl Into<String>) -> Self {
        Self::new(id, ObjectType::Reference)
    }

    /// An embedded `Follow` of `target_id` by `actor_id`, as used inside
    /// `Undo`, `Accept` and `Reject`.
    #[must_use]
    pub fn follow(id: impl Into<String>, actor_id: &str, target_id: &str) -> Self {
        let mut follow = Self::new(id, ObjectType::Follow);
        follow.actor = Some(ComplexType::One(ItemKind::Reference(actor_id.to_string())));
        follow.object = Some(Box::new(ComplexType::One(ItemKind::Reference(
            target_id.to_string(),
        ))));
        follow
    }

    /// Ids of the nested activity's actors, in wire order.
    #[must_use]
    pub fn actor_ids(&self) -> Vec<String> {
        self.actor
            .as_ref()
            .map(ComplexType::actor_ids)
            .unwrap_or_default()
    }

    /// The nested activity's objects, in wire order.
    #[must_use]
    pub fn objects(&self) -> Vec<Self> {
        self.object
            .as_deref()
            .map(ComplexType::objects)
            .unwrap_or_default()
    }

    /// Ids of the authors, falling back to `actor` for peers that omit
    /// `attributedTo`.
    #[must_use]
    pub fn attributed_to_ids(&self) -> Vec<String> {
        match &self.attributed_to {
            Some(attributed_to) => attributed_to.actor_ids(),
            None => self.actor_ids(),
        }
    }

    /// Ids in `to`.
    #[must_use]
    pub fn to_ids(&self) -> Vec<String> {
        self.to.as_ref().map(ComplexType::actor_ids).unwrap_or_default()
    }

    /// Ids in `cc`.
    #[must_use]
    pub fn cc_ids(&self) -> Vec<String> {
        self.cc.as_ref().map(ComplexType::actor_ids).unwrap_or_default()
    }

    /// Whether `to` or `cc` contains the public collection.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.to_ids()
            .iter()
            .chain(self.cc_ids().iter())
            .any(|id| is_public_collection(id))
    }

    /// Attachments in wire order.
    #[must_use]
    pub fn attachments(&self) -> Vec<&MediaAttachmentDto> {
        self.attachment
            .as_ref()
            .map(ComplexType::values)
            .unwrap_or_default()
    }

    /// Tags in wire order.
    #[must_use]
    pub fn tags(&self) -> Vec<&TagDto> {
        self.tag.as_ref().map(ComplexType::values).unwrap_or_default()
    }

    /// First plain-string `url`, if any.
    #[must_use]
    pub fn page_url(&self) -> Option<&str> {
        match self.url.as_ref()? {
            Value::String(url) => Some(url),
            Value::Array(urls) => urls.iter().find_map(Value::as_str),
            Value::Object(link) => link.get("href").and_then(Value::as_str),
            _ => None,
        }
    }

    /// `published`, if present and parseable as RFC 3339.
    #[must_use]
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published
            .as_deref()
            .and_then(|published| DateTime::parse_from_rfc3339(published).ok())
            .map(|published| published.with_timezone(&Utc))
    }
}

/// Whether an audience id designates the public collection, in any of the
/// spellings peers use.
#[must_use]
pub fn is_public_collection(id: &str) -> bool {
    id == PUBLIC_COLLECTION || id == "as:Public" || id == "Public"
}

impl PartialEq for BaseObjectDto {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind
    }
}

impl Eq for BaseObjectDto {}

impl Hash for BaseObjectDto {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.kind.hash(state);
    }
}

impl Identified for BaseObjectDto {
    fn id(&self) -> &str {
        &self.id
    }
}

impl ComplexType<ItemKind<BaseObjectDto>> {
    /// Every referenced object in wire order; bare references become
    /// [`ObjectType::Reference`] stand-ins.
    #[must_use]
    pub fn objects(&self) -> Vec<BaseObjectDto> {
        self.values()
            .into_iter()
            .map(|item| match item {
                ItemKind::Reference(id) => BaseObjectDto::reference(id.clone()),
                ItemKind::Object(object) => object.clone(),
            })
            .collect()
    }

    /// Ids of every referenced object in wire order.
    #[must_use]
    pub fn object_ids(&self) -> Vec<String> {
        self.values()
            .into_iter()
            .map(|item| item.resolve().to_string())
            .collect()
    }
}

/// Media attachment (`Image`, `Document`, ...).
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAttachmentDto {
    #[serde(rename = "type")]
    pub kind: ObjectType,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Alt text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blurhash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Identified for MediaAttachmentDto {
    fn id(&self) -> &str {
        &self.url
    }
}

/// Tag attached to content (`Hashtag`, `Mention`, `Emoji`).
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDto {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}
