//! Actor references and actor documents.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::Value;

use crate::{ComplexType, Identified, ItemKind, MediaAttachmentDto, ObjectType};

/// A reference to an actor as it appears in `actor`, `to`, `cc` and
/// `attributedTo`.
///
/// Encodes as a bare id string whenever neither `type` nor `name` is known,
/// and as an object otherwise. Both shapes are accepted when decoding, so
/// inside an [`ItemKind`] a decoded actor is always [`ItemKind::Object`];
/// [`ItemKind::Reference`] only appears for actors built in code. Read actor
/// ids through [`ItemKind::resolve`] and `actor_ids`, never by matching on
/// the variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseActorDto {
    /// Actor id.
    pub id: String,
    /// Actor type (`Person`, `Service`, ...).
    pub kind: Option<ObjectType>,
    /// Display name.
    pub name: Option<String>,
}

impl BaseActorDto {
    /// A bare actor reference.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: None,
            name: None,
        }
    }
}

impl Identified for BaseActorDto {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Serialize, Deserialize)]
struct BaseActorObject {
    id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<ObjectType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Serialize for BaseActorDto {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.kind.is_none() && self.name.is_none() {
            return serializer.serialize_str(&self.id);
        }

        BaseActorObject {
            id: self.id.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BaseActorDto {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(id) => Ok(Self::new(id)),
            value @ Value::Object(_) => {
                let object = BaseActorObject::deserialize(value).map_err(D::Error::custom)?;
                Ok(Self {
                    id: object.id,
                    kind: object.kind,
                    name: object.name,
                })
            }
            other => Err(D::Error::custom(format!(
                "expected an actor id or actor object, found {other}"
            ))),
        }
    }
}

impl ComplexType<ItemKind<BaseActorDto>> {
    /// Ids of every referenced actor, in wire order.
    #[must_use]
    pub fn actor_ids(&self) -> Vec<String> {
        self.values()
            .into_iter()
            .map(|item| item.resolve().to_string())
            .collect()
    }
}

/// Public key block of an actor document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyDto {
    /// Key id, conventionally `<actor>#main-key`.
    pub id: String,
    /// Owning actor id.
    pub owner: String,
    /// SPKI PEM public key.
    pub public_key_pem: String,
}

/// `endpoints` block of an actor document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointsDto {
    /// Instance-wide shared inbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_inbox: Option<String>,
}

/// Actor document as served by a remote instance.
#[allow(missing_docs)]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDto {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ComplexType<Value>>,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ObjectType,
    pub preferred_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub inbox: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<EndpointsDto>,
    /// Legacy location of the shared inbox used by a few implementations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_inbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manually_approves_followers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKeyDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<ItemKind<MediaAttachmentDto>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ItemKind<MediaAttachmentDto>>,
}

impl PersonDto {
    /// Shared inbox, preferring `endpoints.sharedInbox`.
    #[must_use]
    pub fn shared_inbox(&self) -> Option<&str> {
        self.endpoints
            .as_ref()
            .and_then(|endpoints| endpoints.shared_inbox.as_deref())
            .or(self.shared_inbox.as_deref())
    }

    /// Avatar URL, whichever shape `icon` arrived in.
    #[must_use]
    pub fn icon_url(&self) -> Option<&str> {
        self.icon.as_ref().map(ItemKind::resolve)
    }

    /// Public key PEM, if the document publishes one.
    #[must_use]
    pub fn public_key_pem(&self) -> Option<&str> {
        self.public_key
            .as_ref()
            .map(|key| key.public_key_pem.as_str())
    }
}

impl Identified for PersonDto {
    fn id(&self) -> &str {
        &self.id
    }
}
