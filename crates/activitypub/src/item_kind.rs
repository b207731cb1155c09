//! Reference-or-object values.

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{DeserializeOwned, Error as _},
};
use serde_json::Value;

/// Anything that carries an `ActivityPub` id.
pub trait Identified {
    /// The object's id (an IRI).
    fn id(&self) -> &str;
}

/// A property that peers send either as a bare id or as an inlined object.
///
/// Both shapes name the same logical entity; use [`ItemKind::resolve`] to get
/// at the id without caring which one arrived. A `T` that decodes from a bare
/// string itself, like [`crate::BaseActorDto`], always lands in
/// [`ItemKind::Object`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemKind<T> {
    /// A bare id.
    Reference(String),
    /// A fully inlined object.
    Object(T),
}

impl<T: Identified> ItemKind<T> {
    /// The id of the referenced entity.
    #[must_use]
    pub fn resolve(&self) -> &str {
        match self {
            Self::Reference(id) => id,
            Self::Object(object) => object.id(),
        }
    }
}

impl<T> ItemKind<T> {
    /// The inlined object, if one was sent.
    #[must_use]
    pub const fn object(&self) -> Option<&T> {
        match self {
            Self::Reference(_) => None,
            Self::Object(object) => Some(object),
        }
    }
}

impl<T: DeserializeOwned> ItemKind<T> {
    /// Decode from a JSON value.
    ///
    /// The object shape is attempted first; a bare string is only accepted
    /// when the object attempt failed because the input is a string.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match T::deserialize(&value) {
            Ok(object) => Ok(Self::Object(object)),
            Err(err) => match value {
                Value::String(id) => Ok(Self::Reference(id)),
                _ => Err(err),
            },
        }
    }
}

impl<T: Serialize> Serialize for ItemKind<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Reference(id) => serializer.serialize_str(id),
            Self::Object(object) => object.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ItemKind<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}
