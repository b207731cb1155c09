//! One-or-many values.

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{DeserializeOwned, Error as _},
};
use serde_json::Value;

/// A property that peers may send either as a single value or as an array.
///
/// `One(x)` and `Many(vec![x])` are different values: the shape received on
/// the wire is preserved so that re-encoding produces the same JSON.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComplexType<T> {
    /// A bare value.
    One(T),
    /// An array of values, possibly empty.
    Many(Vec<T>),
}

impl<T> ComplexType<T> {
    /// All values in wire order, regardless of shape.
    #[must_use]
    pub fn values(&self) -> Vec<&T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values.iter().collect(),
        }
    }

    /// Consume the variant into its values in wire order.
    #[must_use]
    pub fn into_values(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }

    /// Number of values carried.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(values) => values.len(),
        }
    }

    /// Whether this is an empty array.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: DeserializeOwned> ComplexType<T> {
    /// Decode from a JSON value.
    ///
    /// The array shape is attempted first. The single shape is only attempted
    /// when the array attempt failed because the input is not an array at all;
    /// an array whose elements are malformed is an error.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match Vec::<T>::deserialize(&value) {
            Ok(values) => Ok(Self::Many(values)),
            Err(_) if !value.is_array() => T::deserialize(value).map(Self::One),
            Err(err) => Err(err),
        }
    }

    /// Decode from JSON bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }
}

impl<T: Serialize> ComplexType<T> {
    /// Encode to JSON bytes: a bare value for `One`, an array for `Many`.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T> From<T> for ComplexType<T> {
    fn from(value: T) -> Self {
        Self::One(value)
    }
}

impl<T> From<Vec<T>> for ComplexType<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Many(values)
    }
}

impl<T: Serialize> Serialize for ComplexType<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::One(value) => value.serialize(serializer),
            Self::Many(values) => values.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ComplexType<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}
