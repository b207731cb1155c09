//! Closed sets of activity and object types.
//!
//! Types outside the handled vocabulary are kept verbatim in an `Unknown`
//! variant so that they survive a decode/encode round trip and can be logged.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $(
                #[allow(missing_docs)]
                $variant,
            )+
            /// A type outside the handled vocabulary.
            Unknown(String),
        }

        impl $name {
            /// The wire name of this type.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Unknown(other) => other,
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                match value.as_str() {
                    $($text => Self::$variant,)+
                    _ => Self::Unknown(value),
                }
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::from(value.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Unknown(other) => other,
                    known => known.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Activity types handled by the inbox.
    ActivityType {
        Follow => "Follow",
        Undo => "Undo",
        Accept => "Accept",
        Reject => "Reject",
        Delete => "Delete",
        Like => "Like",
        Create => "Create",
        Announce => "Announce",
        Update => "Update",
    }
}

string_enum! {
    /// Object types that may appear in an activity's `object` or `type`.
    ///
    /// `Reference` never appears on the wire; it marks a stand-in object built
    /// from a bare id so that callers can branch on the type uniformly.
    ObjectType {
        Note => "Note",
        Article => "Article",
        Question => "Question",
        Image => "Image",
        Document => "Document",
        Tombstone => "Tombstone",
        Person => "Person",
        Service => "Service",
        Application => "Application",
        Group => "Group",
        Organization => "Organization",
        Follow => "Follow",
        Undo => "Undo",
        Accept => "Accept",
        Reject => "Reject",
        Delete => "Delete",
        Like => "Like",
        Create => "Create",
        Announce => "Announce",
        Update => "Update",
        Reference => "Reference",
    }
}

impl ObjectType {
    /// Whether this type describes an actor.
    #[must_use]
    pub const fn is_actor(&self) -> bool {
        matches!(
            self,
            Self::Person | Self::Service | Self::Application | Self::Group | Self::Organization
        )
    }

    /// Whether this type describes postable content.
    #[must_use]
    pub const fn is_content(&self) -> bool {
        matches!(self, Self::Note | Self::Article | Self::Question)
    }
}
