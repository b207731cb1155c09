//! ID generation utilities.

use ulid::Ulid;
use uuid::Uuid;

/// ID generator for local records and outbound activity ids.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new lowercase ULID.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a time-ordered UUID v7, used as a fragment of activity ids.
    #[must_use]
    pub fn generate_uuid_v7(&self) -> String {
        Uuid::now_v7().to_string()
    }

    /// Build an outbound activity id below an actor, e.g.
    /// `https://example.com/actors/alice#follow/<uuid>`.
    #[must_use]
    pub fn activity_id(&self, actor_id: &str, kind: &str) -> String {
        format!("{actor_id}#{kind}/{}", self.generate_uuid_v7())
    }
}
