//! `ActivityPub` wire vocabulary for vernissage-rs.
//!
//! Peers are free to send most properties either as a single value or as an
//! array, and either as a bare id or as an inlined object. This crate models
//! those shapes explicitly:
//!
//! - [`ComplexType`]: one value or an ordered list of values
//! - [`ItemKind`]: a bare reference or a fully inlined object
//! - [`BaseActorDto`], [`BaseObjectDto`], [`ActivityDto`]: the envelopes built
//!   from the two primitives
//! - [`PersonDto`]: actor documents fetched from remote instances
//!
//! All types are immutable values: decode them from wire bytes, read them,
//! and build new ones for outbound payloads.

mod activity;
mod actor;
mod complex_type;
mod item_kind;
mod kinds;
mod object;

pub use activity::{
    ACTIVITY_STREAMS_CONTEXT, ActivityDto, ContextDto, PUBLIC_COLLECTION, SECURITY_CONTEXT,
};
pub use actor::{BaseActorDto, EndpointsDto, PersonDto, PublicKeyDto};
pub use complex_type::ComplexType;
pub use item_kind::{Identified, ItemKind};
pub use kinds::{ActivityType, ObjectType};
pub use object::{BaseObjectDto, MediaAttachmentDto, TagDto, is_public_collection};
