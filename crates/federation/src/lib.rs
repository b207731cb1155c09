//! `ActivityPub` federation core for vernissage-rs.
//!
//! This crate takes activities from remote instances and turns them into
//! local state:
//!
//! - **Verification**: draft-cavage HTTP signatures checked against the
//!   sending actor's public key ([`SignatureVerifier`])
//! - **Dispatch**: Follow, Undo, Accept, Reject, Delete, Like, Create and
//!   Announce applied through injected collaborators ([`ActivityDispatcher`])
//! - **Handlers**: axum inbox endpoints ([`inbox_router`])
//! - **Delivery**: signed outbound activities ([`ActivityDelivery`])
//!
//! Storage, media and the job queue stay outside; the traits in [`store`]
//! describe what the core needs from them.

pub mod client;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod memory;
pub mod resolver;
pub mod signature;
pub mod store;
pub mod verifier;

pub use client::{ApClient, ApClientError};
pub use delivery::ActivityDelivery;
pub use dispatcher::{ActivityDispatcher, DispatchSummary, DispatcherDeps};
pub use error::{DispatchError, SignatureVerificationError};
pub use handler::{InboxState, inbox_handler, inbox_router, user_inbox_handler};
pub use memory::{MemoryDeliveryQueue, MemoryFetcher, MemoryStore};
pub use resolver::RemoteActorResolver;
pub use signature::{HttpSigner, SignatureError, SignatureHeader};
pub use verifier::{SignatureVerifier, SignedRequest, VerifiedActor, VerifierSettings};
