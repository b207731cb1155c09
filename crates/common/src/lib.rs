//! Common utilities and shared types for vernissage-rs.
//!
//! This crate provides foundational components used across all vernissage-rs crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Cryptography**: RSA key generation for `ActivityPub` signatures
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use vernissage_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     println!("{} -> {}", config.server.url, id_gen.generate());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod id;

pub use config::{Config, FederationConfig, ServerConfig};
pub use crypto::{RsaKeypair, generate_rsa_keypair};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
