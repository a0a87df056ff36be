//! bkt-guard Library
//!
//! Request authentication and authorization core for an S3-compatible
//! object storage gateway.
//!
//! # Features
//!
//! - **SigV4**: AWS Signature Version 4 verification with constant-time
//!   comparison and clock skew limits
//! - **Access Keys**: issuance, revocation, secrets encrypted at rest
//! - **Policies**: IAM-style documents, validated on write and evaluated
//!   deny-by-default
//!
//! # Example
//!
//! ```no_run
//! use bkt_guard::authz::InMemoryPolicyStore;
//! use bkt_guard::credentials::InMemoryCredentialStore;
//! use bkt_guard::{Config, Guard};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let guard = Guard::from_config(
//!         &config,
//!         Arc::new(InMemoryCredentialStore::new()),
//!         Arc::new(InMemoryPolicyStore::new()),
//!     )?;
//!     let _ = guard.issuer();
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod authz;
pub mod config;
pub mod credentials;
pub mod guard;
pub mod metrics;

// Re-export commonly used types
pub use config::Config;
pub use guard::{Guard, GuardError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
