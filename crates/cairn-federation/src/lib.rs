//! Federation between Cairn instances.
//!
//! Instances share a passphrase. Every token is derived from it, so
//! tokens need no storage and a new passphrase revokes all of them:
//!
//! - [`FederationToken::All`] grants repositories, users, teams,
//!   settings and scripts
//! - [`FederationToken::UsersAndRepositories`] grants repositories,
//!   users and teams
//! - [`FederationToken::Repositories`] and named federation sets grant
//!   repositories only
//!
//! [`Federation`] validates requests against that hierarchy, lists the
//! repositories a token exposes, keeps proposals from peers on disk and
//! records the pull results peers report. [`FederationPuller`] pulls
//! from the peers this instance is registered with.
//!
//! # Example
//!
//! ```rust
//! use cairn_federation::{FederationRequest, FederationToken};
//!
//! let token = cairn_federation::derive_token("secret", FederationToken::All.name());
//! assert_eq!(token.len(), 40);
//! assert_eq!(
//!     FederationRequest::from_name("pull_users"),
//!     Some(FederationRequest::PullUsers)
//! );
//! ```

mod client;
mod error;
mod federation;
mod model;
mod notify;
mod proposals;
mod puller;
mod request;
mod settings;
mod token;

pub use client::{FederationClient, HttpFederationClient};
pub use error::{FederationError, Result};
pub use federation::{Federation, GIT_PATH};
pub use model::{
    wildcard_matches, FederationModel, FederationProposal, FederationPullStatus, FederationSet,
};
pub use notify::{LogNotifier, MemoryNotifier, NotificationSink};
pub use proposals::{ProposalStore, PROPOSAL_EXT};
pub use puller::{FederationPuller, PullReport};
pub use request::FederationRequest;
pub use settings::{frequency_minutes, FederationSettings, RegistrationSettings};
pub use token::{derive_token, FederationToken};
