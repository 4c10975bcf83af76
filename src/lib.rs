//! # Latchgate (second-factor latch gateway)
//!
//! `latchgate` sits between a primary login backend and a remote push-approval
//! service (the "latch" oracle). Once a user has authenticated with their primary
//! factor, the gateway decides whether the login may proceed by consulting the
//! user's latch binding and the live status of the paired account.
//!
//! ## Components
//!
//! - **Access store** ([`latch::AccessStore`]): the single set of application
//!   credentials used to build an oracle client. Clients are never cached; every
//!   operation builds a fresh one from the stored credentials.
//! - **Binding registry** ([`latch::BindingRegistry`]): per-user mapping from a
//!   case-normalized username to the remote account id returned by pairing.
//! - **Challenge evaluator** ([`latch::ChallengeEvaluator`]): the login-time
//!   decision.
//!
//! ## Enforcement Policy
//!
//! Latch enforcement is opt-in per user. A user without a binding always passes
//! through, even when the gateway has no credentials configured. Once a binding
//! exists, every failure (missing credentials, unreachable oracle, timeout,
//! switch off) denies the login.
//!
//! ## Partial Failures
//!
//! Pairing and unpairing change remote state first and local state second. The
//! store offers no cross-key transactions, so a local failure after a remote
//! success is reported as [`latch::LatchError::Inconsistency`] and never hidden.

pub mod api;
pub mod cli;
pub mod latch;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
