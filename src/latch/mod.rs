//! Latch pairing lifecycle and login-time challenge evaluation.
//!
//! Flow Overview:
//! 1) An administrator stores the application credentials ([`AccessStore::set_access`]).
//! 2) A user is enrolled by exchanging a one-time pairing token with the oracle
//!    ([`BindingRegistry::enroll`]); the returned account id is bound to the
//!    lower-cased username.
//! 3) On every login the evaluator looks the user up and, if bound, asks the
//!    oracle whether the latch is open ([`ChallengeEvaluator::evaluate`]).
//! 4) Unenrollment unpairs remotely first, then deletes the local binding
//!    ([`BindingRegistry::unenroll`]).
//!
//! Storage layout:
//! - `latch/access`: the credentials singleton.
//! - `latchuser/<username>`: one binding per lower-cased username.

mod access;
mod challenge;
mod error;
pub mod http;
mod locks;
mod oracle;
mod postgres;
mod storage;
mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use access::{AccessCredentials, AccessStore, ACCESS_ENDPOINT, ACCESS_KEY};
pub use challenge::{ChallengeEvaluator, Verdict, SWITCH_OFF_REASON};
pub use error::{ConfigurationError, InconsistencyStage, LatchError};
pub use http::HttpConnector;
pub use locks::UserLocks;
pub use oracle::{Oracle, OracleClient, OracleConnector, OracleError, DEFAULT_ORACLE_TIMEOUT};
pub use postgres::PgStorage;
pub use storage::{MemoryStorage, Storage, StorageEntry};
pub use users::{normalize_username, BindingRegistry, UnenrollOutcome, UserBinding, USER_KEY_PREFIX};
