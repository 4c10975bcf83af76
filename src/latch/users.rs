//! User binding registry.
//!
//! A binding maps a lower-cased username to the account id the oracle returned
//! when the user paired. Having a binding is what turns latch enforcement on for
//! that user.
//!
//! Pairing and unpairing touch the oracle first and local storage second:
//! - enroll: `pair(token)` then write; a failed write after a successful pair is
//!   an [`InconsistencyStage::PairedNotStored`] error.
//! - unenroll: `unpair(account)` then delete; a failed unpair keeps the binding,
//!   a failed delete is an [`InconsistencyStage::UnpairedNotDeleted`] error.
//!   [`BindingRegistry::forget`] removes the stale binding without calling the
//!   oracle again.

use super::{
    access::AccessStore,
    error::{InconsistencyStage, LatchError},
    locks::UserLocks,
    storage::{Storage, StorageEntry},
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const USER_KEY_PREFIX: &str = "latchuser/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBinding {
    #[serde(default)]
    pub username: String,
    #[serde(alias = "Account")]
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnenrollOutcome {
    /// The account was unpaired and the binding removed.
    Unpaired { account_id: String },
    /// No binding existed; nothing was done.
    NotEnrolled,
}

/// Usernames are case-insensitive identities.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.to_lowercase()
}

fn user_key(normalized: &str) -> String {
    format!("{USER_KEY_PREFIX}{normalized}")
}

#[derive(Clone)]
pub struct BindingRegistry {
    storage: Arc<dyn Storage>,
    access: AccessStore,
    locks: Arc<UserLocks>,
}

impl std::fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingRegistry")
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl BindingRegistry {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, access: AccessStore) -> Self {
        Self {
            storage,
            access,
            locks: Arc::new(UserLocks::new()),
        }
    }

    /// Read the binding for `username`. `None` means the user never enrolled.
    ///
    /// # Errors
    /// Returns `Storage` if the read fails or the stored binding is corrupt.
    #[instrument(skip(self))]
    pub async fn lookup(&self, username: &str) -> Result<Option<UserBinding>, LatchError> {
        let normalized = normalize_username(username);
        let Some(entry) = self
            .storage
            .get(&user_key(&normalized))
            .await
            .map_err(LatchError::Storage)?
        else {
            return Ok(None);
        };

        let mut binding = entry
            .decode_json::<UserBinding>()
            .with_context(|| format!("corrupt latch binding for {normalized}"))
            .map_err(LatchError::Storage)?;

        if binding.account_id.is_empty() {
            return Err(LatchError::Storage(anyhow::anyhow!(
                "latch binding for {normalized} has an empty account id"
            )));
        }
        if binding.username.is_empty() {
            binding.username = normalized;
        }

        Ok(Some(binding))
    }

    /// Pair `username` with the oracle using a one-time `token` and store the
    /// binding. Re-enrolling replaces the previous binding; the earlier remote
    /// pairing is left as is.
    ///
    /// # Errors
    /// Returns `Configuration` or `Oracle` errors unchanged, and `Inconsistency`
    /// if the binding cannot be stored after a successful pair.
    #[instrument(skip(self, token))]
    pub async fn enroll(&self, username: &str, token: &str) -> Result<UserBinding, LatchError> {
        let normalized = normalize_username(username);
        if normalized.is_empty() {
            return Err(LatchError::invalid("username must not be empty"));
        }
        if token.is_empty() {
            return Err(LatchError::invalid("token must not be empty"));
        }

        let _guard = self.locks.acquire(&normalized).await;

        let client = self.access.client().await?;
        let account_id = client.pair(token).await?;
        if account_id.is_empty() {
            return Err(LatchError::Oracle(super::OracleError::InvalidResponse(
                "pair returned an empty account id".to_string(),
            )));
        }

        let binding = UserBinding {
            username: normalized.clone(),
            account_id,
        };

        if let Err(err) = self.store(&binding).await {
            error!(
                account_id = %binding.account_id,
                "paired with oracle but failed to store binding: {err:#}"
            );
            return Err(LatchError::Inconsistency {
                username: normalized,
                account_id: binding.account_id,
                stage: InconsistencyStage::PairedNotStored,
                cause: err,
            });
        }

        info!(account_id = %binding.account_id, "user enrolled in latch");
        Ok(binding)
    }

    /// Unpair `username` remotely, then drop the local binding. Unenrolling a
    /// user without a binding succeeds without touching the oracle.
    ///
    /// # Errors
    /// Returns `Configuration` or `Oracle` errors with the binding left intact,
    /// and `Inconsistency` if the binding cannot be deleted after unpairing.
    #[instrument(skip(self))]
    pub async fn unenroll(&self, username: &str) -> Result<UnenrollOutcome, LatchError> {
        let normalized = normalize_username(username);
        let _guard = self.locks.acquire(&normalized).await;

        let Some(binding) = self.lookup(&normalized).await? else {
            return Ok(UnenrollOutcome::NotEnrolled);
        };

        let client = self.access.client().await?;
        if let Err(err) = client.unpair(&binding.account_id).await {
            warn!(account_id = %binding.account_id, "unpair failed, keeping binding: {err}");
            return Err(err.into());
        }

        if let Err(err) = self.storage.delete(&user_key(&normalized)).await {
            error!(
                account_id = %binding.account_id,
                "unpaired with oracle but failed to delete binding: {err:#}"
            );
            return Err(LatchError::Inconsistency {
                username: normalized,
                account_id: binding.account_id,
                stage: InconsistencyStage::UnpairedNotDeleted,
                cause: err,
            });
        }

        info!(account_id = %binding.account_id, "user unenrolled from latch");
        Ok(UnenrollOutcome::Unpaired {
            account_id: binding.account_id,
        })
    }

    /// Delete the local binding without contacting the oracle.
    ///
    /// Used to reconcile after an `UnpairedNotDeleted` inconsistency, where
    /// calling `unenroll` again would try to unpair an account that is already
    /// gone, and to clear a binding that no longer decodes. Returns the removed
    /// binding when it was readable.
    ///
    /// # Errors
    /// Returns `Storage` if the delete fails.
    #[instrument(skip(self))]
    pub async fn forget(&self, username: &str) -> Result<Option<UserBinding>, LatchError> {
        let normalized = normalize_username(username);
        let _guard = self.locks.acquire(&normalized).await;

        // The record is deleted whether or not it can still be read.
        let binding = self.lookup(&normalized).await.unwrap_or_else(|err| {
            warn!("removing unreadable latch binding: {err}");
            None
        });
        self.storage
            .delete(&user_key(&normalized))
            .await
            .map_err(LatchError::Storage)?;

        if let Some(binding) = &binding {
            warn!(account_id = %binding.account_id, "latch binding removed locally only");
        }
        Ok(binding)
    }

    async fn store(&self, binding: &UserBinding) -> anyhow::Result<()> {
        let entry = StorageEntry::json(user_key(&binding.username), binding)?;
        self.storage.put(entry).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::latch::{
        testing::{configured_access, FakeOracle, FlakyStorage},
        OracleError,
    };

    async fn registry(oracle: &FakeOracle) -> (BindingRegistry, Arc<FlakyStorage>) {
        let storage = Arc::new(FlakyStorage::new());
        let access = configured_access(storage.clone(), oracle).await;
        (BindingRegistry::new(storage.clone(), access), storage)
    }

    #[tokio::test]
    async fn lookup_missing_user_is_none() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        let (registry, _) = registry(&oracle).await;
        assert_eq!(registry.lookup("nobody").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn enroll_normalizes_username() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        oracle.add_token("T1", "acc-1");
        let (registry, _) = registry(&oracle).await;

        let binding = registry.enroll("Alice", "T1").await?;
        assert_eq!(binding.username, "alice");
        assert_eq!(binding.account_id, "acc-1");

        assert_eq!(registry.lookup("alice").await?, Some(binding.clone()));
        assert_eq!(registry.lookup("ALICE").await?, Some(binding));
        Ok(())
    }

    #[tokio::test]
    async fn reenroll_overwrites_and_orphans_first_pairing() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        oracle.add_token("T1", "acc-1");
        oracle.add_token("T2", "acc-2");
        let (registry, storage) = registry(&oracle).await;

        registry.enroll("alice", "T1").await?;
        registry.enroll("alice", "T2").await?;

        let binding = registry.lookup("alice").await?.unwrap();
        assert_eq!(binding.account_id, "acc-2");
        // credentials + one binding
        assert_eq!(storage.len().await, 2);
        assert!(oracle.is_paired("acc-1"));
        assert!(oracle.is_paired("acc-2"));
        Ok(())
    }

    #[tokio::test]
    async fn enroll_without_configuration_fails() {
        let oracle = FakeOracle::new();
        let storage = Arc::new(FlakyStorage::new());
        let access = crate::latch::testing::access(storage.clone(), &oracle);
        let registry = BindingRegistry::new(storage, access);

        let err = registry.enroll("alice", "T1").await.unwrap_err();
        assert!(matches!(err, LatchError::Configuration(_)));
        assert!(oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn enroll_with_rejected_token_stores_nothing() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        let (registry, _) = registry(&oracle).await;

        let err = registry.enroll("alice", "bogus").await.unwrap_err();
        assert!(matches!(
            err,
            LatchError::Oracle(OracleError::Rejected { .. })
        ));
        assert_eq!(registry.lookup("alice").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn failed_store_after_pair_is_inconsistency() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        oracle.add_token("T1", "acc-1");
        let (registry, storage) = registry(&oracle).await;
        storage.fail_puts(true);

        let err = registry.enroll("alice", "T1").await.unwrap_err();
        match err {
            LatchError::Inconsistency {
                username,
                account_id,
                stage,
                ..
            } => {
                assert_eq!(username, "alice");
                assert_eq!(account_id, "acc-1");
                assert_eq!(stage, InconsistencyStage::PairedNotStored);
            }
            other => panic!("unexpected error: {other}"),
        }

        storage.fail_puts(false);
        assert_eq!(registry.lookup("alice").await?, None);
        assert!(oracle.is_paired("acc-1"));
        Ok(())
    }

    #[tokio::test]
    async fn unenroll_is_idempotent() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        oracle.add_token("T1", "acc-1");
        let (registry, _) = registry(&oracle).await;
        registry.enroll("alice", "T1").await?;

        assert_eq!(
            registry.unenroll("alice").await?,
            UnenrollOutcome::Unpaired {
                account_id: "acc-1".to_string()
            }
        );
        assert_eq!(
            registry.unenroll("alice").await?,
            UnenrollOutcome::NotEnrolled
        );
        assert_eq!(registry.lookup("alice").await?, None);
        assert!(!oracle.is_paired("acc-1"));
        Ok(())
    }

    #[tokio::test]
    async fn unenroll_unknown_user_skips_configuration() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        let storage = Arc::new(FlakyStorage::new());
        let access = crate::latch::testing::access(storage.clone(), &oracle);
        let registry = BindingRegistry::new(storage, access);

        assert_eq!(
            registry.unenroll("ghost").await?,
            UnenrollOutcome::NotEnrolled
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_unpair_keeps_binding() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        oracle.add_token("T1", "acc-1");
        let (registry, _) = registry(&oracle).await;
        registry.enroll("alice", "T1").await?;
        oracle.fail_with(OracleError::Transport("connection refused".to_string()));

        let err = registry.unenroll("alice").await.unwrap_err();
        assert!(matches!(err, LatchError::Oracle(OracleError::Transport(_))));
        assert!(registry.lookup("alice").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn failed_delete_after_unpair_is_inconsistency_and_forget_recovers(
    ) -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        oracle.add_token("T1", "acc-1");
        let (registry, storage) = registry(&oracle).await;
        registry.enroll("alice", "T1").await?;
        storage.fail_deletes(true);

        let err = registry.unenroll("alice").await.unwrap_err();
        assert!(matches!(
            err,
            LatchError::Inconsistency {
                stage: InconsistencyStage::UnpairedNotDeleted,
                ..
            }
        ));
        assert!(!oracle.is_paired("acc-1"));
        assert!(registry.lookup("alice").await?.is_some());

        storage.fail_deletes(false);
        let removed = registry.forget("alice").await?;
        assert_eq!(removed.map(|binding| binding.account_id), Some("acc-1".to_string()));
        assert_eq!(registry.lookup("alice").await?, None);
        // forget never calls unpair a second time
        assert_eq!(oracle.count_calls("unpair"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn forget_removes_corrupt_binding() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        let (registry, storage) = registry(&oracle).await;
        for (name, value) in [("dave", r#"{"account_id":""}"#), ("erin", "not json")] {
            storage
                .put(StorageEntry {
                    key: format!("latchuser/{name}"),
                    value: value.to_string(),
                })
                .await?;
            assert!(matches!(
                registry.lookup(name).await,
                Err(LatchError::Storage(_))
            ));
            assert!(matches!(
                registry.unenroll(name).await,
                Err(LatchError::Storage(_))
            ));

            assert_eq!(registry.forget(name).await?, None);
            assert!(storage.get(&format!("latchuser/{name}")).await?.is_none());
            assert_eq!(registry.lookup(name).await?, None);
        }
        assert!(oracle.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn legacy_binding_without_username_is_filled_from_key() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        let (registry, storage) = registry(&oracle).await;
        storage
            .put(StorageEntry {
                key: "latchuser/carol".to_string(),
                value: r#"{"Account":"acc-legacy"}"#.to_string(),
            })
            .await?;

        let binding = registry.lookup("Carol").await?.unwrap();
        assert_eq!(binding.username, "carol");
        assert_eq!(binding.account_id, "acc-legacy");
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_enrolls_for_one_user_are_serialized() -> anyhow::Result<()> {
        let oracle = FakeOracle::new();
        oracle.add_token("T1", "acc-1");
        oracle.add_token("T2", "acc-2");
        oracle.set_delay(std::time::Duration::from_millis(20));
        let (registry, _) = registry(&oracle).await;

        let (first, second) = tokio::join!(
            registry.enroll("alice", "T1"),
            registry.enroll("ALICE", "T2")
        );
        first?;
        second?;

        assert_eq!(oracle.max_in_flight(), 1);
        assert!(registry.lookup("alice").await?.is_some());
        Ok(())
    }
}
