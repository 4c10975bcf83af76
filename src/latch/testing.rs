//! In-memory oracle and storage doubles for unit tests.

use super::{
    access::{AccessCredentials, AccessStore},
    oracle::{Oracle, OracleConnector, OracleError, DEFAULT_ORACLE_TIMEOUT},
    storage::{MemoryStorage, Storage, StorageEntry},
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

#[derive(Default)]
struct FakeState {
    tokens: HashMap<String, String>,
    paired: HashSet<String>,
    status: HashMap<String, bool>,
    failure: Option<OracleError>,
    delay: Duration,
    calls: Vec<(&'static str, String)>,
    connected: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeOracle {
    state: Arc<Mutex<FakeState>>,
}

#[allow(clippy::unwrap_used)]
impl FakeOracle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub(crate) fn add_token(&self, token: &str, account_id: &str) {
        self.with(|s| s.tokens.insert(token.to_string(), account_id.to_string()));
    }

    pub(crate) fn set_status(&self, account_id: &str, on: bool) {
        self.with(|s| s.status.insert(account_id.to_string(), on));
    }

    pub(crate) fn fail_with(&self, error: OracleError) {
        self.with(|s| s.failure = Some(error));
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.with(|s| s.delay = delay);
    }

    pub(crate) fn is_paired(&self, account_id: &str) -> bool {
        self.with(|s| s.paired.contains(account_id))
    }

    pub(crate) fn calls(&self) -> Vec<(&'static str, String)> {
        self.with(|s| s.calls.clone())
    }

    pub(crate) fn count_calls(&self, op: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|(name, _)| *name == op).count())
    }

    pub(crate) fn connected_app_ids(&self) -> Vec<String> {
        self.with(|s| s.connected.clone())
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.with(|s| s.max_in_flight)
    }

    async fn enter(&self, op: &'static str, arg: &str) -> Result<(), OracleError> {
        let delay = self.with(|s| {
            s.calls.push((op, arg.to_string()));
            s.in_flight += 1;
            s.max_in_flight = s.max_in_flight.max(s.in_flight);
            s.delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.with(|s| {
            s.in_flight -= 1;
            s.failure.clone().map_or(Ok(()), Err)
        })
    }
}

#[async_trait]
impl Oracle for FakeOracle {
    async fn pair(&self, token: &str) -> Result<String, OracleError> {
        self.enter("pair", token).await?;
        self.with(|s| match s.tokens.get(token).cloned() {
            Some(account_id) => {
                s.paired.insert(account_id.clone());
                Ok(account_id)
            }
            None => Err(OracleError::Rejected {
                code: 206,
                message: "Token not found or expired".to_string(),
            }),
        })
    }

    async fn unpair(&self, account_id: &str) -> Result<(), OracleError> {
        self.enter("unpair", account_id).await?;
        self.with(|s| {
            if s.paired.remove(account_id) {
                Ok(())
            } else {
                Err(OracleError::Rejected {
                    code: 201,
                    message: "Account not paired".to_string(),
                })
            }
        })
    }

    async fn status_is_on(&self, account_id: &str) -> Result<bool, OracleError> {
        self.enter("status", account_id).await?;
        self.with(|s| Ok(s.status.get(account_id).copied().unwrap_or(false)))
    }
}

pub(crate) struct FakeConnector {
    oracle: FakeOracle,
}

impl FakeConnector {
    pub(crate) fn new(oracle: FakeOracle) -> Self {
        Self { oracle }
    }
}

impl OracleConnector for FakeConnector {
    fn connect(&self, credentials: &AccessCredentials) -> Result<Box<dyn Oracle>, OracleError> {
        self.oracle
            .with(|s| s.connected.push(credentials.app_id.clone()));
        Ok(Box::new(self.oracle.clone()))
    }
}

/// Memory storage whose writes and deletes can be made to fail on demand.
#[derive(Default)]
pub(crate) struct FlakyStorage {
    inner: MemoryStorage,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>> {
        self.inner.get(key).await
    }

    async fn put(&self, entry: StorageEntry) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(anyhow!("write refused for {}", entry.key));
        }
        self.inner.put(entry).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("delete refused for {key}"));
        }
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn access(storage: Arc<FlakyStorage>, oracle: &FakeOracle) -> AccessStore {
    AccessStore::new(
        storage,
        Arc::new(FakeConnector::new(oracle.clone())),
        DEFAULT_ORACLE_TIMEOUT,
    )
}

#[allow(clippy::unwrap_used)]
pub(crate) async fn configured_access(
    storage: Arc<FlakyStorage>,
    oracle: &FakeOracle,
) -> AccessStore {
    let access = access(storage, oracle);
    access
        .set_access(AccessCredentials::new(
            "A1".to_string(),
            SecretString::from("S1".to_string()),
        ))
        .await
        .unwrap();
    access
}
