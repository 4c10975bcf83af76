//! Login-time latch challenge.
//!
//! ```text
//! no username                      -> error (MissingUsername)
//! no binding                       -> pass through (enforcement is opt-in)
//! binding, credentials unusable    -> error (Configuration)
//! binding, status call fails       -> error (Oracle)
//! binding, latch off               -> deny
//! binding, latch on                -> pass through
//! ```
//!
//! Only the unenrolled branch fails open. Every failure after a binding is
//! found ends in an error or a denial, never in the primary response.

use super::{access::AccessStore, error::LatchError, users::BindingRegistry};
use tracing::{debug, info, instrument, warn};

pub const SWITCH_OFF_REASON: &str = "Latch switch is off";

/// Outcome of one challenge over a primary authentication result `R`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<R> {
    /// The user has no binding; `R` is returned unchanged.
    Unenrolled(R),
    /// The oracle reported the latch open; `R` is returned unchanged.
    Approved(R),
    /// The oracle reported the latch closed.
    Denied { reason: String },
}

impl<R> Verdict<R> {
    #[cfg(test)]
    fn into_passthrough(self) -> Option<R> {
        match self {
            Self::Unenrolled(response) | Self::Approved(response) => Some(response),
            Self::Denied { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChallengeEvaluator {
    registry: BindingRegistry,
    access: AccessStore,
}

impl ChallengeEvaluator {
    #[must_use]
    pub fn new(registry: BindingRegistry, access: AccessStore) -> Self {
        Self { registry, access }
    }

    /// Decide whether the completed primary login `primary` for `username` may
    /// proceed. Bindings are only read.
    ///
    /// # Errors
    /// Returns `MissingUsername` without a username; for enrolled users returns
    /// `Configuration`, `Oracle` or `Storage` errors instead of passing through.
    #[instrument(skip(self, primary))]
    pub async fn evaluate<R>(
        &self,
        primary: R,
        username: Option<&str>,
    ) -> Result<Verdict<R>, LatchError> {
        let username = username
            .filter(|name| !name.is_empty())
            .ok_or(LatchError::MissingUsername)?;

        let Some(binding) = self.registry.lookup(username).await? else {
            debug!("user not enrolled in latch, passing through");
            return Ok(Verdict::Unenrolled(primary));
        };

        let client = self.access.client().await?;
        let status_is_on = client.status_is_on(&binding.account_id).await?;

        if status_is_on {
            info!(account_id = %binding.account_id, "latch open, login allowed");
            Ok(Verdict::Approved(primary))
        } else {
            warn!(account_id = %binding.account_id, "latch closed, login denied");
            Ok(Verdict::Denied {
                reason: SWITCH_OFF_REASON.to_string(),
            })
        }
    }
}
