use secrecy::SecretString;
use std::time::Duration;

/// Runtime settings shared by the server once arguments are parsed.
#[derive(Clone)]
pub struct GlobalArgs {
    pub oracle_url: String,
    pub oracle_timeout: Duration,
    pub api_token: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(oracle_url: String, oracle_timeout: Duration, api_token: SecretString) -> Self {
        Self {
            oracle_url,
            oracle_timeout,
            api_token,
        }
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("oracle_url", &self.oracle_url)
            .field("oracle_timeout", &self.oracle_timeout)
            .field("api_token", &"***")
            .finish()
    }
}
