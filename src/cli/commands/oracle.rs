use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_ORACLE_URL: &str = "oracle-url";
pub const ARG_ORACLE_TIMEOUT: &str = "oracle-timeout";

pub const DEFAULT_ORACLE_URL: &str = "https://latch.elevenpaths.com";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ORACLE_URL)
                .long(ARG_ORACLE_URL)
                .help("Base URL of the latch service")
                .env("LATCHGATE_ORACLE_URL")
                .default_value(DEFAULT_ORACLE_URL),
        )
        .arg(
            Arg::new(ARG_ORACLE_TIMEOUT)
                .long(ARG_ORACLE_TIMEOUT)
                .help("Seconds to wait for each latch call before failing it")
                .env("LATCHGATE_ORACLE_TIMEOUT")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..=300)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub timeout: Duration,
}

impl Options {
    /// # Errors
    /// Returns an error if a value is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let url = matches
            .get_one::<String>(ARG_ORACLE_URL)
            .cloned()
            .context("missing required argument: --oracle-url")?;
        let timeout = matches
            .get_one::<u64>(ARG_ORACLE_TIMEOUT)
            .copied()
            .map(Duration::from_secs)
            .context("missing required argument: --oracle-timeout")?;

        Ok(Self { url, timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        temp_env::with_vars_unset(["LATCHGATE_ORACLE_URL", "LATCHGATE_ORACLE_TIMEOUT"], || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            let options = Options::parse(&matches).ok();
            assert_eq!(
                options.as_ref().map(|o| o.url.as_str()),
                Some(DEFAULT_ORACLE_URL)
            );
            assert_eq!(options.map(|o| o.timeout), Some(Duration::from_secs(10)));
        });
    }

    #[test]
    fn env_fallback() {
        temp_env::with_vars(
            [
                ("LATCHGATE_ORACLE_URL", Some("http://127.0.0.1:9000")),
                ("LATCHGATE_ORACLE_TIMEOUT", Some("3")),
            ],
            || {
                let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
                let options = Options::parse(&matches).ok();
                assert_eq!(
                    options.as_ref().map(|o| o.url.as_str()),
                    Some("http://127.0.0.1:9000")
                );
                assert_eq!(options.map(|o| o.timeout), Some(Duration::from_secs(3)));
            },
        );
    }

    #[test]
    fn timeout_must_be_positive() {
        let result = with_args(Command::new("test")).try_get_matches_from(vec![
            "test",
            "--oracle-timeout",
            "0",
        ]);
        assert!(result.is_err());
    }
}
