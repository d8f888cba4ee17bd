use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, builder::BoolishValueParser};

pub const ARG_MAX_ATTEMPTS: &str = "max-attempts";
pub const ARG_WINDOW: &str = "window";
pub const ARG_STORE_TIMEOUT: &str = "store-timeout";
pub const ARG_TRUST_PROXY: &str = "trust-proxy";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS)
                .long(ARG_MAX_ATTEMPTS)
                .help("Sign-in attempts allowed per email+IP within the window")
                .env("WARDEN_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_WINDOW)
                .long(ARG_WINDOW)
                .help("Sign-in attempt window in seconds")
                .env("WARDEN_WINDOW")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT)
                .long(ARG_STORE_TIMEOUT)
                .help("Timeout in milliseconds for credential store and counter calls")
                .env("WARDEN_STORE_TIMEOUT")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY)
                .long(ARG_TRUST_PROXY)
                .help("Take the client IP from x-forwarded-for/x-real-ip (only behind a proxy that sets them)")
                .env("WARDEN_TRUST_PROXY")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}

#[derive(Debug)]
pub struct Options {
    pub max_attempts: u32,
    pub window_seconds: u64,
    pub store_timeout_ms: u64,
    pub trust_proxy: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing from the matches.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            max_attempts: matches
                .get_one::<u32>(ARG_MAX_ATTEMPTS)
                .copied()
                .context("missing --max-attempts")?,
            window_seconds: matches
                .get_one::<u64>(ARG_WINDOW)
                .copied()
                .context("missing --window")?,
            store_timeout_ms: matches
                .get_one::<u64>(ARG_STORE_TIMEOUT)
                .copied()
                .context("missing --store-timeout")?,
            trust_proxy: matches.get_flag(ARG_TRUST_PROXY),
        })
    }
}
