use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const CMD_CLEAR_ATTEMPTS: &str = "clear-attempts";
pub const ARG_EMAIL: &str = "email";
pub const ARG_IP: &str = "ip";

/// Operator command resetting the attempt counter of one email+IP pair.
#[must_use]
pub fn subcommand() -> Command {
    Command::new(CMD_CLEAR_ATTEMPTS)
        .about("Reset the sign-in attempt counter for an email and client IP")
        .arg(
            Arg::new(ARG_EMAIL)
                .long(ARG_EMAIL)
                .help("Email of the locked out account")
                .required(true),
        )
        .arg(
            Arg::new(ARG_IP)
                .long(ARG_IP)
                .help("Client IP the attempts came from")
                .required(true),
        )
}

#[derive(Debug)]
pub struct Options {
    pub email: String,
    pub client_ip: String,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing from the matches.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            email: matches
                .get_one::<String>(ARG_EMAIL)
                .cloned()
                .context("missing --email")?,
            client_ip: matches
                .get_one::<String>(ARG_IP)
                .cloned()
                .context("missing --ip")?,
        })
    }
}
