use crate::{
    auth::{SignInConfig, Throttle},
    warden::ClientIpSource,
};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub max_attempts: u32,
    pub window_seconds: u64,
    pub store_timeout_ms: u64,
    pub trust_proxy: bool,
}

impl Args {
    /// Build the sign-in configuration from the CLI values.
    ///
    /// # Errors
    /// Returns an error if the window or store timeout is zero.
    pub fn sign_in_config(&self) -> Result<SignInConfig> {
        let throttle = Throttle::new(self.max_attempts, Duration::from_secs(self.window_seconds))
            .context("invalid sign-in throttle")?;
        SignInConfig::new(throttle)
            .with_store_timeout(Duration::from_millis(self.store_timeout_ms))
            .context("invalid store timeout")
    }

    #[must_use]
    pub const fn ip_source(&self) -> ClientIpSource {
        if self.trust_proxy {
            ClientIpSource::ForwardedHeaders
        } else {
            ClientIpSource::Peer
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.sign_in_config()?;
    let ip_source = args.ip_source();
    log_startup_args(&args);

    crate::warden::new(args.port, args.dsn, config, ip_source).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("max_attempts", args.max_attempts.to_string()),
        ("window", format!("{}s", args.window_seconds)),
        ("store_timeout", format!("{}ms", args.store_timeout_ms)),
        ("trust_proxy", args.trust_proxy.to_string()),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "warden {} - {}\n\n{title}:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed.chars().take(7).collect()
}
