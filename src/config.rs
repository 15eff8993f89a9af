use anyhow::{Context, Result};
use std::time::Duration;

use crate::audio::scheduler::SchedulerSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub max_enqueue_per_request: usize,

    // Tiempos
    pub idle_timeout: Duration,
    pub transport_poll_attempts: u32,
    pub transport_poll_interval: Duration,
    pub connect_attempts: u32,
    pub connect_timeout: Duration,

    // Extracción
    pub ytdlp_path: String,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, applying defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str, default: String| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default);
        let duration = |key: &str, default: Duration| -> Result<Duration> {
            let raw = var(key, humantime::format_duration(default).to_string());
            humantime::parse_duration(raw.trim()).with_context(|| format!("{key} inválido: {raw}"))
        };

        let config = Self {
            discord_token: lookup("DISCORD_TOKEN").context("Falta DISCORD_TOKEN en el entorno o en .env")?,
            command_prefix: var("COMMAND_PREFIX", defaults.command_prefix),

            default_volume: var("DEFAULT_VOLUME", defaults.default_volume.to_string())
                .parse()
                .context("DEFAULT_VOLUME inválido")?,
            max_enqueue_per_request: var("MAX_ENQUEUE_PER_REQUEST", defaults.max_enqueue_per_request.to_string())
                .parse()
                .context("MAX_ENQUEUE_PER_REQUEST inválido")?,

            idle_timeout: duration("IDLE_TIMEOUT", defaults.idle_timeout)?,
            transport_poll_attempts: var("TRANSPORT_POLL_ATTEMPTS", defaults.transport_poll_attempts.to_string())
                .parse()
                .context("TRANSPORT_POLL_ATTEMPTS inválido")?,
            transport_poll_interval: duration("TRANSPORT_POLL_INTERVAL", defaults.transport_poll_interval)?,
            connect_attempts: var("CONNECT_ATTEMPTS", defaults.connect_attempts.to_string())
                .parse()
                .context("CONNECT_ATTEMPTS inválido")?,
            connect_timeout: duration("CONNECT_TIMEOUT", defaults.connect_timeout)?,

            ytdlp_path: var("YTDLP_PATH", defaults.ytdlp_path),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - The per-request enqueue cap must be greater than 0
    /// - Idle timeout, poll attempts and connect attempts must be non-zero
    /// - The command prefix must not be empty
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.max_enqueue_per_request == 0 {
            anyhow::bail!("Max enqueue per request must be greater than 0");
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.transport_poll_attempts == 0 {
            anyhow::bail!("Transport poll attempts must be greater than 0");
        }

        if self.connect_attempts == 0 {
            anyhow::bail!("Connect attempts must be greater than 0");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        Ok(())
    }

    /// Scheduler limits derived from this configuration.
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            idle_timeout: self.idle_timeout,
            transport_poll_attempts: self.transport_poll_attempts,
            transport_poll_interval: self.transport_poll_interval,
            max_enqueue_per_request: self.max_enqueue_per_request,
            default_volume: self.default_volume,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Audio: {}% vol, {} tracks per request\n  \
            Idle: {} timeout, transport poll {}x{}\n  \
            Voice: {} attempts, {} timeout\n  \
            Extractor: {}",
            self.command_prefix,
            (self.default_volume * 100.0).round() as u32,
            self.max_enqueue_per_request,
            humantime::format_duration(self.idle_timeout),
            self.transport_poll_attempts,
            humantime::format_duration(self.transport_poll_interval),
            self.connect_attempts,
            humantime::format_duration(self.connect_timeout),
            self.ytdlp_path,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let scheduler = SchedulerSettings::default();
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            default_volume: scheduler.default_volume,
            max_enqueue_per_request: scheduler.max_enqueue_per_request,

            idle_timeout: scheduler.idle_timeout,
            transport_poll_attempts: scheduler.transport_poll_attempts,
            transport_poll_interval: scheduler.transport_poll_interval,
            connect_attempts: 3,
            connect_timeout: Duration::from_secs(45),

            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
