//! Reservation core configuration structures.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;
use crate::util::retry::RetryPolicy;

/// Slot generation and request validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    /// Duration used when neither request nor business specifies one.
    pub default_duration_minutes: u32,
    /// Longest booking accepted.
    pub max_duration_minutes: u32,
    /// Global party size ceiling; a business may be stricter.
    pub max_party_size: u32,
    /// Reject availability and reservation requests for past dates.
    pub reject_past_dates: bool,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: 90,
            max_duration_minutes: 8 * 60,
            max_party_size: 50,
            reject_past_dates: true,
        }
    }
}

/// Reservation lock and pending-hold settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lock self-expiry, so a crashed holder cannot wedge a key.
    pub lock_ttl_ms: u64,
    /// How long a caller waits for the lock before failing closed.
    pub wait_timeout_ms: u64,
    /// First poll delay while waiting.
    pub poll_initial_ms: u64,
    /// Poll delay cap while waiting.
    pub poll_max_ms: u64,
    /// Lifetime of a pending hold written after a successful decision.
    pub pending_ttl_secs: u64,
    /// Alternatives are searched within ± this many grid steps.
    pub alternative_steps: u32,
    /// Maximum alternatives returned with a conflict.
    pub max_alternatives: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: 5_000,
            wait_timeout_ms: 2_000,
            poll_initial_ms: 5,
            poll_max_ms: 50,
            pending_ttl_secs: 300,
            alternative_steps: 4,
            max_alternatives: 3,
        }
    }
}

impl LockConfig {
    /// Lock TTL as a `Duration`.
    #[must_use]
    pub const fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    /// Wait timeout as a `Duration`.
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    /// Pending hold TTL as a `Duration`.
    #[must_use]
    pub const fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }
}

/// Live availability broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Quiet period after the last change before buffered updates are flushed.
    pub debounce_ms: u64,
    /// Subscription lifetime.
    pub subscription_ttl_secs: u64,
    /// Background refresh period for keys with live subscribers.
    pub refresh_interval_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            subscription_ttl_secs: 4 * 60 * 60,
            refresh_interval_secs: 30,
        }
    }
}

impl BroadcastConfig {
    /// Debounce window as a `Duration`.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Subscription lifetime as a `Duration`.
    #[must_use]
    pub const fn subscription_ttl(&self) -> Duration {
        Duration::from_secs(self.subscription_ttl_secs)
    }

    /// Refresh period as a `Duration`.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Waitlist estimates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitlistConfig {
    /// Average wait assumed when there is no seating history.
    pub fallback_wait_minutes: u32,
    /// Trailing window of seating history used for the average.
    pub history_days: u32,
}

impl Default for WaitlistConfig {
    fn default() -> Self {
        Self {
            fallback_wait_minutes: 20,
            history_days: 7,
        }
    }
}

/// Backoff for idempotent reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// First backoff delay.
    pub initial_delay_ms: u64,
    /// Backoff cap.
    pub max_delay_ms: u64,
    /// Growth factor.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            initial_delay_ms: 50,
            max_delay_ms: 1_000,
            multiplier: policy.multiplier,
        }
    }
}

impl RetryConfig {
    /// Build the runtime policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Slot generation and validation.
    pub slots: SlotConfig,
    /// Reservation lock and holds.
    pub locking: LockConfig,
    /// Live broadcast.
    pub broadcast: BroadcastConfig,
    /// Waitlist.
    pub waitlist: WaitlistConfig,
    /// Read retries.
    pub retry: RetryConfig,
}

impl ReservationConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.slots.default_duration_minutes == 0 {
            return Err("slots.default_duration_minutes must be greater than 0".into());
        }
        if self.slots.max_duration_minutes < self.slots.default_duration_minutes {
            return Err("slots.max_duration_minutes must be >= default_duration_minutes".into());
        }
        if self.slots.max_party_size == 0 {
            return Err("slots.max_party_size must be greater than 0".into());
        }
        if self.locking.lock_ttl_ms == 0 {
            return Err("locking.lock_ttl_ms must be greater than 0".into());
        }
        if self.locking.wait_timeout_ms == 0 {
            return Err("locking.wait_timeout_ms must be greater than 0".into());
        }
        if self.locking.poll_initial_ms == 0 || self.locking.poll_max_ms < self.locking.poll_initial_ms {
            return Err("locking.poll_initial_ms must be > 0 and <= poll_max_ms".into());
        }
        if self.locking.pending_ttl_secs == 0 {
            return Err("locking.pending_ttl_secs must be greater than 0".into());
        }
        if self.broadcast.debounce_ms == 0 {
            return Err("broadcast.debounce_ms must be greater than 0".into());
        }
        if self.broadcast.subscription_ttl_secs == 0 {
            return Err("broadcast.subscription_ttl_secs must be greater than 0".into());
        }
        if self.broadcast.refresh_interval_secs == 0 {
            return Err("broadcast.refresh_interval_secs must be greater than 0".into());
        }
        if self.waitlist.history_days == 0 {
            return Err("waitlist.history_days must be greater than 0".into());
        }
        if self.retry.multiplier < 1.0 {
            return Err("retry.multiplier must be >= 1.0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment.
    ///
    /// A `.env` file is honoured. `RESERVATION_CONFIG_FILE` names an optional
    /// JSON file used as the base; individual `RESERVATION_*` variables then
    /// override single values.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = match std::env::var("RESERVATION_CONFIG_FILE") {
            Ok(path) => Self::from_json_file(&path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|name| std::env::var(name).ok())
            .map_err(anyhow::Error::msg)?;
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading config file {}", path.display()))
    }

    /// Apply `RESERVATION_*` overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, String> {
            raw.trim()
                .parse()
                .map_err(|_| format!("{name}: cannot parse `{raw}`"))
        }

        macro_rules! override_field {
            ($name:literal, $field:expr) => {
                if let Some(raw) = lookup($name) {
                    $field = parse($name, &raw)?;
                }
            };
        }

        override_field!("RESERVATION_DEFAULT_DURATION_MINUTES", self.slots.default_duration_minutes);
        override_field!("RESERVATION_MAX_DURATION_MINUTES", self.slots.max_duration_minutes);
        override_field!("RESERVATION_MAX_PARTY_SIZE", self.slots.max_party_size);
        override_field!("RESERVATION_REJECT_PAST_DATES", self.slots.reject_past_dates);
        override_field!("RESERVATION_LOCK_TTL_MS", self.locking.lock_ttl_ms);
        override_field!("RESERVATION_LOCK_WAIT_TIMEOUT_MS", self.locking.wait_timeout_ms);
        override_field!("RESERVATION_PENDING_TTL_SECS", self.locking.pending_ttl_secs);
        override_field!("RESERVATION_ALTERNATIVE_STEPS", self.locking.alternative_steps);
        override_field!("RESERVATION_MAX_ALTERNATIVES", self.locking.max_alternatives);
        override_field!("RESERVATION_DEBOUNCE_MS", self.broadcast.debounce_ms);
        override_field!("RESERVATION_SUBSCRIPTION_TTL_SECS", self.broadcast.subscription_ttl_secs);
        override_field!("RESERVATION_REFRESH_INTERVAL_SECS", self.broadcast.refresh_interval_secs);
        override_field!("RESERVATION_WAITLIST_FALLBACK_MINUTES", self.waitlist.fallback_wait_minutes);
        override_field!("RESERVATION_WAITLIST_HISTORY_DAYS", self.waitlist.history_days);
        override_field!("RESERVATION_RETRY_MAX", self.retry.max_retries);
        Ok(())
    }
}
