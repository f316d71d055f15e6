use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// What the supervisor does once the connection is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Watchdog discards the whole client and starts over with a blank display.
    #[default]
    Reset,
    /// Reconnect the same client with exponential backoff, keeping the last reading on screen.
    Backoff,
}

impl FromStr for RecoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(RecoveryMode::Reset),
            "backoff" => Ok(RecoveryMode::Backoff),
            other => Err(format!("unknown recovery mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub endpoint: Endpoint,
    /// Watchdog period.
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
    pub recovery: RecoveryMode,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let reconnect_interval = Duration::from_millis(5_000);
        Self {
            endpoint: Endpoint::new("192.168.1.100", 81),
            reconnect_interval,
            connect_timeout: reconnect_interval,
            recovery: RecoveryMode::Reset,
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl LinkConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unparseable, empty, or zero values keep the default.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = LinkConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ARMVIEW_HOST") {
            cfg.endpoint.host = v.trim().to_string();
        }
        if let Some(p) = get("ARMVIEW_PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
            if p != 0 {
                cfg.endpoint.port = p;
            }
        }
        let interval = get("ARMVIEW_RECONNECT_INTERVAL_MS").and_then(|v| parse_millis(&v));
        if let Some(d) = interval {
            cfg.reconnect_interval = d;
        }
        match get("ARMVIEW_CONNECT_TIMEOUT_MS").and_then(|v| parse_millis(&v)) {
            Some(d) => cfg.connect_timeout = d,
            None => cfg.connect_timeout = cfg.reconnect_interval,
        }
        if let Some(mode) = get("ARMVIEW_RECOVERY").and_then(|v| v.parse::<RecoveryMode>().ok()) {
            cfg.recovery = mode;
        }
        if let Some(d) = get("ARMVIEW_BACKOFF_MAX_MS").and_then(|v| parse_millis(&v)) {
            cfg.backoff_max = d;
        }

        cfg
    }

    /// Delay before reconnect attempt `attempt` (1-based): doubles from `backoff_initial`, capped at `backoff_max`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.backoff_initial.saturating_mul(1u32 << exp);
        delay.min(self.backoff_max)
    }
}

fn parse_millis(v: &str) -> Option<Duration> {
    v.trim().parse::<u64>().ok().filter(|ms| *ms > 0).map(Duration::from_millis)
}
