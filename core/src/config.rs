use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest sweep window accepted by `validate` (30 days).
pub const MAX_WINDOW_MINUTES: i64 = 30 * 24 * 60;

/// Longest sweep interval accepted by `validate` (one day).
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite path or `file:` URI.
    pub path: String,
    /// Upper bound on how long a single store call may wait for a lock.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "crm.db".into(),
            timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_secs: u64,
    /// Trailing window scanned on every tick.
    pub window_minutes: i64,
    /// Worst observed lag between SourcePlan and Application commits.
    pub max_replication_lag_secs: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Deployment::AlwaysOn.sweep()
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Clamped to `1..=MAX_WINDOW_MINUTES`; `validate` rejects values
    /// outside that range before they get here.
    pub fn window(&self) -> TimeDelta {
        TimeDelta::minutes(self.window_minutes.clamp(1, MAX_WINDOW_MINUTES))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventConfig {
    /// Change-notification event names handled; others are ignored.
    pub accepted: Vec<String>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            accepted: vec!["INSERT".into(), "UPDATE".into()],
        }
    }
}

impl EventConfig {
    pub fn accepts(&self, event: &str) -> bool {
        self.accepted.iter().any(|e| e.eq_ignore_ascii_case(event))
    }
}

/// Preset sweep cadences for the two known deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deployment {
    /// Dedicated worker: every minute over the last 30 minutes.
    AlwaysOn,
    /// Cron-style host: every 5 minutes over the last 2 hours.
    LightTouch,
}

impl Deployment {
    pub fn sweep(self) -> SweepConfig {
        match self {
            Deployment::AlwaysOn => SweepConfig {
                interval_secs: 60,
                window_minutes: 30,
                max_replication_lag_secs: 300,
            },
            Deployment::LightTouch => SweepConfig {
                interval_secs: 300,
                window_minutes: 120,
                max_replication_lag_secs: 900,
            },
        }
    }
}

impl std::str::FromStr for Deployment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "always_on" => Ok(Deployment::AlwaysOn),
            "light_touch" => Ok(Deployment::LightTouch),
            other => Err(format!("unknown deployment profile '{other}'")),
        }
    }
}

/// Root configuration handed to every adapter at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconConfig {
    pub store: StoreConfig,
    pub sweep: SweepConfig,
    pub events: EventConfig,
}

impl ReconConfig {
    /// Load from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ReconConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    pub fn for_deployment(deployment: Deployment) -> Self {
        Self {
            sweep: deployment.sweep(),
            ..Self::default()
        }
    }

    /// Config with an in-memory-friendly store path and a short cadence.
    pub fn default_test() -> Self {
        Self {
            store: StoreConfig {
                path: ":memory:".into(),
                timeout_ms: 1_000,
            },
            sweep: SweepConfig {
                interval_secs: 1,
                window_minutes: 30,
                max_replication_lag_secs: 60,
            },
            events: EventConfig::default(),
        }
    }

    /// Hard errors only. A window narrower than twice the replication lag
    /// is allowed but reported through `warnings()`.
    pub fn validate(&self) -> Result<(), String> {
        if self.store.path.trim().is_empty() {
            return Err("store.path must not be empty".into());
        }
        if self.store.timeout_ms == 0 {
            return Err("store.timeout_ms must be > 0".into());
        }
        if self.sweep.interval_secs == 0 || self.sweep.interval_secs > MAX_INTERVAL_SECS {
            return Err(format!("sweep.interval_secs must be in 1..={MAX_INTERVAL_SECS}"));
        }
        if !(1..=MAX_WINDOW_MINUTES).contains(&self.sweep.window_minutes) {
            return Err(format!("sweep.window_minutes must be in 1..={MAX_WINDOW_MINUTES}"));
        }
        if self.sweep.max_replication_lag_secs < 0 {
            return Err("sweep.max_replication_lag_secs must be >= 0".into());
        }
        if self.events.accepted.is_empty() {
            return Err("events.accepted must list at least one event".into());
        }
        Ok(())
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        let window_secs = self.sweep.window_minutes.saturating_mul(60);
        if window_secs < self.sweep.max_replication_lag_secs.saturating_mul(2) {
            out.push(format!(
                "sweep window {}m is narrower than 2x max replication lag ({}s)",
                self.sweep.window_minutes, self.sweep.max_replication_lag_secs
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_have_expected_cadence() {
        let on = Deployment::AlwaysOn.sweep();
        assert_eq!(on.interval_secs, 60);
        assert_eq!(on.window_minutes, 30);

        let light = Deployment::LightTouch.sweep();
        assert_eq!(light.interval_secs, 300);
        assert_eq!(light.window_minutes, 120);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: ReconConfig =
            serde_json::from_str(r#"{ "store": { "path": "prod.db" } }"#).unwrap();
        assert_eq!(cfg.store.path, "prod.db");
        assert_eq!(cfg.store.timeout_ms, 5_000);
        assert_eq!(cfg.sweep, SweepConfig::default());
        assert!(cfg.events.accepts("insert"));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut cfg = ReconConfig::default_test();
        assert!(cfg.validate().is_ok());
        cfg.sweep.interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn narrow_window_is_a_warning_not_an_error() {
        let mut cfg = ReconConfig::default_test();
        cfg.sweep.window_minutes = 1;
        cfg.sweep.max_replication_lag_secs = 120;
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.warnings().len(), 1);
    }

    #[test]
    fn deployment_parses_both_spellings() {
        assert_eq!("light-touch".parse::<Deployment>(), Ok(Deployment::LightTouch));
        assert_eq!("ALWAYS_ON".parse::<Deployment>(), Ok(Deployment::AlwaysOn));
        assert!("weekly".parse::<Deployment>().is_err());
    }

    #[test]
    fn validate_bounds_window_and_interval() {
        let mut cfg = ReconConfig::default_test();
        cfg.sweep.window_minutes = MAX_WINDOW_MINUTES;
        assert!(cfg.validate().is_ok());

        cfg.sweep.window_minutes = 4_611_686_018_427_387_903;
        assert!(cfg.validate().is_err());
        cfg.sweep.window_minutes = 0;
        assert!(cfg.validate().is_err());

        cfg.sweep.window_minutes = 30;
        cfg.sweep.interval_secs = u64::MAX;
        assert!(cfg.validate().is_err());

        cfg.sweep.interval_secs = 60;
        cfg.sweep.max_replication_lag_secs = -1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn huge_values_do_not_panic() {
        let mut cfg = ReconConfig::default_test();
        cfg.sweep.window_minutes = 4_611_686_018_427_387_903;
        assert!(cfg.warnings().is_empty());
        assert_eq!(cfg.sweep.window(), TimeDelta::minutes(MAX_WINDOW_MINUTES));

        cfg.sweep.window_minutes = 1;
        cfg.sweep.max_replication_lag_secs = i64::MAX;
        assert_eq!(cfg.warnings().len(), 1);

        cfg.sweep.window_minutes = i64::MIN;
        assert_eq!(cfg.sweep.window(), TimeDelta::minutes(1));
    }
}
