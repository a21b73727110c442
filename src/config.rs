use std::path::PathBuf;
use std::time::Duration;

use crate::model::{Ms, MINUTE_MS};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_RESERVED_LOOKAHEAD_MS: Ms = 120 * MINUTE_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How far ahead a confirmed check-in marks a room `reserved`.
    pub reserved_lookahead_ms: Ms,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reserved_lookahead_ms: DEFAULT_RESERVED_LOOKAHEAD_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Delay between `start()` and the first tick.
    pub startup_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            startup_delay: DEFAULT_STARTUP_DELAY,
        }
    }
}

/// Settings for the daemon, read from `ROOMWATCH_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub scheduler: SchedulerConfig,
    pub data_file: PathBuf,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }

        let tick_interval = parsed::<u64>(&lookup, "ROOMWATCH_TICK_INTERVAL_SECS")
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TICK_INTERVAL);
        let startup_delay = parsed::<u64>(&lookup, "ROOMWATCH_STARTUP_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_STARTUP_DELAY);
        let reserved_lookahead_ms = parsed::<i64>(&lookup, "ROOMWATCH_RESERVED_LOOKAHEAD_MINS")
            .filter(|&m| m >= 0)
            .map(|m| m * MINUTE_MS)
            .unwrap_or(DEFAULT_RESERVED_LOOKAHEAD_MS);
        let data_file = lookup("ROOMWATCH_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/hotel.json"));
        let metrics_port = parsed::<u16>(&lookup, "ROOMWATCH_METRICS_PORT");

        Self {
            engine: EngineConfig { reserved_lookahead_ms },
            scheduler: SchedulerConfig {
                tick_interval,
                startup_delay,
            },
            data_file,
            metrics_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg.scheduler, SchedulerConfig::default());
        assert_eq!(cfg.engine.reserved_lookahead_ms, 2 * 60 * 60 * 1000);
        assert_eq!(cfg.scheduler.tick_interval, Duration::from_secs(60));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.data_file, PathBuf::from("./data/hotel.json"));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = Config::from_lookup(lookup(&[
            ("ROOMWATCH_TICK_INTERVAL_SECS", "15"),
            ("ROOMWATCH_STARTUP_DELAY_MS", "0"),
            ("ROOMWATCH_RESERVED_LOOKAHEAD_MINS", "30"),
            ("ROOMWATCH_DATA_FILE", "/tmp/h.json"),
            ("ROOMWATCH_METRICS_PORT", "9100"),
        ]));
        assert_eq!(cfg.scheduler.tick_interval, Duration::from_secs(15));
        assert_eq!(cfg.scheduler.startup_delay, Duration::ZERO);
        assert_eq!(cfg.engine.reserved_lookahead_ms, 30 * MINUTE_MS);
        assert_eq!(cfg.data_file, PathBuf::from("/tmp/h.json"));
        assert_eq!(cfg.metrics_port, Some(9100));
    }

    #[test]
    fn garbage_falls_back() {
        let cfg = Config::from_lookup(lookup(&[
            ("ROOMWATCH_TICK_INTERVAL_SECS", "0"),
            ("ROOMWATCH_RESERVED_LOOKAHEAD_MINS", "-5"),
            ("ROOMWATCH_METRICS_PORT", "not-a-port"),
        ]));
        assert_eq!(cfg.scheduler.tick_interval, DEFAULT_TICK_INTERVAL);
        assert_eq!(cfg.engine.reserved_lookahead_ms, DEFAULT_RESERVED_LOOKAHEAD_MS);
        assert_eq!(cfg.metrics_port, None);
    }
}
