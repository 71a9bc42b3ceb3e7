//! Persistence, logging setup and timing helpers

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{EmlpError, Result};

/// Save object to JSON file
pub fn save_json<T: Serialize>(obj: &T, path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(obj)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Load object from JSON file
pub fn load_json<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    let obj = serde_json::from_str(&contents)?;
    Ok(obj)
}

/// Map a configured verbosity name onto a tracing level.
///
/// `critical` has no tracing counterpart and maps to `ERROR`.
pub fn parse_log_level(name: &str) -> Result<LevelFilter> {
    match name.trim().to_ascii_lowercase().as_str() {
        "critical" | "error" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        _ => Err(EmlpError::UnknownName {
            kind: "log level",
            name: name.to_string(),
        }),
    }
}

/// A formatting subscriber at `level`, overridable through `RUST_LOG`
pub fn build_subscriber(level: LevelFilter) -> impl tracing::Subscriber + Send + Sync {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish()
}

/// Timing utilities
pub mod timing {
    use std::time::{Duration, Instant};
    use tracing::debug;

    /// Named wall-clock timer that reports when dropped
    pub struct Timer {
        start: Instant,
        name: String,
    }

    impl Timer {
        /// Start new timer
        pub fn new(name: impl Into<String>) -> Self {
            Timer {
                start: Instant::now(),
                name: name.into(),
            }
        }

        /// Get elapsed time
        pub fn elapsed(&self) -> Duration {
            self.start.elapsed()
        }
    }

    impl Drop for Timer {
        fn drop(&mut self) {
            debug!("{}: {:.3}s", self.name, self.elapsed().as_secs_f64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_log_levels() {
        assert_eq!(parse_log_level("critical").unwrap(), LevelFilter::ERROR);
        assert_eq!(parse_log_level("warning").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_log_level("WARN").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_log_level("debug").unwrap(), LevelFilter::DEBUG);
        assert!(matches!(
            parse_log_level("trace-ish"),
            Err(EmlpError::UnknownName { kind: "log level", .. })
        ));
    }

    #[test]
    fn test_json_round_trip_on_disk() {
        let dir = std::env::temp_dir().join(format!("emlp-seq-utils-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        let mut state = BTreeMap::new();
        state.insert("mses".to_string(), vec![0.5, 0.25]);
        save_json(&state, &path).unwrap();
        let loaded: BTreeMap<String, Vec<f64>> = load_json(&path).unwrap();
        assert_eq!(loaded, state);

        assert!(matches!(load_json::<BTreeMap<String, f64>>(dir.join("missing.json")), Err(EmlpError::Io(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_timer_measures() {
        let timer = timing::Timer::new("noop");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.elapsed().as_millis() >= 2);
    }
}
