//! Runtime configuration for the parsing pipeline.

use std::env;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_TIME_ZONE: &str = "America/Los_Angeles";
pub const DEFAULT_MAX_DEPTH: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct MotifConfig {
    /// Timezone applied to date-time quantum and ordinal functions that do
    /// not name one explicitly.
    pub default_time_zone: String,
    /// Maximum nesting depth the parser accepts before reporting
    /// `expression too deep`.
    pub max_depth: usize,
    /// Directory scanned once for `*.motif` schema files.
    pub schema_dir: Option<PathBuf>,
}

impl Default for MotifConfig {
    fn default() -> Self {
        MotifConfig {
            default_time_zone: DEFAULT_TIME_ZONE.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            schema_dir: None,
        }
    }
}

impl MotifConfig {
    /// Defaults overridden by `MOTIF_TIME_ZONE`, `MOTIF_MAX_DEPTH` and
    /// `MOTIF_SCHEMA_DIR`.
    pub fn from_env() -> Self {
        let mut config = MotifConfig::default();

        if let Ok(tz) = env::var("MOTIF_TIME_ZONE")
            && !tz.trim().is_empty()
        {
            config.default_time_zone = tz.trim().to_string();
        }

        if let Ok(depth) = env::var("MOTIF_MAX_DEPTH") {
            match depth.trim().parse::<usize>() {
                Ok(d) if d > 0 => config.max_depth = d,
                _ => warn!(value = %depth, "ignoring invalid MOTIF_MAX_DEPTH"),
            }
        }

        if let Ok(dir) = env::var("MOTIF_SCHEMA_DIR")
            && !dir.trim().is_empty()
        {
            config.schema_dir = Some(PathBuf::from(dir.trim()));
        }

        config
    }

    pub fn with_time_zone(mut self, tz: impl Into<String>) -> Self {
        self.default_time_zone = tz.into();
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = Some(dir.into());
        self
    }
}

#[test]
fn test_defaults() {
    let config = MotifConfig::default();
    assert_eq!(config.default_time_zone, "America/Los_Angeles");
    assert_eq!(config.max_depth, 200);
    assert!(config.schema_dir.is_none());
}

#[test]
fn test_builders() {
    let config = MotifConfig::default()
        .with_time_zone("UTC")
        .with_max_depth(16);
    assert_eq!(config.default_time_zone, "UTC");
    assert_eq!(config.max_depth, 16);
}
