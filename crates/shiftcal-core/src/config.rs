use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::datetime::{parse_time_zone, parse_weekday_name};

const CONFIG_FILE: &str = "shiftcal.toml";
const CONFIG_DIR: &str = "shiftcal";
const CONFIG_ENV_VAR: &str = "SHIFTCAL_CONFIG";
const TIMEZONE_ENV_VAR: &str = "SHIFTCAL_TIMEZONE";

pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_WEEK_START: &str = "sunday";
pub const DEFAULT_NUM_WEEKS: u32 = 6;
pub const DEFAULT_SCROLL_HYST_WEEKS: u32 = 2;
pub const DEFAULT_THROTTLE_MS: u64 = 500;
pub const DEFAULT_WEEKS_BUFFER: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub timezone: String,
    pub view: ViewConfig,
    pub loader: LoaderConfig,

    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub week_start: String,
    pub num_weeks: u32,
    pub scroll_hyst_weeks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub throttle_ms: u64,
    pub weeks_buffer: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            view: ViewConfig::default(),
            loader: LoaderConfig::default(),
            loaded_from: None,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            week_start: DEFAULT_WEEK_START.to_string(),
            num_weeks: DEFAULT_NUM_WEEKS,
            scroll_hyst_weeks: DEFAULT_SCROLL_HYST_WEEKS,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            throttle_ms: DEFAULT_THROTTLE_MS,
            weeks_buffer: DEFAULT_WEEKS_BUFFER,
        }
    }
}

impl CalendarConfig {
    #[tracing::instrument(skip(config_override))]
    pub fn load(config_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match resolve_config_path(config_override)? {
            Some(path) => {
                info!(config = %path.display(), "loading calendar config");
                Self::from_file(&path)?
            }
            None => {
                warn!("no calendar config found; using defaults");
                Self::default()
            }
        };

        cfg.apply_env_with(|key| std::env::var(key).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    #[tracing::instrument]
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        cfg.loaded_from = Some(path.to_path_buf());
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let mut cfg: CalendarConfig =
            toml::from_str(raw).map_err(|e| anyhow!("invalid calendar config: {e}"))?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(TIMEZONE_ENV_VAR) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                debug!(timezone = %trimmed, source = TIMEZONE_ENV_VAR, "time zone override");
                self.timezone = trimmed.to_string();
            }
        }
    }

    pub fn week_start(&self) -> Weekday {
        parse_weekday_name(&self.view.week_start).unwrap_or(Weekday::Sun)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.loader.throttle_ms)
    }

    pub fn sanitize(&mut self) {
        if parse_time_zone(&self.timezone).is_err() {
            warn!(timezone = %self.timezone, "unknown time zone in config; using {DEFAULT_TIMEZONE}");
            self.timezone = DEFAULT_TIMEZONE.to_string();
        }

        if parse_weekday_name(&self.view.week_start).is_none() {
            warn!(week_start = %self.view.week_start, "unknown week start; using default");
            self.view.week_start = DEFAULT_WEEK_START.to_string();
        }

        if self.view.num_weeks == 0 {
            self.view.num_weeks = DEFAULT_NUM_WEEKS;
        }

        if self.view.scroll_hyst_weeks >= self.view.num_weeks {
            warn!(
                hyst = self.view.scroll_hyst_weeks,
                num_weeks = self.view.num_weeks,
                "hysteresis must leave a visible week; clamping"
            );
            self.view.scroll_hyst_weeks = self
                .view
                .num_weeks
                .saturating_sub(1)
                .min(DEFAULT_SCROLL_HYST_WEEKS);
        }
    }
}

#[tracing::instrument(skip(override_path))]
fn resolve_config_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(raw) = std::env::var(CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Ok(Some(PathBuf::from(trimmed)));
        }
    }

    let Some(config_dir) = dirs::config_dir() else {
        debug!("cannot determine config directory");
        return Ok(None);
    };
    let candidate = config_dir.join(CONFIG_DIR).join(CONFIG_FILE);
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::Weekday;
    use tempfile::NamedTempFile;

    use super::CalendarConfig;

    #[test]
    fn defaults_match_month_view() {
        let cfg = CalendarConfig::default();
        assert_eq!(cfg.view.num_weeks, 6);
        assert_eq!(cfg.view.scroll_hyst_weeks, 2);
        assert_eq!(cfg.week_start(), Weekday::Sun);
        assert_eq!(cfg.throttle().as_millis(), 500);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg = CalendarConfig::from_toml_str(
            r#"
timezone = "Europe/Berlin"

[view]
week_start = "monday"
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.timezone, "Europe/Berlin");
        assert_eq!(cfg.week_start(), Weekday::Mon);
        assert_eq!(cfg.view.num_weeks, 6);
        assert_eq!(cfg.loader.weeks_buffer, 1);
    }

    #[test]
    fn sanitizes_bad_values() {
        let cfg = CalendarConfig::from_toml_str(
            r#"
timezone = "Nowhere/Special"

[view]
week_start = "funday"
num_weeks = 0
scroll_hyst_weeks = 9
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.timezone, "UTC");
        assert_eq!(cfg.week_start(), Weekday::Sun);
        assert_eq!(cfg.view.num_weeks, 6);
        assert_eq!(cfg.view.scroll_hyst_weeks, 2);
    }

    #[test]
    fn env_overrides_time_zone() {
        let mut cfg = CalendarConfig::default();
        cfg.apply_env_with(|key| (key == "SHIFTCAL_TIMEZONE").then(|| "Asia/Tokyo".to_string()));
        assert_eq!(cfg.timezone, "Asia/Tokyo");
    }

    #[test]
    fn loads_explicit_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[loader]\nthrottle_ms = 250").expect("write config");

        let cfg = CalendarConfig::load(Some(file.path())).expect("load config");
        assert_eq!(cfg.throttle().as_millis(), 250);
        assert_eq!(cfg.loaded_from.as_deref(), Some(file.path()));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        assert!(CalendarConfig::load(Some(&missing)).is_err());
    }
}
