use anyhow::{anyhow, ensure, Context, Result};
use chrono::FixedOffset;
use core::fmt;
use duration_string::DurationString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::geo::{LatLng, DEFAULT_MINIMUM_RADIUS_M, DEFAULT_SIDES};

pub const SWEEP_INTERVAL_ENV: &str = "NAKA_SWEEP_INTERVAL";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub sweep_interval: DurationString,
    pub default_radius_m: f64,
    pub minimum_radius_m: f64,
    pub polygon_sides: usize,
    /// Offset applied to assignment times given without a zone. IST by
    /// default.
    pub utc_offset_minutes: i32,
    pub recent_activity_limit: usize,
    pub map: MapConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub center: LatLng,
    pub zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: LatLng::new(15.2993, 74.1240),
            zoom: 11,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval: DurationString::new(Duration::from_secs(60)),
            default_radius_m: 200.0,
            minimum_radius_m: DEFAULT_MINIMUM_RADIUS_M,
            polygon_sides: DEFAULT_SIDES,
            utc_offset_minutes: 330,
            recent_activity_limit: 10,
            map: MapConfig::default(),
            database_url: None,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sweeping every {:?}, {}m default radius ({}m minimum, {} sides)",
            self.sweep_interval(),
            self.default_radius_m,
            self.minimum_radius_m,
            self.polygon_sides
        )
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Reads `path` when given, applies environment overrides and validates
    /// the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(SWEEP_INTERVAL_ENV) {
            self.sweep_interval = DurationString::try_from(value.clone())
                .map_err(|e| anyhow!("Invalid {} '{}': {}", SWEEP_INTERVAL_ENV, value, e))?;
        }

        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.database_url = Some(url);
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.sweep_interval().is_zero(), "sweep_interval must be greater than zero");
        ensure!(
            self.minimum_radius_m.is_finite() && self.minimum_radius_m > 0.0,
            "minimum_radius_m must be positive"
        );
        ensure!(
            self.default_radius_m.is_finite() && self.default_radius_m >= self.minimum_radius_m,
            "default_radius_m must be at least minimum_radius_m"
        );
        ensure!(self.polygon_sides >= 3, "polygon_sides must be at least 3");
        self.utc_offset()?;
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval.clone().into()
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .with_context(|| format!("utc_offset_minutes {} is out of range", self.utc_offset_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.default_radius_m, 200.0);
        assert_eq!(config.minimum_radius_m, 50.0);
        assert_eq!(config.polygon_sides, 16);
        assert_eq!(config.map.zoom, 11);
        assert_eq!(config.utc_offset().unwrap().local_minus_utc(), 330 * 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sweep_interval: 30s\ndefault_radius_m: 350\nmap:\n  zoom: 13").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.default_radius_m, 350.0);
        assert_eq!(config.map.zoom, 13);
        assert_eq!(config.map.center, LatLng::new(15.2993, 74.1240));
        assert_eq!(config.recent_activity_limit, 10);
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.polygon_sides, 16);
    }

    #[test]
    fn test_missing_file_errors() {
        let err = Config::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.polygon_sides = 2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.default_radius_m = 10.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(SWEEP_INTERVAL_ENV, "5m");
        std::env::set_var(DATABASE_URL_ENV, "postgres://localhost/naka");

        let config = Config::load(None).unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/naka"));

        std::env::remove_var(SWEEP_INTERVAL_ENV);
        std::env::remove_var(DATABASE_URL_ENV);
    }

    #[test]
    #[serial]
    fn test_invalid_env_interval() {
        std::env::set_var(SWEEP_INTERVAL_ENV, "soon");
        let result = Config::load(None);
        std::env::remove_var(SWEEP_INTERVAL_ENV);

        assert!(result.is_err());
    }
}
