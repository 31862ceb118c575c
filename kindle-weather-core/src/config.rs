use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    allowlist::{DEFAULT_ICONS, IconAllowlist},
    install::FileMode,
    render::OutputFormat,
};

pub const DEFAULT_ENDPOINT: &str =
    "https://graphical.weather.gov/xml/SOAP_server/ndfdSOAPclientByDay.php";

/// The NDFD by-day service forecasts at most a week ahead.
pub const MAX_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Imperial,
    Metric,
}

impl Units {
    /// Value of the NDFD `Unit` query parameter.
    pub fn ndfd_code(&self) -> &'static str {
        match self {
            Units::Imperial => "e",
            Units::Metric => "m",
        }
    }
}

/// Where and how to fetch the forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub latitude: f64,
    pub longitude: f64,
    pub num_days: usize,
    pub units: Units,
    pub timeout_secs: u64,
    pub max_body_bytes: u64,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            latitude: 38.7197,
            longitude: -77.1546,
            num_days: 4,
            units: Units::Imperial,
            timeout_secs: 15,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub destination: PathBuf,
    pub mode: FileMode,
    pub format: OutputFormat,

    /// Custom SVG template; the built-in layout is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("weather-script-output.svg"),
            mode: FileMode::default(),
            format: OutputFormat::Svg,
            template: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconsConfig {
    pub allowlist: Vec<String>,
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self { allowlist: DEFAULT_ICONS.iter().map(|s| s.to_string()).collect() }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [provider]
/// latitude = 38.7197
/// longitude = -77.1546
///
/// [output]
/// destination = "/mnt/us/weather/weather.svg"
/// mode = "644"
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub output: OutputConfig,
    pub icons: IconsConfig,
}

impl Config {
    /// Load config from the platform config directory, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from an explicit path. Unlike [`Config::load`], a missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config directory.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "kindle-weather", "kindle-weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Check value ranges that serde alone cannot express.
    pub fn validate(&self) -> Result<()> {
        let p = &self.provider;

        if !(1..=MAX_DAYS).contains(&p.num_days) {
            bail!("provider.num_days must be between 1 and {MAX_DAYS}, got {}", p.num_days);
        }
        if !(-90.0..=90.0).contains(&p.latitude) || !(-180.0..=180.0).contains(&p.longitude) {
            bail!(
                "Invalid coordinates ({}, {}): latitude must be -90 to 90, longitude must be -180 to 180",
                p.latitude,
                p.longitude
            );
        }
        if p.timeout_secs == 0 {
            bail!("provider.timeout_secs must be greater than zero");
        }
        if p.max_body_bytes == 0 {
            bail!("provider.max_body_bytes must be greater than zero");
        }

        self.icon_allowlist()?;

        Ok(())
    }

    pub fn icon_allowlist(&self) -> Result<IconAllowlist> {
        IconAllowlist::new(self.icons.allowlist.iter().cloned())
            .context("Invalid [icons] allowlist in configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("defaults must validate");

        assert_eq!(cfg.provider.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.provider.num_days, 4);
        assert_eq!(cfg.provider.timeout(), Duration::from_secs(15));
        assert_eq!(cfg.output.mode, FileMode::default());
        assert!(cfg.icon_allowlist().unwrap().contains("na"));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [provider]
            latitude = 47.6
            longitude = -122.3
            units = "metric"

            [output]
            destination = "/mnt/us/weather.png"
            mode = "0600"
            format = "png"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.provider.latitude, 47.6);
        assert_eq!(cfg.provider.units, Units::Metric);
        assert_eq!(cfg.provider.num_days, 4);
        assert_eq!(cfg.output.mode.bits(), 0o600);
        assert_eq!(cfg.output.format, OutputFormat::Png);
        assert_eq!(cfg.icons, IconsConfig::default());
    }

    #[test]
    fn invalid_mode_fails_to_parse() {
        let err = toml::from_str::<Config>("[output]\nmode = \"rwx\"\n").unwrap_err();
        assert!(err.to_string().contains("invalid file mode"));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.provider.num_days = 8;
        assert!(cfg.validate().unwrap_err().to_string().contains("num_days"));

        let mut cfg = Config::default();
        cfg.provider.latitude = 91.0;
        assert!(cfg.validate().unwrap_err().to_string().contains("Invalid coordinates"));

        let mut cfg = Config::default();
        cfg.provider.timeout_secs = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("timeout_secs"));
    }

    #[test]
    fn validate_rejects_malformed_allowlist() {
        let mut cfg = Config::default();
        cfg.icons.allowlist.push("<script>".into());

        let err = cfg.validate().unwrap_err();
        assert!(format!("{err:#}").contains("'<script>'"));
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.provider.num_days = 3;
        cfg.output.template = Some(PathBuf::from("/etc/kindle-weather/template.svg"));
        cfg.icons.allowlist = vec!["skc".into(), "na".into()];

        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn load_from_missing_file_is_an_error() {
        let err = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
