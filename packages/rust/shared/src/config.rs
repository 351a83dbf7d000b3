//! Application configuration for riskflow.
//!
//! User config lives at `~/.riskflow/riskflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, RiskflowError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "riskflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".riskflow";

// ---------------------------------------------------------------------------
// Config structs (matching riskflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Analysis backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Estimated-progress pacing.
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Where saved outputs are written.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the analysis service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of an env var that, when set, overrides `base_url`.
    #[serde(default = "default_base_url_env")]
    pub base_url_env: String,

    /// Path of the risk-analysis endpoint (`/risks/analyze` or `/api/risks/analyze`).
    #[serde(default = "default_risks_path")]
    pub risks_path: String,

    /// Per-request deadline in seconds. `0` disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            base_url_env: default_base_url_env(),
            risks_path: default_risks_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}
fn default_base_url_env() -> String {
    "RISKFLOW_BACKEND_URL".into()
}
fn default_risks_path() -> String {
    "/risks/analyze".into()
}
fn default_timeout_secs() -> u64 {
    600
}

/// `[progress]` section: seconds between scripted status messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_slow_interval")]
    pub extraction_interval_secs: u64,

    #[serde(default = "default_fast_interval")]
    pub feedback_interval_secs: u64,

    #[serde(default = "default_slow_interval")]
    pub risks_interval_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            extraction_interval_secs: default_slow_interval(),
            feedback_interval_secs: default_fast_interval(),
            risks_interval_secs: default_slow_interval(),
        }
    }
}

impl ProgressConfig {
    pub fn extraction_interval(&self) -> Duration {
        Duration::from_secs(self.extraction_interval_secs)
    }

    pub fn feedback_interval(&self) -> Duration {
        Duration::from_secs(self.feedback_interval_secs)
    }

    pub fn risks_interval(&self) -> Duration {
        Duration::from_secs(self.risks_interval_secs)
    }
}

fn default_slow_interval() -> u64 {
    10
}
fn default_fast_interval() -> u64 {
    5
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory that saved reports are written to.
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}

// ---------------------------------------------------------------------------
// Backend settings (runtime, merged from config + env + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime backend configuration, resolved from the config file, the
/// override env var, and CLI flags.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL every endpoint path is joined onto.
    pub base_url: Url,
    /// Path of the risk-analysis endpoint.
    pub risks_path: String,
    /// Per-request deadline, if any.
    pub timeout: Option<Duration>,
}

impl BackendSettings {
    /// Resolve settings from config, reading the override env var.
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        let from_env = std::env::var(&config.backend.base_url_env).ok();
        Self::resolve_with(config, from_env.as_deref())
    }

    /// Resolve settings from config with an explicit base URL override.
    pub fn resolve_with(config: &AppConfig, base_url_override: Option<&str>) -> Result<Self> {
        let raw = match base_url_override.map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => config.backend.base_url.as_str(),
        };

        let base_url = Url::parse(raw)
            .map_err(|e| RiskflowError::config(format!("invalid backend URL '{raw}': {e}")))?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(RiskflowError::config(format!(
                "backend URL must be http or https, got '{raw}'"
            )));
        }

        let timeout = match config.backend.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            base_url,
            risks_path: config.backend.risks_path.clone(),
            timeout,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.riskflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RiskflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.riskflow/riskflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RiskflowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RiskflowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RiskflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| RiskflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RiskflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("RISKFLOW_BACKEND_URL"));
        assert!(toml_str.contains("/risks/analyze"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[backend]
base_url = "https://analysis.internal:9000"
risks_path = "/api/risks/analyze"

[progress]
feedback_interval_secs = 2
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.backend.risks_path, "/api/risks/analyze");
        assert_eq!(config.backend.timeout_secs, 600);
        assert_eq!(config.progress.feedback_interval(), Duration::from_secs(2));
        assert_eq!(config.progress.extraction_interval(), Duration::from_secs(10));
        assert_eq!(config.output.dir, ".");
    }

    #[test]
    fn settings_from_defaults() {
        let settings = BackendSettings::resolve_with(&AppConfig::default(), None).unwrap();
        assert_eq!(settings.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(settings.risks_path, "/risks/analyze");
        assert_eq!(settings.timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn override_wins_over_config() {
        let settings =
            BackendSettings::resolve_with(&AppConfig::default(), Some("http://10.0.0.5:8080"))
                .unwrap();
        assert_eq!(settings.base_url.as_str(), "http://10.0.0.5:8080/");

        // Blank overrides are ignored
        let settings = BackendSettings::resolve_with(&AppConfig::default(), Some("  ")).unwrap();
        assert_eq!(settings.base_url.as_str(), "http://localhost:8000/");
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let mut config = AppConfig::default();
        config.backend.timeout_secs = 0;
        let settings = BackendSettings::resolve_with(&config, None).unwrap();
        assert!(settings.timeout.is_none());
    }

    #[test]
    fn rejects_invalid_urls() {
        let mut config = AppConfig::default();
        config.backend.base_url = "not a url".into();
        assert!(BackendSettings::resolve_with(&config, None).is_err());

        config.backend.base_url = "ftp://example.com".into();
        let err = BackendSettings::resolve_with(&config, None).unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[output]\ndir = \"/tmp/reports\"\n").unwrap();

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.output.dir, "/tmp/reports");
        assert_eq!(config.backend.base_url, "http://localhost:8000");

        std::fs::write(&path, "[backend\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
