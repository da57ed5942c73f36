//! Configuration management.

use anyhow::{Context as _, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tunnelwatch::MonitorConfig;

use crate::output::OutputFormat;

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,

    /// Monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "tunnelwatch", "tunnelwatch")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

impl Config {
    /// Get the default config file path.
    pub fn path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory relative database paths are resolved against.
    pub fn data_dir() -> Result<PathBuf> {
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    /// Load configuration from `path`, or the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::path()?,
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.monitor.validate()?;

        Ok(config)
    }

    /// Save configuration to `path`, or the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::path()?,
        };

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Apply `key = value`. Returns the canonical key name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<&'static str> {
        let monitor = &mut self.monitor;
        let canonical = match key {
            "api_key" => {
                monitor.host_intel.api_key = Some(value.to_string());
                "api_key"
            }
            "host_intel_url" => {
                monitor.host_intel.base_url = value.to_string();
                "host_intel_url"
            }
            "output_format" | "output" => {
                self.output_format = Some(value.parse()?);
                "output_format"
            }
            "log_path" | "log" => {
                monitor.log_path = PathBuf::from(value);
                "log_path"
            }
            "database" | "db" => {
                monitor.database = PathBuf::from(value);
                "database"
            }
            "interface" => {
                monitor.interface = Some(value.to_string());
                "interface"
            }
            "port" => {
                monitor.port = value.parse()?;
                "port"
            }
            "tail_lines" => {
                monitor.tail_lines = value.parse()?;
                "tail_lines"
            }
            "refresh_interval" | "refresh_interval_secs" => {
                monitor.refresh_interval_secs = value.parse()?;
                "refresh_interval_secs"
            }
            "query_window" => {
                monitor.query_window = value.parse()?;
                "query_window"
            }
            "whois_server" => {
                monitor.whois_server = value.to_string();
                "whois_server"
            }
            _ => anyhow::bail!(
                "Unknown config key: {key}\n\n\
                 Available keys:\n  \
                 api_key          - Host-intelligence API key (geolocation)\n  \
                 host_intel_url   - Host-intelligence API base URL\n  \
                 output_format    - Default output format (pretty/json/csv/yaml)\n  \
                 log_path         - Firewall log to read\n  \
                 database         - Flow database path\n  \
                 interface        - Capture interface\n  \
                 port             - Destination port to watch\n  \
                 tail_lines       - Log lines examined per refresh\n  \
                 refresh_interval - Seconds between automatic refreshes\n  \
                 query_window     - Records loaded per refresh\n  \
                 whois_server     - ASN whois server (host:port)"
            ),
        };
        self.monitor.validate()?;
        Ok(canonical)
    }
}
