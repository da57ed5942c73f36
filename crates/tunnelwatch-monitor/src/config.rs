//! Monitor configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tunnelwatch_core::{MonitorError, Result};
use tunnelwatch_lookup::{DEFAULT_ARP_TABLE, DEFAULT_HOST_INTEL_URL, DEFAULT_WHOIS_SERVER};

/// Teredo's well-known UDP port
pub const TEREDO_PORT: u16 = 3544;

/// Configuration for a flow monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Firewall log to tail on every refresh.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// How many trailing log lines each refresh examines.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,

    /// Destination port of interest (log filter and capture filter).
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database holding the flow history.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Capture interface (default: libpcap's default device).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Candidates buffered between the capture thread and enrichment.
    #[serde(default = "default_capture_queue")]
    pub capture_queue: usize,

    /// Maximum enrichments running at once per ingestion path.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Automatic refresh period (seconds).
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Most recent records loaded per refresh.
    #[serde(default = "default_query_window")]
    pub query_window: usize,

    /// Deadline for each enrichment lookup (seconds).
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,

    /// Whois server used for ASN ownership (`host:port`).
    #[serde(default = "default_whois_server")]
    pub whois_server: String,

    /// Neighbour table read by LAN discovery.
    #[serde(default = "default_arp_table")]
    pub arp_table: PathBuf,

    /// Host-intelligence service used for geolocation.
    #[serde(default)]
    pub host_intel: HostIntelConfig,
}

/// Host-intelligence service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostIntelConfig {
    /// API base URL.
    #[serde(default = "default_host_intel_url")]
    pub base_url: String,

    /// API key. Geolocation is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request budget (requests per second).
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            tail_lines: default_tail_lines(),
            port: default_port(),
            database: default_database(),
            interface: None,
            capture_queue: default_capture_queue(),
            max_in_flight: default_max_in_flight(),
            refresh_interval_secs: default_refresh_interval(),
            query_window: default_query_window(),
            lookup_timeout_secs: default_lookup_timeout(),
            whois_server: default_whois_server(),
            arp_table: default_arp_table(),
            host_intel: HostIntelConfig::default(),
        }
    }
}

impl Default for HostIntelConfig {
    fn default() -> Self {
        Self {
            base_url: default_host_intel_url(),
            api_key: None,
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl MonitorConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self =
                toml::from_str(&content).map_err(|e| MonitorError::Config(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(MonitorError::Config("port must be non-zero".into()));
        }
        for (name, value) in [
            ("tail_lines", self.tail_lines),
            ("capture_queue", self.capture_queue),
            ("max_in_flight", self.max_in_flight),
            ("query_window", self.query_window),
        ] {
            if value == 0 {
                return Err(MonitorError::Config(format!("{name} must be at least 1")));
            }
        }
        if self.refresh_interval_secs == 0 || self.lookup_timeout_secs == 0 {
            return Err(MonitorError::Config(
                "refresh_interval_secs and lookup_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Automatic refresh period.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Per-lookup deadline.
    #[must_use]
    pub const fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    /// BPF expression applied to the capture interface.
    #[must_use]
    pub fn capture_filter(&self) -> String {
        format!("udp and dst port {}", self.port)
    }
}

// Default value functions for serde.
fn default_log_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Windows\System32\LogFiles\Firewall\pfirewall.log")
    } else {
        PathBuf::from("/var/log/tunnelwatch/firewall.log")
    }
}

const fn default_tail_lines() -> usize {
    500
}

const fn default_port() -> u16 {
    TEREDO_PORT
}

fn default_database() -> PathBuf {
    PathBuf::from("flows.db")
}

const fn default_capture_queue() -> usize {
    1024
}

const fn default_max_in_flight() -> usize {
    32
}

const fn default_refresh_interval() -> u64 {
    30
}

const fn default_query_window() -> usize {
    1000
}

const fn default_lookup_timeout() -> u64 {
    5
}

fn default_whois_server() -> String {
    String::from(DEFAULT_WHOIS_SERVER)
}

fn default_arp_table() -> PathBuf {
    PathBuf::from(DEFAULT_ARP_TABLE)
}

fn default_host_intel_url() -> String {
    String::from(DEFAULT_HOST_INTEL_URL)
}

const fn default_requests_per_second() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.port, 3544);
        assert_eq!(config.tail_lines, 500);
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.capture_filter(), "udp and dst port 3544");
        assert!(config.host_intel.api_key.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = MonitorConfig::load(Path::new("/nonexistent/tunnelwatch.toml")).unwrap();
        assert_eq!(config.query_window, 1000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmpfile,
            r#"
            tail_lines = 50
            interface = "eth0"

            [host_intel]
            api_key = "abc"
            "#
        )
        .unwrap();

        let config = MonitorConfig::load(tmpfile.path()).unwrap();
        assert_eq!(config.tail_lines, 50);
        assert_eq!(config.interface.as_deref(), Some("eth0"));
        assert_eq!(config.host_intel.api_key.as_deref(), Some("abc"));
        // Other fields keep their defaults.
        assert_eq!(config.port, 3544);
        assert_eq!(config.host_intel.base_url, DEFAULT_HOST_INTEL_URL);
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "max_in_flight = 0").unwrap();
        let err = MonitorConfig::load(tmpfile.path()).unwrap_err();
        assert!(err.to_string().contains("max_in_flight"));
    }

    #[test]
    fn test_config_serialization() {
        let config = MonitorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.whois_server, config.whois_server);
    }
}
