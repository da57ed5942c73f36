//! Output formatting for different formats.

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tunnelwatch::{format_timestamp, Device, EnrichedRecord, MinuteBucket, NetworkOwner};

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed tables with colors
    #[default]
    Pretty,
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// YAML output
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "table" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => anyhow::bail!(
                "Unknown output format: {}\n\
                 Valid formats: pretty, json, csv, yaml",
                s
            ),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

/// One flow as a flat row (table and CSV).
#[derive(Debug, Tabled, Serialize)]
pub struct FlowRow {
    #[tabled(rename = "Time")]
    pub timestamp: String,
    #[tabled(rename = "Source")]
    pub src: String,
    #[tabled(rename = "Destination")]
    pub dst: String,
    #[tabled(rename = "PID")]
    pub pid: String,
    #[tabled(rename = "Executable")]
    pub exe: String,
    #[tabled(rename = "ASN")]
    pub asn: String,
    #[tabled(rename = "Owner")]
    pub org: String,
    #[tabled(rename = "Lat")]
    pub lat: String,
    #[tabled(rename = "Lon")]
    pub lon: String,
}

impl From<&EnrichedRecord> for FlowRow {
    fn from(r: &EnrichedRecord) -> Self {
        Self {
            timestamp: format_timestamp(&r.observed_at),
            src: r.src.to_string(),
            dst: r.dst.to_string(),
            pid: r.pid.map(|p| p.to_string()).unwrap_or_default(),
            exe: r.exe.clone().unwrap_or_default(),
            asn: r.asn().map(|a| a.to_string()).unwrap_or_default(),
            org: r.org().unwrap_or_default().to_string(),
            lat: r.lat().map(|v| format!("{v:.4}")).unwrap_or_default(),
            lon: r.lon().map(|v| format!("{v:.4}")).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Tabled, Serialize)]
struct MinuteRow {
    #[tabled(rename = "Minute")]
    minute: String,
    #[tabled(rename = "Flows")]
    count: usize,
}

#[derive(Debug, Tabled, Serialize)]
struct AsnRow {
    #[tabled(rename = "ASN")]
    asn: u32,
    #[tabled(rename = "Owner")]
    name: String,
}

#[derive(Debug, Tabled, Serialize)]
struct DeviceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Hardware")]
    hw_addr: String,
    #[tabled(rename = "Name")]
    name: String,
}

/// Print `value` as JSON or YAML. Returns false for table formats.
pub fn print_structured<T: Serialize + ?Sized>(format: OutputFormat, value: &T) -> Result<bool> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Pretty | OutputFormat::Csv => return Ok(false),
    }
    Ok(true)
}

fn print_rows<R: Tabled + Serialize>(format: OutputFormat, rows: &[R], empty: &str) -> Result<()> {
    match format {
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        _ if rows.is_empty() => println!("{}", empty.dimmed()),
        _ => println!("{}", Table::new(rows).with(Style::rounded())),
    }
    Ok(())
}

/// Flows, newest first
pub fn print_flows(format: OutputFormat, records: &[EnrichedRecord]) -> Result<()> {
    if print_structured(format, records)? {
        return Ok(());
    }
    let rows: Vec<FlowRow> = records.iter().map(FlowRow::from).collect();
    print_rows(format, &rows, "No flows recorded.")
}

/// Per-minute series, oldest first
pub fn print_series(format: OutputFormat, series: &[MinuteBucket]) -> Result<()> {
    if print_structured(format, series)? {
        return Ok(());
    }
    let rows: Vec<MinuteRow> = series
        .iter()
        .map(|b| MinuteRow {
            minute: format_timestamp(&b.minute),
            count: b.count,
        })
        .collect();
    print_rows(format, &rows, "No flows recorded.")
}

/// ASN vocabulary
pub fn print_vocabulary(format: OutputFormat, owners: &[NetworkOwner]) -> Result<()> {
    if print_structured(format, owners)? {
        return Ok(());
    }
    let rows: Vec<AsnRow> = owners
        .iter()
        .map(|o| AsnRow {
            asn: o.asn,
            name: o.name.clone(),
        })
        .collect();
    print_rows(format, &rows, "No ASNs resolved yet.")
}

/// Discovered devices
pub fn print_devices(format: OutputFormat, devices: &[Device]) -> Result<()> {
    if print_structured(format, devices)? {
        return Ok(());
    }
    let rows: Vec<DeviceRow> = devices
        .iter()
        .map(|d| DeviceRow {
            address: d.address.to_string(),
            hw_addr: d.hw_addr.clone(),
            name: d.name.clone().unwrap_or_default(),
        })
        .collect();
    print_rows(format, &rows, "No devices found.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnelwatch::{parse_timestamp, GeoPoint};

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("TABLE".parse::<OutputFormat>().unwrap(), OutputFormat::Pretty);
        assert_eq!("yml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_flow_row_blanks_missing_fields() {
        let record = EnrichedRecord {
            observed_at: parse_timestamp("2024-01-01 10:00:00").unwrap(),
            src: "192.168.1.5".parse().unwrap(),
            dst: "203.0.113.9".parse().unwrap(),
            pid: Some(4321),
            exe: Some("/usr/bin/teredo-client".into()),
            owner: None,
            location: Some(GeoPoint {
                latitude: 52.52,
                longitude: 13.405,
            }),
        };
        let row = FlowRow::from(&record);
        assert_eq!(row.timestamp, "2024-01-01 10:00:00");
        assert_eq!(row.pid, "4321");
        assert!(row.asn.is_empty() && row.org.is_empty());
        assert_eq!(row.lat, "52.5200");
        assert_eq!(row.lon, "13.4050");
    }
}
