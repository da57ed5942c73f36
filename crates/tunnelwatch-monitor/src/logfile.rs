//! Firewall log ingestion.
//!
//! The log is whitespace-delimited with a fixed column order:
//!
//! ```text
//! date time action protocol src-ip dst-ip src-port dst-port size tcpflags
//! tcpsyn tcpack tcpwin icmptype icmpcode info path pid
//! ```
//!
//! Each refresh reads the last N lines, skips comment/blank lines, validates
//! every remaining line against that schema and keeps allowed UDP flows to
//! the configured port.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, instrument};
use tunnelwatch_core::{CandidateOrigin, MonitorError, RawCandidate, Result};

/// Number of columns in a well-formed line
pub const LOG_COLUMNS: usize = 18;

/// Optional label some writers put in front of the final pid value
const PID_LABEL: &str = "PID";

/// Why a line was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// Wrong number of whitespace-separated fields
    #[error("expected {LOG_COLUMNS} columns, found {0}")]
    ColumnCount(usize),

    /// A field did not parse as its column type
    #[error("invalid {column}: {value:?}")]
    InvalidField {
        /// Column name
        column: &'static str,
        /// Raw field text
        value: String,
    },
}

/// One parsed log line. `-` fields are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub action: String,
    pub protocol: String,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub size: Option<u64>,
    pub tcp_flags: Option<String>,
    pub tcp_syn: Option<String>,
    pub tcp_ack: Option<String>,
    pub tcp_win: Option<String>,
    pub icmp_type: Option<String>,
    pub icmp_code: Option<String>,
    pub info: Option<String>,
    pub path: Option<String>,
    pub pid: Option<u32>,
}

impl LogEntry {
    /// Returns true for an allowed UDP flow to `port`
    #[must_use]
    pub fn is_allowed_flow(&self, port: u16) -> bool {
        self.action.eq_ignore_ascii_case("ALLOW")
            && self.protocol.eq_ignore_ascii_case("UDP")
            && self.dst_port == Some(port)
    }

    /// Candidate for the enrichment pipeline.
    ///
    /// Only meaningful for entries that passed [`Self::is_allowed_flow`].
    #[must_use]
    pub fn to_candidate(&self) -> RawCandidate {
        RawCandidate {
            observed_at: self.timestamp,
            src: self.src_ip,
            dst: self.dst_ip,
            dst_port: self.dst_port.unwrap_or_default(),
            pid: self.pid,
            origin: CandidateOrigin::Log,
        }
    }
}

/// Parse one line into a [`LogEntry`].
pub fn parse_line(line: &str) -> std::result::Result<LogEntry, LineError> {
    let mut fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() == LOG_COLUMNS + 1 && fields[LOG_COLUMNS - 1] == PID_LABEL {
        fields.remove(LOG_COLUMNS - 1);
    }
    if fields.len() != LOG_COLUMNS {
        return Err(LineError::ColumnCount(fields.len()));
    }

    let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d")
        .map_err(|_| invalid("date", fields[0]))?;
    let time =
        NaiveTime::parse_from_str(fields[1], "%H:%M:%S").map_err(|_| invalid("time", fields[1]))?;

    Ok(LogEntry {
        timestamp: date.and_time(time),
        action: fields[2].to_string(),
        protocol: fields[3].to_string(),
        src_ip: fields[4].parse().map_err(|_| invalid("src-ip", fields[4]))?,
        dst_ip: fields[5].parse().map_err(|_| invalid("dst-ip", fields[5]))?,
        src_port: numeric("src-port", fields[6])?,
        dst_port: numeric("dst-port", fields[7])?,
        size: numeric("size", fields[8])?,
        tcp_flags: text(fields[9]),
        tcp_syn: text(fields[10]),
        tcp_ack: text(fields[11]),
        tcp_win: text(fields[12]),
        icmp_type: text(fields[13]),
        icmp_code: text(fields[14]),
        info: text(fields[15]),
        path: text(fields[16]),
        pid: numeric("pid", fields[17])?.filter(|&pid| pid != 0),
    })
}

fn invalid(column: &'static str, value: &str) -> LineError {
    LineError::InvalidField {
        column,
        value: value.to_string(),
    }
}

fn text(field: &str) -> Option<String> {
    (field != "-").then(|| field.to_string())
}

fn numeric<T: std::str::FromStr>(
    column: &'static str,
    field: &str,
) -> std::result::Result<Option<T>, LineError> {
    if field == "-" {
        return Ok(None);
    }
    field.parse().map(Some).map_err(|_| invalid(column, field))
}

/// Outcome of one extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBatch {
    /// Allowed flows on the port of interest, oldest first
    pub candidates: Vec<RawCandidate>,
    /// Lines examined (including comments and blanks)
    pub scanned: usize,
    /// Lines dropped because they did not match the schema
    pub malformed: usize,
    /// Well-formed lines that were not allowed flows to the port
    pub filtered: usize,
}

/// Turn raw lines into candidates, counting what was dropped.
pub fn extract<I, S>(lines: I, port: u16) -> LogBatch
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut batch = LogBatch::default();
    for line in lines {
        batch.scanned += 1;
        let line = line.as_ref().trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Ok(entry) if entry.is_allowed_flow(port) => batch.candidates.push(entry.to_candidate()),
            Ok(_) => batch.filtered += 1,
            Err(e) => {
                debug!(error = %e, line, "dropping malformed log line");
                batch.malformed += 1;
            }
        }
    }
    batch
}

/// A firewall log on disk
#[derive(Debug, Clone)]
pub struct FirewallLog {
    path: PathBuf,
    port: u16,
}

impl FirewallLog {
    /// Log at `path`, keeping flows to `port`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            path: path.into(),
            port,
        }
    }

    /// Path being read
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Port of interest
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The last `n` lines of the log. Invalid UTF-8 is replaced, not rejected.
    pub async fn tail(&self, n: usize) -> Result<Vec<String>> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| self.unavailable(e))?;
        let mut reader = BufReader::new(file);
        let mut ring: VecDeque<String> = VecDeque::with_capacity(n.min(4096));
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| self.unavailable(e))?;
            if read == 0 {
                break;
            }
            if n == 0 {
                continue;
            }
            if ring.len() == n {
                ring.pop_front();
            }
            ring.push_back(String::from_utf8_lossy(&buf).trim_end().to_string());
        }

        Ok(ring.into())
    }

    /// Read the last `n` lines and extract candidates from them.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn read_recent(&self, n: usize) -> Result<LogBatch> {
        let lines = self.tail(n).await?;
        let batch = extract(&lines, self.port);
        debug!(
            scanned = batch.scanned,
            candidates = batch.candidates.len(),
            malformed = batch.malformed,
            filtered = batch.filtered,
            "extracted log candidates"
        );
        Ok(batch)
    }

    fn unavailable(&self, e: std::io::Error) -> MonitorError {
        MonitorError::source_unavailable(format!("firewall log {}", self.path.display()), e)
    }
}
