use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::{GeoPoint, NetworkOwner};

/// Which ingestor produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrigin {
    /// Parsed from the firewall log
    Log,
    /// Synthesized from a captured packet
    Capture,
}

impl std::fmt::Display for CandidateOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Capture => write!(f, "capture"),
        }
    }
}

/// A flow observation before enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandidate {
    /// When the flow was observed (second resolution, local wall clock)
    pub observed_at: NaiveDateTime,
    /// Local source address
    pub src: IpAddr,
    /// Remote destination address
    pub dst: IpAddr,
    /// Destination port
    pub dst_port: u16,
    /// Owning process, when the source knows it
    pub pid: Option<u32>,
    /// Producing ingestor
    pub origin: CandidateOrigin,
}

impl RawCandidate {
    /// Identity key the stored record will have
    #[must_use]
    pub fn key(&self) -> FlowKey {
        FlowKey {
            observed_at: self.observed_at,
            src: self.src,
            dst: self.dst,
            pid: self.pid.unwrap_or(0),
        }
    }
}

/// Uniqueness key of a stored flow. An absent pid is keyed as `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    /// Observation time
    pub observed_at: NaiveDateTime,
    /// Source address
    pub src: IpAddr,
    /// Destination address
    pub dst: IpAddr,
    /// Process id, `0` when unattributed
    pub pid: u32,
}

/// The persisted unit: a candidate plus whatever attribution succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// When the flow was observed
    pub observed_at: NaiveDateTime,
    /// Source address
    pub src: IpAddr,
    /// Destination address
    pub dst: IpAddr,
    /// Owning process id
    pub pid: Option<u32>,
    /// Executable path of the owning process
    pub exe: Option<String>,
    /// AS that announces the destination
    pub owner: Option<NetworkOwner>,
    /// Approximate location of the destination
    pub location: Option<GeoPoint>,
}

impl EnrichedRecord {
    /// A record with every attribution field empty
    #[must_use]
    pub fn unattributed(candidate: &RawCandidate) -> Self {
        Self {
            observed_at: candidate.observed_at,
            src: candidate.src,
            dst: candidate.dst,
            pid: candidate.pid,
            exe: None,
            owner: None,
            location: None,
        }
    }

    /// Identity key
    #[must_use]
    pub fn key(&self) -> FlowKey {
        FlowKey {
            observed_at: self.observed_at,
            src: self.src,
            dst: self.dst,
            pid: self.pid.unwrap_or(0),
        }
    }

    /// AS number, if ownership was resolved
    #[must_use]
    pub fn asn(&self) -> Option<u32> {
        self.owner.as_ref().map(|o| o.asn)
    }

    /// Owner name, if ownership was resolved
    #[must_use]
    pub fn org(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.name.as_str())
    }

    /// Latitude, if geolocation was resolved
    #[must_use]
    pub fn lat(&self) -> Option<f64> {
        self.location.map(|l| l.latitude)
    }

    /// Longitude, if geolocation was resolved
    #[must_use]
    pub fn lon(&self) -> Option<f64> {
        self.location.map(|l| l.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_timestamp;

    fn candidate(pid: Option<u32>) -> RawCandidate {
        RawCandidate {
            observed_at: parse_timestamp("2024-01-01 10:00:00").unwrap(),
            src: "192.168.1.5".parse().unwrap(),
            dst: "203.0.113.9".parse().unwrap(),
            dst_port: 3544,
            pid,
            origin: CandidateOrigin::Log,
        }
    }

    #[test]
    fn test_absent_pid_keys_as_zero() {
        assert_eq!(candidate(None).key().pid, 0);
        assert_eq!(candidate(None).key(), candidate(Some(0)).key());
        assert_ne!(candidate(None).key(), candidate(Some(4321)).key());
    }

    #[test]
    fn test_unattributed_record_keeps_key() {
        let c = candidate(Some(4321));
        let record = EnrichedRecord::unattributed(&c);
        assert_eq!(record.key(), c.key());
        assert!(record.exe.is_none());
        assert!(record.asn().is_none() && record.org().is_none());
        assert!(record.lat().is_none() && record.lon().is_none());
    }
}
