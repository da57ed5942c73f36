use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Text form of every persisted and displayed timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Approximate geographic position of an address.
///
/// Latitude and longitude only ever travel together; a lookup that yields
/// one without the other is treated as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point from an optional pair, rejecting half-filled pairs
    #[must_use]
    pub fn from_pair(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// Autonomous system that announces an address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkOwner {
    /// Autonomous system number
    pub asn: u32,
    /// Registered owner of the AS
    pub name: String,
}

impl NetworkOwner {
    /// Build an owner from an optional pair, rejecting half-filled pairs
    #[must_use]
    pub fn from_pair(asn: Option<u32>, name: Option<String>) -> Option<Self> {
        match (asn, name) {
            (Some(asn), Some(name)) => Some(Self { asn, name }),
            _ => None,
        }
    }
}

impl std::fmt::Display for NetworkOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AS{} {}", self.asn, self.name)
    }
}

/// Format a timestamp the way it is persisted
#[must_use]
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted timestamp
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// Drop sub-second precision
#[must_use]
pub fn truncate_to_second(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Start of the one-minute interval containing `ts`
#[must_use]
pub fn minute_bucket(ts: NaiveDateTime) -> NaiveDateTime {
    let ts = truncate_to_second(ts);
    ts.with_second(0).unwrap_or(ts)
}

/// Returns true if the address can appear in public routing tables.
///
/// Private, loopback, link-local, documentation, shared (CGN), benchmark,
/// multicast and reserved ranges are excluded.
#[must_use]
pub fn is_globally_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_global_v4(v4),
        IpAddr::V6(v6) => is_global_v6(v6),
    }
}

fn is_global_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_unspecified()
        || ip.is_multicast()
        || a == 0
        || (a == 100 && (64..=127).contains(&b))
        || (a == 198 && (18..=19).contains(&b))
        || a >= 240)
}

fn is_global_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_global_v4(v4);
    }
    let first = ip.segments()[0];
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
        || (first == 0x2001 && ip.segments()[1] == 0x0db8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_requires_both_halves() {
        assert!(GeoPoint::from_pair(Some(1.0), None).is_none());
        assert!(GeoPoint::from_pair(None, Some(1.0)).is_none());
        let point = GeoPoint::from_pair(Some(52.5), Some(13.4)).unwrap();
        assert!((point.latitude - 52.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_owner_requires_both_halves() {
        assert!(NetworkOwner::from_pair(Some(15169), None).is_none());
        assert!(NetworkOwner::from_pair(None, Some("GOOGLE".into())).is_none());
        let owner = NetworkOwner::from_pair(Some(15169), Some("GOOGLE".into())).unwrap();
        assert_eq!(owner.to_string(), "AS15169 GOOGLE");
    }

    #[test]
    fn test_minute_bucket() {
        let ts = parse_timestamp("2024-01-01 10:00:59").unwrap();
        assert_eq!(format_timestamp(&minute_bucket(ts)), "2024-01-01 10:00:00");
    }

    #[test]
    fn test_timestamp_round_trip_text() {
        let ts = parse_timestamp("2024-01-01 10:00:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-01-01 10:00:00");
        assert!(parse_timestamp("2024-01-01T10:00:00").is_none());
    }

    #[test]
    fn test_globally_routable() {
        assert!(is_globally_routable("8.8.8.8".parse().unwrap()));
        assert!(is_globally_routable("2001:0:4136:e378::1".parse().unwrap()));
        assert!(!is_globally_routable("192.168.1.5".parse().unwrap()));
        assert!(!is_globally_routable("203.0.113.9".parse().unwrap()));
        assert!(!is_globally_routable("100.64.0.1".parse().unwrap()));
        assert!(!is_globally_routable("fe80::1".parse().unwrap()));
        assert!(!is_globally_routable("::ffff:10.0.0.1".parse().unwrap()));
    }
}
