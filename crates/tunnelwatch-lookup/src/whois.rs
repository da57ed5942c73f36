//! IP-to-ASN lookups over the whois protocol (RFC 3912).
//!
//! Uses the Team Cymru verbose format:
//!
//! ```text
//! AS      | IP               | BGP Prefix          | CC | Registry | Allocated  | AS Name
//! 15169   | 8.8.8.8          | 8.8.8.0/24          | US | arin     | 1992-12-01 | GOOGLE - Google LLC, US
//! ```

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};
use tunnelwatch_core::{LookupFailure, LookupResult, NetworkOwner};

use crate::traits::OwnershipLookup;

/// Team Cymru IP-to-ASN whois endpoint
pub const DEFAULT_WHOIS_SERVER: &str = "whois.cymru.com:43";

/// Upper bound on a response; one answer is a few hundred bytes
const MAX_RESPONSE: u64 = 64 * 1024;

/// Whois client for IP-to-ASN mapping
#[derive(Debug, Clone)]
pub struct CymruWhois {
    server: String,
    timeout: Duration,
}

impl Default for CymruWhois {
    fn default() -> Self {
        Self::new(DEFAULT_WHOIS_SERVER)
    }
}

impl CymruWhois {
    /// Create a client for the given `host:port`
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Set the deadline for connect, write and read together
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Lookup the AS announcing an address
    #[instrument(skip(self), fields(server = %self.server))]
    pub async fn lookup_ip(&self, ip: IpAddr) -> LookupResult<NetworkOwner> {
        let raw = tokio::time::timeout(self.timeout, self.query(ip))
            .await
            .map_err(|_| LookupFailure::Timeout(self.timeout))??;
        debug!(bytes = raw.len(), "whois response");
        parse_cymru_response(&raw)
    }

    async fn query(&self, ip: IpAddr) -> LookupResult<String> {
        let mut stream = TcpStream::connect(&self.server)
            .await
            .map_err(|e| LookupFailure::Network(format!("connect {}: {e}", self.server)))?;

        stream
            .write_all(format!(" -v {ip}\r\n").as_bytes())
            .await
            .map_err(|e| LookupFailure::Network(e.to_string()))?;

        let mut raw = Vec::new();
        stream
            .take(MAX_RESPONSE)
            .read_to_end(&mut raw)
            .await
            .map_err(|e| LookupFailure::Network(e.to_string()))?;

        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

#[async_trait]
impl OwnershipLookup for CymruWhois {
    async fn owner(&self, ip: IpAddr) -> LookupResult<NetworkOwner> {
        self.lookup_ip(ip).await
    }
}

/// Parse a verbose Team Cymru response into an owner.
///
/// The first data row wins when an address is announced by several ASes.
/// A row with a number but no name, or a name but no number, is malformed.
pub fn parse_cymru_response(raw: &str) -> LookupResult<NetworkOwner> {
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("AS ") || line.starts_with("Bulk mode") {
            continue;
        }
        if line.starts_with("Error:") {
            return Err(LookupFailure::Malformed(line.to_string()));
        }

        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 2 {
            continue;
        }

        let asn_field = fields[0];
        if asn_field.eq_ignore_ascii_case("NA") {
            return Err(LookupFailure::NotFound("no AS announces this address".into()));
        }
        let asn = asn_field
            .parse::<u32>()
            .map_err(|_| LookupFailure::Malformed(format!("bad AS number: {asn_field}")))?;

        let name = fields
            .last()
            .copied()
            .filter(|n| fields.len() >= 3 && !n.is_empty() && !n.eq_ignore_ascii_case("NA"))
            .ok_or_else(|| LookupFailure::Malformed(format!("AS{asn} has no owner name")))?;

        return Ok(NetworkOwner {
            asn,
            name: name.to_string(),
        });
    }

    Err(LookupFailure::Malformed("no data row in whois response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const GOOGLE: &str = "AS      | IP               | BGP Prefix          | CC | Registry | Allocated  | AS Name\n\
                          15169   | 8.8.8.8          | 8.8.8.0/24          | US | arin     | 1992-12-01 | GOOGLE - Google LLC, US\n";

    #[test]
    fn test_parse_verbose_row() {
        let owner = parse_cymru_response(GOOGLE).unwrap();
        assert_eq!(owner.asn, 15169);
        assert_eq!(owner.name, "GOOGLE - Google LLC, US");
    }

    #[test]
    fn test_parse_unannounced() {
        let raw = "AS      | IP               | BGP Prefix | CC | Registry | Allocated | AS Name\n\
                   NA      | 10.0.0.1         | NA         |    | other    |           | NA\n";
        assert!(matches!(
            parse_cymru_response(raw),
            Err(LookupFailure::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_missing_name_is_malformed() {
        let raw = "13335 | 1.1.1.1 | 1.1.1.0/24 | AU | apnic | 2011-08-11 | \n";
        assert!(matches!(
            parse_cymru_response(raw),
            Err(LookupFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_error_line() {
        let raw = "Error: no ASN or IP match on line 1.\n";
        assert!(matches!(
            parse_cymru_response(raw),
            Err(LookupFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_cymru_response("").is_err());
    }

    #[tokio::test]
    async fn test_lookup_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            let query = String::from_utf8_lossy(&buf[..n]).to_string();
            socket.write_all(GOOGLE.as_bytes()).await.unwrap();
            query
        });

        let whois = CymruWhois::new(addr.to_string());
        let owner = whois.owner("8.8.8.8".parse().unwrap()).await.unwrap();
        assert_eq!(owner.asn, 15169);
        assert_eq!(server.await.unwrap(), " -v 8.8.8.8\r\n");
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let whois = CymruWhois::new(addr.to_string()).timeout(Duration::from_millis(100));
        let err = whois.owner("8.8.8.8".parse().unwrap()).await.unwrap_err();
        assert_eq!(err, LookupFailure::Timeout(Duration::from_millis(100)));
    }
}
