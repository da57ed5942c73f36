//! LAN device discovery from the kernel neighbour table.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::debug;
use tunnelwatch_core::{Device, MonitorError, Result};

use crate::rdns::ReverseDns;

/// Linux ARP cache
pub const DEFAULT_ARP_TABLE: &str = "/proc/net/arp";

/// `ATF_COM`: the entry has a resolved hardware address
const ATF_COM: u32 = 0x2;

/// Reader for an ARP-table-formatted file
#[derive(Debug, Clone)]
pub struct NeighborTable {
    path: PathBuf,
}

impl Default for NeighborTable {
    fn default() -> Self {
        Self::new(DEFAULT_ARP_TABLE)
    }
}

impl NeighborTable {
    /// Read neighbours from the given file
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path being read
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List complete neighbour entries, optionally naming each by reverse DNS.
    ///
    /// Devices are returned sorted by address.
    pub async fn discover(&self, names: Option<&ReverseDns>) -> Result<Vec<Device>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MonitorError::source_unavailable("neighbour table", e))?;

        let mut devices = parse_arp_table(&content);
        devices.sort_by_key(|d| d.address);
        debug!(count = devices.len(), path = %self.path.display(), "read neighbour table");

        if let Some(resolver) = names {
            for device in &mut devices {
                device.name = resolver.name_of(device.address).await;
            }
        }

        Ok(devices)
    }
}

/// Parse `/proc/net/arp` content. Incomplete entries are skipped.
pub fn parse_arp_table(content: &str) -> Vec<Device> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            let address: IpAddr = cols[0].parse().ok()?;
            let flags = u32::from_str_radix(cols[2].trim_start_matches("0x"), 16).ok()?;
            let hw_addr = cols[3].to_ascii_lowercase();
            if flags & ATF_COM == 0 || hw_addr == "00:00:00:00:00:00" {
                return None;
            }
            Some(Device {
                address,
                hw_addr,
                name: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.20     0x1         0x2         AA:BB:CC:DD:EE:02     *        wlan0
192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:01     *        wlan0
192.168.1.99     0x1         0x0         00:00:00:00:00:00     *        wlan0
garbage line
";

    #[test]
    fn test_parse_skips_incomplete_entries() {
        let devices = parse_arp_table(TABLE);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].hw_addr, "aa:bb:cc:dd:ee:02");
        assert!(devices.iter().all(|d| d.name.is_none()));
    }

    #[tokio::test]
    async fn test_discover_sorts_by_address() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();

        let devices = NeighborTable::new(file.path()).discover(None).await.unwrap();
        let addrs: Vec<String> = devices.iter().map(|d| d.address.to_string()).collect();
        assert_eq!(addrs, vec!["192.168.1.1", "192.168.1.20"]);
    }

    #[tokio::test]
    async fn test_missing_table_is_source_unavailable() {
        let err = NeighborTable::new("/nonexistent/tunnelwatch/arp")
            .discover(None)
            .await
            .unwrap_err();
        assert!(err.is_source_unavailable());
    }
}
