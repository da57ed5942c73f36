use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A host seen on the local link. Held only for one discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Network address
    pub address: IpAddr,
    /// Hardware (MAC) address, lowercase colon-separated
    pub hw_addr: String,
    /// Reverse-DNS name, when one resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
