use pcap::{Active, Capture, Device};
use tracing::info;
use tunnelwatch_core::{MonitorError, Result};

use super::{LinkType, NextFrame, PacketSource};

/// Read timeout; bounds how long a cancelled capture keeps running
const READ_TIMEOUT_MS: i32 = 500;

/// Enough for the link, IP and UDP headers
const SNAPLEN: i32 = 256;

/// libpcap capture narrowed by a BPF filter
pub struct PcapSource {
    capture: Capture<Active>,
    link: LinkType,
}

impl PcapSource {
    /// Open `interface` (or libpcap's default device) with the BPF
    /// expression `filter`.
    pub fn open(interface: Option<&str>, filter: &str) -> Result<Self> {
        let device = match interface {
            Some(name) => Device::from(name),
            None => Device::lookup()
                .map_err(unavailable)?
                .ok_or_else(|| unavailable("no default capture device"))?,
        };
        let name = device.name.clone();

        let mut capture = Capture::from_device(device)
            .map_err(unavailable)?
            .promisc(false)
            .snaplen(SNAPLEN)
            .timeout(READ_TIMEOUT_MS)
            .immediate_mode(true)
            .open()
            .map_err(unavailable)?;

        capture
            .filter(filter, true)
            .map_err(unavailable)?;

        let dlt = capture.get_datalink();
        let link = LinkType::from_dlt(dlt.0)
            .ok_or_else(|| unavailable(format!("unsupported link type {}", dlt.0)))?;

        info!(interface = %name, ?link, filter, "capture device opened");
        Ok(Self { capture, link })
    }
}

impl PacketSource for PcapSource {
    fn link_type(&self) -> LinkType {
        self.link
    }

    fn next_frame(&mut self) -> Result<NextFrame> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(NextFrame::Packet(packet.data.to_vec())),
            Err(pcap::Error::TimeoutExpired) => Ok(NextFrame::Idle),
            Err(pcap::Error::NoMorePackets) => Ok(NextFrame::Exhausted),
            Err(e) => Err(unavailable(e)),
        }
    }
}

fn unavailable(reason: impl ToString) -> MonitorError {
    MonitorError::source_unavailable("capture interface", reason)
}
