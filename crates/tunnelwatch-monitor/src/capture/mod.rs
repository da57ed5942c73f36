//! Live capture ingestion.
//!
//! A [`PacketSource`] is read on a dedicated blocking thread by
//! [`capture_loop`]. Every UDP datagram to the port of interest becomes a
//! [`RawCandidate`] stamped with the current wall clock (second resolution)
//! and no pid. Candidates are handed over with `try_send`, so a slow consumer
//! costs dropped candidates, never a stalled capture.

mod decode;
#[cfg(feature = "live-capture")]
mod live;

pub use decode::{decode_frame, DecodedFlow, LinkType};
#[cfg(feature = "live-capture")]
pub use live::PcapSource;

use chrono::Local;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tunnelwatch_core::{truncate_to_second, CandidateOrigin, RawCandidate, Result};

/// Result of one read from a packet source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextFrame {
    /// A captured frame
    Packet(Vec<u8>),
    /// The read timed out with nothing captured
    Idle,
    /// The source will never produce another frame
    Exhausted,
}

/// Blocking source of captured frames.
///
/// `next_frame` must return within a bounded time (typically by returning
/// [`NextFrame::Idle`] on a read timeout) so cancellation is observed.
pub trait PacketSource: Send {
    /// Framing of the bytes returned by `next_frame`
    fn link_type(&self) -> LinkType;

    /// Read the next frame
    fn next_frame(&mut self) -> Result<NextFrame>;
}

/// Live counters shared by the capture thread and the consumer
#[derive(Debug, Default)]
pub struct CaptureCounters {
    seen: AtomicU64,
    decoded: AtomicU64,
    dropped: AtomicU64,
    stored: AtomicU64,
    duplicates: AtomicU64,
    errors: AtomicU64,
}

impl CaptureCounters {
    /// Returns the new total
    pub(crate) fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            seen: self.seen.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Capture task totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    /// Frames read from the source
    pub seen: u64,
    /// Frames that decoded to a flow on the port of interest
    pub decoded: u64,
    /// Candidates discarded unenriched: queue full, or still queued when
    /// the capture was cancelled
    pub dropped: u64,
    /// Records inserted
    pub stored: u64,
    /// Records discarded as duplicates of an existing key
    pub duplicates: u64,
    /// Store failures
    pub errors: u64,
}

/// Read `source` until cancelled or exhausted, queueing candidates on `tx`.
///
/// Returns early with the source's error if a read fails. A closed channel
/// ends the loop normally.
pub fn capture_loop(
    source: &mut dyn PacketSource,
    port: u16,
    tx: &Sender<RawCandidate>,
    token: &CancellationToken,
    counters: &CaptureCounters,
) -> Result<()> {
    let link = source.link_type();
    info!(?link, port, "capture started");

    while !token.is_cancelled() {
        let frame = match source.next_frame()? {
            NextFrame::Packet(frame) => frame,
            NextFrame::Idle => continue,
            NextFrame::Exhausted => {
                debug!("packet source exhausted");
                break;
            }
        };
        counters.seen.fetch_add(1, Ordering::Relaxed);

        let Some(flow) = decode_frame(link, &frame, port) else {
            continue;
        };
        counters.decoded.fetch_add(1, Ordering::Relaxed);

        let candidate = RawCandidate {
            observed_at: truncate_to_second(Local::now().naive_local()),
            src: flow.src,
            dst: flow.dst,
            dst_port: flow.dst_port,
            pid: None,
            origin: CandidateOrigin::Capture,
        };

        match tx.try_send(candidate) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = counters.record_dropped();
                if dropped == 1 || dropped % 1000 == 0 {
                    warn!(dropped, "enrichment queue full, dropping captured flows");
                }
            }
            Err(TrySendError::Closed(_)) => {
                counters.record_dropped();
                debug!("candidate consumer gone");
                break;
            }
        }
    }

    info!(stats = ?counters.snapshot(), "capture stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::decode::tests::{ethernet_frame, ipv4_udp};
    use super::*;
    use pnet_packet::ethernet::EtherTypes;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use tokio::sync::mpsc;
    use tunnelwatch_core::MonitorError;

    /// Replays frames, then idles (or reports exhaustion)
    pub(crate) struct Replay {
        frames: VecDeque<Vec<u8>>,
        exhaust: bool,
        fail: bool,
    }

    impl Replay {
        pub(crate) fn new(frames: Vec<Vec<u8>>) -> Self {
            Self {
                frames: frames.into(),
                exhaust: true,
                fail: false,
            }
        }

        pub(crate) fn endless(mut self) -> Self {
            self.exhaust = false;
            self
        }
    }

    impl PacketSource for Replay {
        fn link_type(&self) -> LinkType {
            LinkType::Ethernet
        }

        fn next_frame(&mut self) -> Result<NextFrame> {
            if self.fail {
                return Err(MonitorError::source_unavailable("capture interface", "down"));
            }
            match self.frames.pop_front() {
                Some(frame) => Ok(NextFrame::Packet(frame)),
                None if self.exhaust => Ok(NextFrame::Exhausted),
                None => {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    Ok(NextFrame::Idle)
                }
            }
        }
    }

    /// Ethernet frame carrying a datagram from 192.168.1.5 to `dst:3544`
    pub(crate) fn frame_to(dst: Ipv4Addr) -> Vec<u8> {
        ethernet_frame(
            EtherTypes::Ipv4,
            &ipv4_udp(Ipv4Addr::new(192, 168, 1, 5), dst, 3544),
        )
    }

    pub(crate) fn teredo_frame(last_octet: u8) -> Vec<u8> {
        frame_to(Ipv4Addr::new(198, 51, 100, last_octet))
    }

    #[test]
    fn test_loop_emits_candidates_without_pid() {
        let other = ethernet_frame(
            EtherTypes::Ipv4,
            &ipv4_udp(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 53),
        );
        let mut source = Replay::new(vec![teredo_frame(1), other, teredo_frame(2)]);
        let (tx, mut rx) = mpsc::channel(8);
        let counters = CaptureCounters::default();

        capture_loop(&mut source, 3544, &tx, &CancellationToken::new(), &counters).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.pid, None);
        assert_eq!(first.origin, CandidateOrigin::Capture);
        assert_eq!(first.dst.to_string(), "198.51.100.1");
        assert_eq!(rx.try_recv().unwrap().dst.to_string(), "198.51.100.2");
        assert!(rx.try_recv().is_err());

        let stats = counters.snapshot();
        assert_eq!(stats.seen, 3);
        assert_eq!(stats.decoded, 2);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let frames = (1..=5).map(teredo_frame).collect();
        let mut source = Replay::new(frames);
        let (tx, _rx) = mpsc::channel(2);
        let counters = CaptureCounters::default();

        capture_loop(&mut source, 3544, &tx, &CancellationToken::new(), &counters).unwrap();

        let stats = counters.snapshot();
        assert_eq!(stats.decoded, 5);
        assert_eq!(stats.dropped, 3);
    }

    #[test]
    fn test_cancelled_before_start_reads_nothing() {
        let mut source = Replay::new(vec![teredo_frame(1)]).endless();
        let (tx, _rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        token.cancel();
        let counters = CaptureCounters::default();

        capture_loop(&mut source, 3544, &tx, &token, &counters).unwrap();
        assert_eq!(counters.snapshot().seen, 0);
    }

    #[test]
    fn test_cancel_stops_idle_source() {
        let mut source = Replay::new(Vec::new()).endless();
        let (tx, _rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            canceller.cancel();
        });

        capture_loop(&mut source, 3544, &tx, &token, &CaptureCounters::default()).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_source_error_is_returned() {
        let mut source = Replay::new(Vec::new());
        source.fail = true;
        let (tx, _rx) = mpsc::channel(8);
        let err = capture_loop(
            &mut source,
            3544,
            &tx,
            &CancellationToken::new(),
            &CaptureCounters::default(),
        )
        .unwrap_err();
        assert!(err.is_source_unavailable());
    }
}
