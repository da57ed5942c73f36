//! `tunnelwatch watch` - periodic refresh, optionally with live capture.

use anyhow::Result;
use colored::Colorize;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tunnelwatch::{CancellationToken, CaptureStats, FlowMonitor};

use super::{refresh, Context};
use crate::cli::args::WatchArgs;
use crate::output::OutputFormat;

type CaptureTask = JoinHandle<tunnelwatch::Result<CaptureStats>>;
type CaptureOutcome = Result<tunnelwatch::Result<CaptureStats>, JoinError>;

pub async fn execute(ctx: Context, args: WatchArgs) -> Result<()> {
    let mut config = ctx.monitor_config()?;
    if let Some(secs) = args.interval {
        config.refresh_interval_secs = secs;
    }
    let period = config.refresh_interval();
    let monitor = FlowMonitor::from_config(config)?;
    let filter = args.filter.to_filter();

    let token = CancellationToken::new();
    let mut capture = if args.capture {
        launch_capture(&monitor, args.interface.as_deref(), token.clone())
    } else {
        None
    };

    if ctx.output_format == OutputFormat::Pretty {
        println!(
            "{} refreshing every {}s, Ctrl-C to stop",
            "Watching".bold(),
            period.as_secs()
        );
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                // A failed refresh is reported; the next tick tries again.
                if let Err(e) = refresh::show(&ctx, &monitor, &filter).await {
                    eprintln!("{} {e}", "Error:".red().bold());
                }
            }
            Some(joined) = wait(capture.as_mut()), if capture.is_some() => {
                capture = None;
                report_capture(joined);
            }
        }
    }

    token.cancel();
    if let Some(handle) = capture {
        report_capture(handle.await);
    }
    Ok(())
}

async fn wait(handle: Option<&mut CaptureTask>) -> Option<CaptureOutcome> {
    match handle {
        Some(handle) => Some(handle.await),
        None => None,
    }
}

/// Start the capture; a failure is reported and watching goes on without it
fn launch_capture(
    monitor: &FlowMonitor,
    interface: Option<&str>,
    token: CancellationToken,
) -> Option<CaptureTask> {
    match start_capture(monitor, interface, token) {
        Ok(task) => Some(task),
        Err(e) => {
            eprintln!("{} {e:#}", "Capture failed:".red().bold());
            None
        }
    }
}

fn report_capture(joined: CaptureOutcome) {
    match joined {
        Ok(Ok(stats)) => eprintln!(
            "{} {} frames, {} flows, {} stored, {} duplicate, {} dropped, {} errors",
            "Capture stopped:".bold(),
            stats.seen,
            stats.decoded,
            stats.stored,
            stats.duplicates,
            stats.dropped,
            stats.errors,
        ),
        Ok(Err(e)) => eprintln!("{} {e}", "Capture failed:".red().bold()),
        Err(e) => eprintln!("{} {e}", "Capture task aborted:".red().bold()),
    }
}

#[cfg(feature = "live-capture")]
fn start_capture(
    monitor: &FlowMonitor,
    interface: Option<&str>,
    token: CancellationToken,
) -> Result<CaptureTask> {
    let interface = interface.or(monitor.config().interface.as_deref());
    let source = tunnelwatch::PcapSource::open(interface, &monitor.config().capture_filter())?;
    Ok(monitor.spawn_capture(source, token))
}

#[cfg(not(feature = "live-capture"))]
fn start_capture(
    _monitor: &FlowMonitor,
    _interface: Option<&str>,
    _token: CancellationToken,
) -> Result<CaptureTask> {
    anyhow::bail!(
        "Live capture is not available in this build.\n\
         Rebuild with: cargo install tunnelwatch-cli --features live-capture"
    )
}
