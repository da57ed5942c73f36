//! `tunnelwatch refresh` - ingest the firewall log once and show the window.

use anyhow::Result;
use colored::Colorize;
use tunnelwatch::{FlowFilter, FlowMonitor, IngestReport};

use super::Context;
use crate::cli::args::RefreshArgs;
use crate::output::{self, OutputFormat};

pub async fn execute(ctx: Context, args: RefreshArgs) -> Result<()> {
    let mut config = ctx.monitor_config()?;
    if let Some(lines) = args.lines {
        config.tail_lines = lines;
    }
    let monitor = FlowMonitor::from_config(config)?;

    show(&ctx, &monitor, &args.filter.to_filter()).await
}

/// One-line ingest summary shared with `watch`
pub fn print_summary(ingest: &IngestReport) {
    let mut line = format!(
        "{} {} new, {} known, {} scanned",
        "Refreshed:".green().bold(),
        ingest.inserted.to_string().cyan(),
        ingest.already_stored + ingest.duplicates,
        ingest.scanned,
    );
    if ingest.malformed > 0 {
        line.push_str(&format!(", {} malformed", ingest.malformed.to_string().yellow()));
    }
    println!("{line}");
}

/// Render a refresh result for `filter` in the chosen format
pub async fn show(ctx: &Context, monitor: &FlowMonitor, filter: &FlowFilter) -> Result<()> {
    let report = monitor.refresh(filter).await?;
    if output::print_structured(ctx.output_format, &report)? {
        return Ok(());
    }
    if ctx.output_format == OutputFormat::Pretty {
        print_summary(&report.ingest);
    }
    output::print_flows(ctx.output_format, &report.snapshot.records)
}
