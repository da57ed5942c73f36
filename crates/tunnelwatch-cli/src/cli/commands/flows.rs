//! `tunnelwatch flows` - read-only view of stored history.

use anyhow::Result;
use tunnelwatch::FlowMonitor;

use super::Context;
use crate::cli::args::FlowsArgs;
use crate::output;

pub async fn execute(ctx: Context, args: FlowsArgs) -> Result<()> {
    let mut config = ctx.monitor_config()?;
    if let Some(limit) = args.limit {
        config.query_window = limit;
    }
    let monitor = FlowMonitor::from_config(config)?;
    let snapshot = monitor.view(&args.filter.to_filter()).await?;

    if args.asns_only {
        output::print_vocabulary(ctx.output_format, &snapshot.vocabulary)
    } else if args.per_minute {
        output::print_series(ctx.output_format, &snapshot.per_minute)
    } else {
        output::print_flows(ctx.output_format, &snapshot.records)
    }
}
