//! `tunnelwatch scan-lan` - list devices on the local network.

use anyhow::Result;
use tunnelwatch::FlowMonitor;

use super::Context;
use crate::cli::args::ScanLanArgs;
use crate::output;

pub async fn execute(ctx: Context, args: ScanLanArgs) -> Result<()> {
    let mut config = ctx.monitor_config()?;
    if let Some(table) = args.table {
        config.arp_table = table;
    }
    let monitor = FlowMonitor::from_config(config)?;

    let devices = monitor.scan_lan(!args.no_resolve).await?;
    output::print_devices(ctx.output_format, &devices)
}
