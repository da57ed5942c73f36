//! `tunnelwatch config` - CLI configuration management.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::config::Config;
use crate::output::OutputFormat;

pub async fn execute(ctx: Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(&ctx),
        ConfigCommands::Set { key, value } => set_config(&ctx, &key, &value),
        ConfigCommands::Path => show_path(&ctx),
    }
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    // Never print the key itself, whatever the format
    let mut config = ctx.config.clone();
    config.monitor.host_intel.api_key = config.monitor.host_intel.api_key.as_deref().map(mask);

    match ctx.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&config)?),
        OutputFormat::Pretty | OutputFormat::Csv => {
            let m = &config.monitor;
            let unset = || "(not set)".dimmed().to_string();

            println!("{}", "Current Configuration:".bold());
            println!();
            println!(
                "  {} {}",
                "api_key:".bold(),
                m.host_intel.api_key.clone().unwrap_or_else(unset)
            );
            println!("  {} {}", "host_intel_url:".bold(), m.host_intel.base_url);
            println!(
                "  {} {}",
                "output_format:".bold(),
                config.output_format.unwrap_or_default()
            );
            println!("  {} {}", "log_path:".bold(), m.log_path.display());
            println!("  {} {}", "database:".bold(), m.database.display());
            println!(
                "  {} {}",
                "interface:".bold(),
                m.interface.clone().unwrap_or_else(unset)
            );
            println!("  {} {}", "port:".bold(), m.port);
            println!("  {} {}", "tail_lines:".bold(), m.tail_lines);
            println!("  {} {}s", "refresh_interval:".bold(), m.refresh_interval_secs);
            println!("  {} {}", "query_window:".bold(), m.query_window);
            println!("  {} {}", "whois_server:".bold(), m.whois_server);
        }
    }

    Ok(())
}

fn set_config(ctx: &Context, key: &str, value: &str) -> Result<()> {
    // Start from the file, not from the overridden in-memory copy
    let path = ctx.config_path.as_deref();
    let mut config = Config::load(path)?;
    let key = config.set(key, value)?;
    config.save(path)?;

    let shown = if key == "api_key" { mask(value) } else { value.to_string() };
    println!("{} {} set to {}.", "Success:".green().bold(), key, shown.cyan());
    Ok(())
}

fn show_path(ctx: &Context) -> Result<()> {
    let path = match &ctx.config_path {
        Some(path) => path.clone(),
        None => Config::path()?,
    };
    println!("{}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::mask;

    #[test]
    fn test_mask_hides_middle() {
        assert_eq!(mask("abcdefghijkl"), "abcd...ijkl");
        assert_eq!(mask("short"), "****");
    }
}
