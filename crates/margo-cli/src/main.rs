//! margo - Incremental ETL and cost attribution for the retail data lake
//!
//! Pulls POS sales, invoices, inventory moves, and stock snapshots from
//! the ERP into date-partitioned parquet, maintains the star-schema
//! dimensions, and runs the point-in-time profit engine on top.

use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::{Parser, Subcommand};

use margo_core::shutdown_flag;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "margo")]
#[command(about = "Incremental ETL and cost attribution for the retail data lake")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./margo.toml or ~/.config/margo/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline for one date
    Daily(cmd::daily::DailyArgs),
    /// Run the full pipeline for a date range in parallel
    Range(cmd::range::RangeArgs),
    /// Report pipeline freshness, catching up when behind
    Health(cmd::health::HealthArgs),
    /// Run the profit engine stages for one date
    Profit(cmd::profit::ProfitArgs),
    /// Refresh star-schema dimensions from the ERP
    Dims(cmd::dims::DimsArgs),
    /// Show partition and dimension state
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    setup_signal_handler();

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Daily(args) => cmd::daily::run(args, &config),
        Command::Range(args) => cmd::range::run(args, &config),
        Command::Health(args) => cmd::health::run(args, &config),
        Command::Profit(args) => cmd::profit::run(args, &config),
        Command::Dims(args) => cmd::dims::run(args, &config),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec!["Lake root", &config.lake.root.display().to_string()]);
            table.add_row(vec!["Source URL", &config.source.url]);
            table.add_row(vec!["Source database", &config.source.database]);
            table.add_row(vec!["Source username", &config.source.username]);
            table.add_row(vec![
                "Source API key",
                if config.source.api_key.is_some() {
                    "configured"
                } else {
                    "not set"
                },
            ]);
            table.add_row(vec![
                "Workers",
                &format!("{} (max: {})", config.workers.default, config.workers.max),
            ]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}

fn setup_signal_handler() {
    // First signal: set graceful shutdown flag
    // Second signal: force exit (default SIGINT behavior restored)
    // SAFETY: AtomicBool::store and process::exit are async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGTERM handler");
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .expect("Failed to register SIGINT handler");
    }
}
