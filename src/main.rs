//! Crypto OMS - main entry point
//!
//! Subcommands:
//! - positions / orders: sync from the exchange and print the cache
//! - flash-close / close / cancel-all / close-all: trade execution
//! - decode: precision-safe decode of a raw payload (offline)

use anyhow::Result;
use clap::{Parser, Subcommand};
use crypto_oms::oms::PositionSide;
use crypto_oms::Money;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "crypto-oms")]
#[command(about = "Order management and safe position closing for crypto derivatives", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults plus environment when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync and list open positions
    Positions,

    /// Sync and list cached orders
    Orders,

    /// Cancel working orders, then close the whole position at market
    FlashClose {
        /// Trading pair, e.g. BTCUSDT
        #[arg(short, long)]
        symbol: String,

        /// Position side (long or short)
        #[arg(long)]
        side: PositionSide,

        /// Close even if cancelling working orders fails
        #[arg(long)]
        force: bool,
    },

    /// Close all or part of a position at market
    Close {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        side: PositionSide,

        /// Quantity to close; omit to close everything
        #[arg(short, long)]
        amount: Option<Money>,

        /// Close the full position, resyncing first if the cache is stale
        #[arg(long)]
        force_full: bool,
    },

    /// Cancel all working orders on a symbol
    CancelAll {
        #[arg(short, long)]
        symbol: String,
    },

    /// Close every open position
    CloseAll,

    /// Decode a raw exchange payload without losing precision
    Decode {
        /// Input file (stdin when omitted)
        input: Option<PathBuf>,

        /// Also map the payload as an order or position record
        #[arg(long, value_enum)]
        map: Option<commands::decode::RecordKind>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Positions => "positions",
        Commands::Orders => "orders",
        Commands::FlashClose { .. } => "flash_close",
        Commands::Close { .. } => "close",
        Commands::CancelAll { .. } => "cancel_all",
        Commands::CloseAll => "close_all",
        Commands::Decode { .. } => "decode",
    };

    setup_logging(cli.verbose, command_name)?;

    let config = cli.config;
    match cli.command {
        Commands::Positions => commands::query::positions(config).await,
        Commands::Orders => commands::query::orders(config).await,
        Commands::FlashClose {
            symbol,
            side,
            force,
        } => commands::close::flash_close(config, symbol, side, force).await,
        Commands::Close {
            symbol,
            side,
            amount,
            force_full,
        } => commands::close::close(config, symbol, side, amount, force_full).await,
        Commands::CancelAll { symbol } => commands::close::cancel_all(config, symbol).await,
        Commands::CloseAll => commands::close::close_all(config).await,
        Commands::Decode { input, map } => commands::decode::run(input, map),
    }
}
