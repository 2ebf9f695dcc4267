//! LNP/BP Testkit CLI
//!
//! Drives a regtest bitcoind and LND network from the command line: warm it
//! up, pay links, issue invoices, mine blocks and load scenarios.

use anyhow::Result;
use clap::{Parser, Subcommand};
use lnpbp_testkit::WarmUp;
use std::path::PathBuf;

mod commands;
mod ui;

use commands::ConfigSource;

#[derive(Parser, Debug)]
#[command(name = "testkit")]
#[command(about = "LNP/BP Testkit - Drive a regtest bitcoind and LND network", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Network configuration file (TOML or JSON). Without it the
    /// configuration is read from TESTKIT_* environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the system regtest network installed from CADR
    #[arg(long, global = true, conflicts_with = "config")]
    system: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare mature coins, the secondary node and optionally a channel
    WarmUp {
        /// Do not mine blocks
        #[arg(long)]
        no_blocks: bool,

        /// Do not spawn the secondary node
        #[arg(long)]
        no_secondary: bool,

        /// Open a channel from the secondary to the primary node
        #[arg(long)]
        channels: bool,
    },

    /// Pay a BIP21 URI, a lightning: URI or a raw invoice
    Pay {
        /// Payment link
        link: String,
    },

    /// Send an amount of BTC to an on-chain address
    PayLegacy {
        /// Destination address
        address: String,

        /// Amount in BTC (e.g., "0.25")
        amount: String,
    },

    /// Issue an invoice from the primary node
    Invoice {
        /// Amount in millisatoshis
        amount_msat: u64,

        /// Invoice description
        #[arg(short, long)]
        memo: Option<String>,

        /// Wait until the invoice is paid or expires
        #[arg(short, long)]
        wait: bool,
    },

    /// Mine blocks to a fresh wallet address
    Mine {
        /// Number of blocks
        #[arg(allow_hyphen_values = true)]
        count: i64,
    },

    /// Mine whenever the mempool is not empty, until Ctrl-C
    AutoMine {
        /// Seconds between mempool checks
        #[arg(long, default_value = "3")]
        poll_secs: u64,

        /// Blocks mined per round
        #[arg(long, default_value = "6")]
        blocks: u64,
    },

    /// Spawn the nodes and channels described by a scenario file
    Scenario {
        /// Scenario file (TOML or JSON)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("testkit=debug,lnpbp_testkit=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("testkit=info,lnpbp_testkit=warn")
            .init();
    }

    let config = match (&cli.config, cli.system) {
        (Some(path), _) => ConfigSource::File(path),
        (None, true) => ConfigSource::System,
        (None, false) => ConfigSource::Env,
    };

    // Dispatch commands
    match cli.command {
        Commands::WarmUp {
            no_blocks,
            no_secondary,
            channels,
        } => {
            let warm_up = WarmUp {
                mine_blocks: !no_blocks,
                spawn_secondary: !no_secondary,
                open_channels: channels,
            };
            commands::warm_up::run(config, warm_up, cli.verbose).await?;
        }
        Commands::Pay { link } => {
            commands::pay::run(config, &link, cli.verbose).await?;
        }
        Commands::PayLegacy { address, amount } => {
            commands::pay::legacy(config, &address, &amount, cli.verbose).await?;
        }
        Commands::Invoice {
            amount_msat,
            memo,
            wait,
        } => {
            commands::invoice::run(config, amount_msat, memo.as_deref(), wait, cli.verbose).await?;
        }
        Commands::Mine { count } => {
            commands::mine::run(config, count, cli.verbose).await?;
        }
        Commands::AutoMine { poll_secs, blocks } => {
            commands::mine::auto(config, poll_secs, blocks, cli.verbose).await?;
        }
        Commands::Scenario { file } => {
            commands::scenario::run(config, &file, cli.verbose).await?;
        }
    }

    Ok(())
}
