mod config;
mod identity;
mod serve;
mod sweep;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use suitedbot_market::{Marketplace, SystemClock};
use suitedbot_storage::MemoryStorage;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::FileConfig;
use crate::identity::StaticTokens;
use crate::serve::ServeOptions;

/// SuitedBot task marketplace.
#[derive(Parser)]
#[command(name = "suitedbot", version, about = "SuitedBot task marketplace")]
struct Cli {
    /// Log level for suitedbot crates (overridden by RUST_LOG)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the marketplace HTTP API server
    Serve {
        /// Address to listen on
        #[arg(long, env = "LISTEN", default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
        /// TOML file with [market] settings and [[users]] seed accounts
        #[arg(long, env = "SUITEDBOT_CONFIG")]
        config: Option<PathBuf>,
        /// Shared secret for /cron/auto-approve-submissions
        #[arg(long, env = "CRON_SECRET")]
        cron_secret: Option<String>,
        /// Hours a pending submission waits before auto-approval
        #[arg(long, env = "AUTO_APPROVE_HOURS")]
        auto_approve_hours: Option<i64>,
    },

    /// Trigger the auto-approval sweeper on a running server
    Sweep {
        /// Base URL of the server
        #[arg(long, env = "SUITEDBOT_URL", default_value = "http://127.0.0.1:8080")]
        url: String,
        /// Shared secret configured on the server
        #[arg(long, env = "CRON_SECRET")]
        cron_secret: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("suitedbot={},info", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Serve {
            listen,
            config,
            cron_secret,
            auto_approve_hours,
        } => {
            if let Err(e) = cmd_serve(listen, config, cron_secret, auto_approve_hours) {
                error!("server error: {}", e);
                process::exit(1);
            }
        }
        Commands::Sweep { url, cron_secret } => match sweep::trigger(&url, &cron_secret) {
            Ok(report) => println!("{}", report),
            Err(e) => {
                error!("sweep failed: {}", e);
                process::exit(1);
            }
        },
    }
}

fn cmd_serve(
    listen: SocketAddr,
    config_path: Option<PathBuf>,
    cron_secret: Option<String>,
    auto_approve_hours: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = match &config_path {
        Some(path) => config::load(path)?,
        None => FileConfig::default(),
    };

    let mut market_config = file.market_config();
    if let Some(hours) = auto_approve_hours {
        if hours <= 0 {
            return Err(format!("--auto-approve-hours must be positive, got {hours}").into());
        }
        market_config = market_config.with_auto_approve_hours(hours);
    }
    let cron_secret = cron_secret.or_else(|| file.market.cron_secret.clone());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let market = Marketplace::new(Arc::new(MemoryStorage::new()), SystemClock, market_config);

        let mut tokens = StaticTokens::new();
        let now = market.now();
        for seed in &file.users {
            let account = market.register_user(seed.to_account(now)).await?;
            if let Some(token) = &seed.token {
                tokens.insert(token, account.id);
            }
        }
        if tokens.is_empty() {
            warn!("no user tokens configured; authenticated endpoints will answer 401");
        }
        info!(
            users = file.users.len(),
            tokens = tokens.len(),
            "seed accounts loaded"
        );

        serve::start_server(
            market,
            Box::new(tokens),
            ServeOptions {
                listen,
                cron_secret,
            },
        )
        .await
    })
}
