//! Grin stats collector - main entry point

use anyhow::Context;
use tracing::{error, info};

use grin_stats_collector::cli::{self, Command, LogFormat};
use grin_stats_collector::collector::{self, Collector};
use grin_stats_collector::config::Config;

#[tokio::main]
async fn main() {
    let args = cli::parse_args();
    init_logging(&args);

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: cli::Args) -> anyhow::Result<()> {
    let mut config = match &args.config_path {
        Some(path) => Config::load(path).with_context(|| format!("loading configuration from {:?}", path))?,
        None => Config::default(),
    };
    config.apply_env();
    config.apply_cli_overrides(&args);
    config.load_secrets();
    config.validate().context("invalid configuration")?;

    let command = args.command();
    info!("Running {:?}", command);

    if command == Command::InitDb {
        return collector::init_db(&config)
            .await
            .context("initialising database");
    }

    let collector = Collector::open(config).await.context("opening collector")?;
    let result = collector.run(command).await;
    collector.close().await;
    result.with_context(|| format!("{:?} failed", command))
}

fn init_logging(args: &cli::Args) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Json => fmt().json().with_env_filter(filter).with_target(true).init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).init(),
    }
}
