mod ask;
mod deploy_cmd;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use milton_config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "milton", version, about = "Milton agent orchestration and model-lifecycle control plane")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config/milton.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP/WS gateway and the trigger scheduler in one process.
    Serve,
    /// Select the best benchmarked model and deploy it.
    #[command(name = "deploy-best-model")]
    DeployBestModel {
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_name = "F")]
        benchmark_file: Option<PathBuf>,
        #[arg(long, value_name = "P")]
        target_path: Option<PathBuf>,
        #[arg(long)]
        skip_checksum: bool,
        #[arg(long)]
        skip_load_test: bool,
    },
    /// Swap the current deployment back to its previous install.
    Rollback,
    /// Submit a query to a running `milton serve` instance and print the result.
    Ask {
        query: Vec<String>,
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        base_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    match cli.command {
        Commands::Serve => serve::run(config).await?,
        Commands::DeployBestModel { dry_run, benchmark_file, target_path, skip_checksum, skip_load_test } => {
            let code = deploy_cmd::run(config, deploy_cmd::DeployArgs { dry_run, benchmark_file, target_path, skip_checksum, skip_load_test }).await;
            std::process::exit(code);
        }
        Commands::Rollback => {
            let code = deploy_cmd::rollback(config).await;
            std::process::exit(code);
        }
        Commands::Ask { query, base_url } => ask::run(&base_url, query.join(" ")).await?,
    }

    Ok(())
}
