//! `milton deploy-best-model` / `milton rollback`: the benchmark → select →
//! package → deploy pipeline, driven from the CLI.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use milton_config::AppConfig;
use milton_core::{BenchmarkRun, MiltonError};
use milton_deploy::{DeployOptions, DeploymentManager};
use milton_packager::{create_bundle, BundleInputs};
use milton_registry::ModelRegistry;
use milton_selector::select;

pub struct DeployArgs {
    pub dry_run: bool,
    pub benchmark_file: Option<PathBuf>,
    pub target_path: Option<PathBuf>,
    pub skip_checksum: bool,
    pub skip_load_test: bool,
}

/// Returns the process exit code (`milton_core::error::exit_code`).
pub async fn run(config: AppConfig, args: DeployArgs) -> i32 {
    match run_inner(config, args).await {
        Ok(()) => milton_core::error::exit_code::SUCCESS,
        Err(err) => {
            eprintln!("deploy-best-model failed: {err}");
            match err.downcast_ref::<MiltonError>() {
                Some(milton_err) => milton_err.exit_code(),
                None => milton_core::error::exit_code::IO_ERROR,
            }
        }
    }
}

async fn run_inner(config: AppConfig, args: DeployArgs) -> Result<()> {
    let state_root = config.state_root();
    let benchmark_path = match args.benchmark_file {
        Some(p) => p,
        None => latest_benchmark_run(&state_root).await.context("locating latest benchmark run")?,
    };
    let raw = tokio::fs::read(&benchmark_path).await.context("reading benchmark file")?;
    let run: BenchmarkRun = serde_json::from_slice(&raw).context("parsing benchmark file")?;

    let selection = select(&run, &config.selector);
    for rejection in &selection.rejected {
        tracing::info!(version = %rejection.model_version, reason = %rejection.reason, "candidate rejected");
    }
    let winner = selection.winner.ok_or(MiltonError::NoCandidate)?;
    println!("selected {} (score {:.4})", winner.model_version, winner.score);

    let registry_path = state_root.join("models/registry.json");
    let registry = ModelRegistry::new(&registry_path);
    let entries = registry.list().await?;
    let entry = entries
        .iter()
        .find(|e| e.version == winner.model_version)
        .cloned()
        .ok_or_else(|| MiltonError::ValidationError(format!("no registry entry for {}", winner.model_version)))?;

    let bundles_root = state_root.join("bundles");
    let now = Utc::now();
    let benchmark_summary = serde_json::to_value(&run)?;
    let entry_for_bundle = entry.clone();
    let model_dir = PathBuf::from(&entry.model_path);
    let bundle_path = tokio::task::spawn_blocking(move || {
        create_bundle(
            BundleInputs { model_dir: &model_dir, version: entry_for_bundle.version.clone(), registry_entry: &entry_for_bundle, benchmark_summary: &benchmark_summary },
            &bundles_root,
            now,
        )
    })
    .await
    .context("packaging task panicked")?
    .context("packaging bundle")?;

    let target = args.target_path.unwrap_or_else(|| state_root.join("deployments").join(&entry.version));
    let opts = DeployOptions { dry_run: args.dry_run, verify_checksums: !args.skip_checksum, run_load_test: !args.skip_load_test, replace: true };
    let manager = DeploymentManager::new(state_root.join("deployment_history"));
    let record = manager.deploy(&bundle_path, &target, &opts, now).await?;

    if !args.dry_run {
        registry.set_active(&entry.version).await?;
        registry.set_last_good(&entry.version).await?;
    }

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn latest_benchmark_run(state_root: &std::path::Path) -> Result<PathBuf> {
    let dir = state_root.join("benchmarks/runs");
    let mut entries = tokio::fs::read_dir(&dir).await.context("listing benchmark runs")?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
            names.push(entry.file_name());
        }
    }
    names.sort();
    let latest = names.into_iter().next_back().ok_or_else(|| anyhow::anyhow!("no benchmark runs under {}", dir.display()))?;
    Ok(dir.join(latest))
}

pub async fn rollback(config: AppConfig) -> i32 {
    let state_root = config.state_root();
    let manager = DeploymentManager::new(state_root.join("deployment_history"));
    match manager.rollback(Utc::now()).await {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record).unwrap_or_default());
            milton_core::error::exit_code::SUCCESS
        }
        Err(err) => {
            eprintln!("rollback failed: {err}");
            err.exit_code()
        }
    }
}
