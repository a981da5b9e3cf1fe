use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

mod assemble;
mod classify;
mod cli;
mod command;
mod config;
mod environment;
mod error;
mod inventory;
mod knife;
mod locker;
mod model;
mod store;
#[cfg(test)]
mod testing;
mod util;

use assemble::Assembler;
use cli::{Command, LockArgs, RootArgs, SolveArgs};
use command::{is_automation_command, parse_command};
use config::{config_stub, load_config, LockConfig};
use error::LockError;
use inventory::{HttpInventory, Inventory};
use knife::{KnifeResolver, Resolver};
use locker::PackageLocker;
use store::{DirEnvironmentStore, LatestAllowlist};
use util::display_path;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let result = match args.command {
        Command::Lock(lock) => cmd_lock(args.config.as_deref(), lock),
        Command::Solve(solve) => cmd_solve(args.config.as_deref(), solve),
        Command::Config => cmd_config(),
    };
    if let Some(collaborator) = result
        .as_ref()
        .err()
        .and_then(|err| err.downcast_ref::<LockError>())
        .and_then(LockError::collaborator)
    {
        tracing::error!(%collaborator, "run aborted");
    }
    result
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn resolver_for(config: &LockConfig) -> Result<KnifeResolver> {
    KnifeResolver::new(
        &config.knife_command,
        config.knife_config.clone(),
        config.chef_repo.clone(),
    )
    .context("prepare knife")
}

fn cmd_lock(config_path: Option<&Path>, args: LockArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = args.environments_dir {
        config.environments_dir = dir;
    }
    if args.allowlist.is_some() {
        config.latest_allowlist = args.allowlist;
    }
    config.publish |= args.publish;

    let inventory = HttpInventory::new(&config.inventory_url, config.timeout(), config.throttle());
    let resolver = resolver_for(&config)?;
    let mut store = DirEnvironmentStore::new(config.environments_dir.clone());
    let allowlist = config
        .latest_allowlist
        .as_deref()
        .map(LatestAllowlist::load)
        .transpose()?;

    let locker = PackageLocker::new(
        &inventory,
        &resolver,
        &mut store,
        config.classifier(),
        &config.automation_marker,
    );
    let mut assembler = Assembler::new(&inventory, locker);
    if let Some(allowlist) = allowlist {
        if allowlist.is_empty() {
            tracing::warn!("latest allowlist is empty; every appliance will be skipped");
        } else {
            tracing::info!(entries = allowlist.len(), "latest allowlist loaded");
        }
        assembler = assembler.with_allowlist(allowlist);
    }
    if config.publish {
        assembler = assembler.with_publisher(&inventory);
    }

    let report = if args.all {
        assembler.lock_all()?
    } else {
        assembler.lock_references(&args.appliance)?
    };

    let cwd = std::env::current_dir().ok();
    let locked = report
        .appliances
        .iter()
        .filter(|a| a.locked_reference.is_some())
        .count();
    tracing::info!(
        appliances = report.appliances.len(),
        locked,
        environments = report.environments_written,
        dir = %display_path(store.dir(), cwd.as_deref()),
        "run complete"
    );
    print_json(&report)?;
    if let Some(out) = &args.out {
        write_json(out, &report)?;
    }
    Ok(())
}

fn cmd_solve(config_path: Option<&Path>, args: SolveArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let inventory = HttpInventory::new(&config.inventory_url, config.timeout(), config.throttle());
    let resolver = resolver_for(&config)?;

    let package = inventory.package(&args.package)?;
    if !is_automation_command(&package.command, &config.automation_marker) {
        return Err(anyhow!(
            "package {} has no automation command: {:?}",
            package.reference(),
            package.command
        ));
    }
    let parsed = parse_command(&package.command)?;
    let listing = resolver.solve(&parsed.run_list, parsed.environment())?;
    let cookbooks = config.classifier().classify_listing(&listing)?;
    print_json(&cookbooks)
}

fn cmd_config() -> Result<()> {
    println!("{}", config_stub()?);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize report")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
