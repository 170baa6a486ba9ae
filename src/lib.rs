// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod kernel;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate, load_or_default};
use crate::config::model::{ConfigFile, WatchRoot};
use crate::watch::policy::WatchPolicy;

pub use crate::engine::{KInotify, WatcherOptions, WatcherOutput};
pub use crate::watch::event::WatchEvent;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - merging config roots with CLI paths
/// - the watcher task
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;
    let roots = effective_roots(&cfg, &args)?;

    if args.dry_run {
        print_dry_run(&cfg, &roots);
        return Ok(());
    }

    if roots.is_empty() {
        anyhow::bail!("nothing to watch: pass a PATH or add a [[watch]] section");
    }

    watch_until_interrupted(&cfg, roots).await
}

fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => {
            let path = default_config_path();
            load_or_default(&path).with_context(|| format!("loading config {}", path.display()))
        }
    }
}

/// Config roots followed by the CLI paths, each with its effective policy.
fn effective_roots(cfg: &ConfigFile, args: &CliArgs) -> Result<Vec<(PathBuf, WatchPolicy)>> {
    let mut roots = cfg.roots()?;
    for path in &args.paths {
        let mut root = WatchRoot::new(path.clone());
        if !args.events.is_empty() {
            root.events = Some(args.events.clone());
        }
        if args.include_hidden {
            root.include_hidden = Some(true);
        }
        roots.push((path.clone(), cfg.policy_for(&root)?));
    }
    Ok(roots)
}

#[cfg(target_os = "linux")]
async fn watch_until_interrupted(cfg: &ConfigFile, roots: Vec<(PathBuf, WatchPolicy)>) -> Result<()> {
    let (handle, mut outputs) = crate::engine::spawn_watcher(cfg.watcher_options())?;

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
        }
        info!("interrupted, shutting down");
    };
    crate::engine::serve(&handle, &mut outputs, roots, interrupted, |output| match output {
        WatcherOutput::Event(event) => println!("{event}"),
        WatcherOutput::WatchLimitReached => {
            warn!("inotify watch limit reached; some directories are not watched");
        }
    })
    .await?;

    handle.shutdown().await?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn watch_until_interrupted(_cfg: &ConfigFile, _roots: Vec<(PathBuf, WatchPolicy)>) -> Result<()> {
    Err(errors::KinotifyError::Unavailable("inotify is only available on Linux".to_string()).into())
}

/// Simple dry-run output: print watcher settings and roots.
fn print_dry_run(cfg: &ConfigFile, roots: &[(PathBuf, WatchPolicy)]) {
    let options = cfg.watcher_options();
    println!("kinotify dry-run");
    println!("  watcher.batch_size = {}", options.batch_size);
    println!("  watcher.read_buffer_size = {}", options.read_buffer_size);
    println!("  watcher.move_cookie_ttl_ms = {}", options.move_ttl.as_millis());
    println!("  watcher.max_pending_moves = {}", options.max_pending_moves);
    println!("  watcher.min_kernel_version = {}", options.min_kernel_version);
    println!();

    println!("roots ({}):", roots.len());
    for (path, policy) in roots {
        println!("  - {}", path.display());
        println!("      events: {:?}", policy.events);
        if !policy.flags.is_empty() {
            println!("      flags: {:?}", policy.flags);
        }
        if policy.include_hidden {
            println!("      include_hidden: true");
        }
        println!("      filter: {:?}", policy.filter);
    }
}
