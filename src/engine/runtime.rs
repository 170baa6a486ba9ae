// src/engine/runtime.rs

use std::future::Future;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::unix::AsyncFd;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::errors::{KinotifyError, Result};
use crate::fs::RealFileSystem;
use crate::kernel::LinuxKernel;
use crate::watch::event::WatchEvent;
use crate::watch::policy::WatchPolicy;

use super::facade::KInotify;
use super::scheduler::ChannelScheduler;
use super::{WatcherOptions, WatcherOutput};

const MIN_EVICTION_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug)]
enum WatcherCommand {
    AddWatch {
        path: PathBuf,
        policy: WatchPolicy,
        reply: oneshot::Sender<bool>,
    },
    RemoveWatch {
        path: PathBuf,
        reply: oneshot::Sender<bool>,
    },
    Watching {
        path: PathBuf,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Handle to a running watcher task.
///
/// Dropping every handle stops the task once it next polls for commands.
#[derive(Debug)]
pub struct WatcherHandle {
    commands: mpsc::Sender<WatcherCommand>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Queue `path` and its subtree for watching. See [`KInotify::add_watch`].
    pub async fn add_watch(&self, path: impl Into<PathBuf>, policy: WatchPolicy) -> Result<bool> {
        let path = path.into();
        self.request(|reply| WatcherCommand::AddWatch { path, policy, reply })
            .await
    }

    pub async fn remove_watch(&self, path: impl Into<PathBuf>) -> Result<bool> {
        let path = path.into();
        self.request(|reply| WatcherCommand::RemoveWatch { path, reply })
            .await
    }

    pub async fn watching(&self, path: impl Into<PathBuf>) -> Result<bool> {
        let path = path.into();
        self.request(|reply| WatcherCommand::Watching { path, reply })
            .await
    }

    /// Stop the watcher task and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        // The task may already be gone if the consumer hung up.
        let _ = self.commands.send(WatcherCommand::Shutdown).await;
        self.task
            .await
            .map_err(|e| KinotifyError::Other(anyhow::anyhow!("watcher task failed: {e}")))
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<bool>) -> WatcherCommand,
    ) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }
}

fn stopped() -> KinotifyError {
    KinotifyError::Other(anyhow::anyhow!("watcher task has stopped"))
}

/// Open inotify and spawn the watcher task on the current tokio runtime.
///
/// Returns the command handle and the receiving end of the output
/// channel. Fails with [`KinotifyError::Unavailable`] when inotify cannot
/// be opened or the kernel is too old.
pub fn spawn_watcher(
    options: WatcherOptions,
) -> Result<(WatcherHandle, mpsc::Receiver<WatcherOutput>)> {
    let (scheduler, drain_rx) = ChannelScheduler::new();
    let facade = KInotify::new(
        LinuxKernel::open(),
        Arc::new(RealFileSystem),
        Box::new(scheduler),
        &options,
    );
    let fd = facade.raw_fd().ok_or_else(|| {
        KinotifyError::Unavailable(format!(
            "inotify could not be opened or kernel is older than {}",
            options.min_kernel_version
        ))
    })?;
    let async_fd = AsyncFd::new(fd)?;

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (out_tx, out_rx) = mpsc::channel(options.output_capacity.max(1));
    let eviction_period = (options.move_ttl / 2).max(MIN_EVICTION_PERIOD);

    let task = tokio::spawn(run_loop(
        facade,
        async_fd,
        cmd_rx,
        drain_rx,
        out_tx,
        eviction_period,
    ));

    info!("inotify watcher started");
    Ok((
        WatcherHandle {
            commands: cmd_tx,
            task,
        },
        out_rx,
    ))
}

/// Register `roots` with the watcher while forwarding its output to `sink`.
///
/// Output is read while registration is still in progress, so a watcher
/// blocked on a full output channel always gets back to its commands.
/// Returns when `stop` resolves or the watcher task ends.
pub async fn serve(
    handle: &WatcherHandle,
    outputs: &mut mpsc::Receiver<WatcherOutput>,
    roots: Vec<(PathBuf, WatchPolicy)>,
    stop: impl Future<Output = ()>,
    mut sink: impl FnMut(WatcherOutput),
) -> Result<()> {
    let register = async {
        for (path, policy) in roots {
            if !handle.add_watch(path.clone(), policy).await? {
                warn!(path = ?path, "watch request rejected");
            }
        }
        Ok::<(), KinotifyError>(())
    };
    tokio::pin!(register);
    tokio::pin!(stop);
    let mut registering = true;

    loop {
        tokio::select! {
            res = &mut register, if registering => {
                registering = false;
                res?;
                debug!("all roots registered");
            }
            output = outputs.recv() => match output {
                Some(output) => sink(output),
                None => {
                    info!("watcher stopped");
                    return Ok(());
                }
            },
            () = &mut stop => return Ok(()),
        }
    }
}

/// Main event loop.
///
/// `async_fd` wraps the descriptor owned by `facade` and must be dropped
/// before it.
async fn run_loop(
    mut facade: KInotify<LinuxKernel>,
    async_fd: AsyncFd<RawFd>,
    mut cmd_rx: mpsc::Receiver<WatcherCommand>,
    mut drain_rx: mpsc::UnboundedReceiver<()>,
    out_tx: mpsc::Sender<WatcherOutput>,
    eviction_period: Duration,
) {
    let mut tick = tokio::time::interval(eviction_period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let keep_running = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(WatcherCommand::Shutdown) | None => {
                    debug!("watcher shutdown requested");
                    false
                }
                Some(cmd) => {
                    handle_command(&mut facade, cmd);
                    true
                }
            },
            Some(()) = drain_rx.recv() => {
                let step = facade.drain_pending();
                if step.limit_reached {
                    out_tx.send(WatcherOutput::WatchLimitReached).await.is_ok()
                } else {
                    true
                }
            }
            ready = async_fd.readable() => match ready {
                Ok(mut guard) => {
                    let step = facade.on_readable();
                    if step.would_block {
                        guard.clear_ready();
                    }
                    drop(guard);
                    publish(&out_tx, step.events).await
                }
                Err(err) => {
                    error!(error = %err, "polling inotify descriptor failed");
                    false
                }
            },
            _ = tick.tick() => {
                facade.evict_stale_moves(Instant::now());
                true
            }
        };

        if !keep_running {
            break;
        }
    }

    drop(async_fd);
    info!(watches = facade.watch_count(), "inotify watcher stopped");
}

fn handle_command(facade: &mut KInotify<LinuxKernel>, cmd: WatcherCommand) {
    let (reply, result) = match cmd {
        WatcherCommand::AddWatch {
            path,
            policy,
            reply,
        } => (reply, facade.add_watch(&path, policy)),
        WatcherCommand::RemoveWatch { path, reply } => (reply, facade.remove_watch(&path)),
        WatcherCommand::Watching { path, reply } => (reply, facade.watching(&path)),
        WatcherCommand::Shutdown => return,
    };
    // The caller may have given up waiting.
    let _ = reply.send(result);
}

/// Forward events in order. Returns `false` once the consumer is gone.
async fn publish(out_tx: &mpsc::Sender<WatcherOutput>, events: Vec<WatchEvent>) -> bool {
    for event in events {
        debug!(%event, "publishing event");
        if out_tx.send(WatcherOutput::Event(event)).await.is_err() {
            debug!("event consumer hung up");
            return false;
        }
    }
    true
}
