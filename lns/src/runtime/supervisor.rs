//! Packet-forwarder supervision
//!
//! One supervisor per node owns the forwarder child process. The child is
//! spawned with `kill_on_drop`, so it dies with the supervisor on every
//! exit path: `stop()`, a dropped supervisor, or a panicking runtime.

use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::PacketForwarderConfig;

pub struct PacketForwarderSupervisor {
    config: PacketForwarderConfig,
    restarts: Arc<AtomicU32>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PacketForwarderSupervisor {
    pub fn new(config: PacketForwarderConfig) -> Self {
        Self {
            config,
            restarts: Arc::new(AtomicU32::new(0)),
            shutdown: None,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// How often the forwarder has been restarted after exiting
    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Spawn the forwarder and start watching it.
    ///
    /// Spawn failures of the first start are returned; later restarts
    /// only log.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let child = spawn_forwarder(&self.config)?;
        info!(command = %self.config.command, pid = ?child.id(), "Packet forwarder started");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(
            self.config.clone(),
            child,
            shutdown_rx,
            Arc::clone(&self.restarts),
        ));

        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
        Ok(())
    }

    /// Kill the forwarder and wait for the watcher to finish
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.context("Packet forwarder watcher panicked")?;
        }
        info!(command = %self.config.command, "Packet forwarder stopped");
        Ok(())
    }
}

impl Drop for PacketForwarderSupervisor {
    fn drop(&mut self) {
        // Aborting drops the child, and kill_on_drop reaps it
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn spawn_forwarder(config: &PacketForwarderConfig) -> Result<Child> {
    Command::new(&config.command)
        .args(&config.args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn packet forwarder '{}'", config.command))
}

async fn supervise(
    config: PacketForwarderConfig,
    mut child: Child,
    mut shutdown: oneshot::Receiver<()>,
    restarts: Arc<AtomicU32>,
) {
    loop {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => warn!(command = %config.command, %status, "Packet forwarder exited"),
                    Err(e) => error!(command = %config.command, error = %e, "Failed to wait for packet forwarder"),
                }
                if !config.restart {
                    return;
                }

                tokio::select! {
                    _ = tokio::time::sleep(config.restart_delay) => {}
                    _ = &mut shutdown => return,
                }

                match spawn_forwarder(&config) {
                    Ok(next) => {
                        restarts.fetch_add(1, Ordering::Relaxed);
                        info!(command = %config.command, pid = ?next.id(), "Packet forwarder restarted");
                        child = next;
                    }
                    Err(e) => {
                        error!(error = %format!("{e:#}"), "Giving up on packet forwarder");
                        return;
                    }
                }
            }
            _ = &mut shutdown => {
                if let Err(e) = child.kill().await {
                    warn!(command = %config.command, error = %e, "Failed to kill packet forwarder");
                }
                return;
            }
        }
    }
}
