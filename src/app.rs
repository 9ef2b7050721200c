//! Watch and send entry points

use std::io::Write;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::oneshot;

use pysl_core::{
    ChannelError, ChannelIdentity, IdleAction, NoAction, Sender, ShellCommand, TerminalDisplay,
    Watcher,
};

use crate::config::{Config, Settings};

/// Run in watcher or sender mode
pub async fn run(cli: &Config, settings: &Settings) -> Result<()> {
    let identity = cli
        .id
        .as_deref()
        .map(ChannelIdentity::new)
        .transpose()
        .context("Invalid channel id")?;

    if cli.watch {
        watch(identity.unwrap_or_else(ChannelIdentity::current_process), settings).await
    } else {
        send(cli.text.clone().unwrap_or_default(), identity, settings).await
    }
}

/// Termination signals that trigger channel cleanup
struct ShutdownSignals {
    interrupt: Signal,
    hangup: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())
                .context("Failed to install SIGINT handler")?,
            hangup: signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?,
            terminate: signal(SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?,
        })
    }

    /// Wait for the first signal and return its name
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

async fn watch(identity: ChannelIdentity, settings: &Settings) -> Result<()> {
    // Handlers go in before the channel exists so no signal can leave it behind
    let mut signals = ShutdownSignals::install()?;

    println!("pysl launched...");
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let registry = settings.registry();
    let watcher = match Watcher::bind(&registry, identity, settings.watcher_config()) {
        Ok(watcher) => Arc::new(watcher),
        Err(e @ ChannelError::AlreadyExists(_)) => {
            return Err(e).context("Another watcher owns this channel (or it is stale; remove it)");
        }
        Err(e) => return Err(e).context("Failed to create channel"),
    };
    watcher
        .spawn_reader()
        .context("Failed to start channel reader")?;

    let action: Box<dyn IdleAction> = match &settings.watch.default_cmd {
        Some(cmd) => Box::new(ShellCommand::new(cmd.clone())),
        None => Box::new(NoAction),
    };

    let (done_tx, done_rx) = oneshot::channel();
    let display_watcher = watcher.clone();
    thread::Builder::new()
        .name("pysl-display".into())
        .spawn(move || {
            let mut display = TerminalDisplay::stdout();
            let result = display_watcher
                .display_loop()
                .run(&mut display, action.as_ref());
            let _ = done_tx.send(result);
        })
        .context("Failed to start display loop")?;

    tokio::select! {
        name = signals.recv() => {
            tracing::info!(signal = name, "Shutting down");
            watcher.shutdown();
            println!("Process interrupt detected. Exiting...");
            Ok(())
        }
        result = done_rx => {
            watcher.shutdown();
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("Status display failed"),
                Err(_) => bail!("Display loop exited unexpectedly"),
            }
        }
    }
}

async fn send(text: String, target: Option<ChannelIdentity>, settings: &Settings) -> Result<()> {
    let sender = Sender::new(settings.registry(), settings.sender_config());

    let report = tokio::task::spawn_blocking(move || sender.send(&text, target.as_ref()))
        .await
        .context("Send task failed")?
        .context("Failed to deliver message")?;

    tracing::debug!(
        delivered = report.delivered.len(),
        removed = report.removed.len(),
        vanished = report.vanished.len(),
        failed = report.failed.len(),
        "Send finished"
    );
    Ok(())
}
