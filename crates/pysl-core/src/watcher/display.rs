//! Display loop
//!
//! Waits for the next queued message (bounded by the configured delay),
//! shows it, pauses for the display timer and repeats. When the delay passes
//! with nothing queued, the idle action's output is shown instead.

use std::io::{self, Write};
use std::process::Command;
use std::sync::Arc;
use std::thread;

use super::queue::OutputQueue;
use super::WatcherConfig;

/// Where the display loop is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayState {
    /// Nothing queued, no wait in progress
    #[default]
    Idle,
    /// Blocked on "new message or delay elapsed"
    Waiting,
    /// An item was shown and the display timer is running
    Displaying,
}

/// Sink for status line output
pub trait StatusDisplay: Send {
    fn show(&mut self, text: &str) -> io::Result<()>;
}

/// Writes each item as one line and flushes
pub struct TerminalDisplay<W: Write + Send> {
    out: W,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> StatusDisplay for TerminalDisplay<W> {
    fn show(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text.trim_end_matches('\n'))?;
        self.out.flush()
    }
}

/// Produces the text shown when no message arrived within the delay
pub trait IdleAction: Send {
    fn run(&self) -> String;
}

/// Shows empty text when idle
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAction;

impl IdleAction for NoAction {
    fn run(&self) -> String {
        String::new()
    }
}

impl<F> IdleAction for F
where
    F: Fn() -> String + Send,
{
    fn run(&self) -> String {
        self()
    }
}

/// Runs a shell command and shows its standard output
#[derive(Debug, Clone)]
pub struct ShellCommand {
    command: String,
}

impl ShellCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl IdleAction for ShellCommand {
    /// Spawn failures show empty text; a non-zero exit still shows whatever
    /// the command printed.
    fn run(&self) -> String {
        let output = match Command::new("sh").arg("-c").arg(&self.command).output() {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Failed to run default command {:?}: {}", self.command, e);
                return String::new();
            }
        };

        if !output.status.success() {
            tracing::warn!(
                status = %output.status,
                "Default command {:?} failed: {}",
                self.command,
                String::from_utf8_lossy(&output.stderr).trim_end()
            );
        }
        String::from_utf8_lossy(&output.stdout)
            .trim_end_matches('\n')
            .to_string()
    }
}

/// Foreground half of a watcher
pub struct DisplayLoop {
    queue: Arc<OutputQueue>,
    config: WatcherConfig,
    state: DisplayState,
}

impl DisplayLoop {
    pub fn new(queue: Arc<OutputQueue>, config: WatcherConfig) -> Self {
        Self {
            queue,
            config,
            state: DisplayState::Idle,
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    /// Run until the queue is closed
    pub fn run(
        &mut self,
        display: &mut dyn StatusDisplay,
        action: &dyn IdleAction,
    ) -> io::Result<()> {
        while let Some(text) = self.next_item(action) {
            self.show(display, &text)?;
        }
        self.state = DisplayState::Idle;
        tracing::debug!("Display loop stopped");
        Ok(())
    }

    /// Wait for the next thing to show. `None` once the queue is closed.
    ///
    /// A queued message always wins over the idle action, even one that
    /// arrives while the action is running.
    pub fn next_item(&mut self, action: &dyn IdleAction) -> Option<String> {
        self.state = DisplayState::Waiting;
        self.queue.wait_for_item(self.config.delay);
        if self.queue.is_closed() {
            return None;
        }
        if let Some(text) = self.queue.try_pop() {
            return Some(text);
        }

        tracing::trace!("Delay elapsed with empty queue, running idle action");
        let fallback = action.run();
        match self.queue.try_pop() {
            Some(text) => {
                tracing::debug!("Message arrived during idle action, discarding its output");
                Some(text)
            }
            None => Some(fallback),
        }
    }

    /// Show one item, then hold it for the display timer
    pub fn show(&mut self, display: &mut dyn StatusDisplay, text: &str) -> io::Result<()> {
        self.state = DisplayState::Displaying;
        display.show(text)?;
        thread::sleep(self.config.timer);
        Ok(())
    }
}
