use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use pysl_core::{ChannelRegistry, SenderConfig, WatcherConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Status line fed by short-lived senders over named pipes")]
pub struct Config {
    /// Message to send
    pub text: Option<String>,

    /// Run in watcher mode
    #[arg(short, long)]
    pub watch: bool,

    /// Channel id (default: broadcast when sending, process id when watching)
    #[arg(short, long, visible_alias = "pid", value_name = "ID")]
    pub id: Option<String>,

    /// Seconds to wait for messages before the default action
    #[arg(short, long, value_name = "SECS")]
    pub delay: Option<f64>,

    /// Seconds each message stays on screen
    #[arg(short, long, value_name = "SECS")]
    pub timer: Option<f64>,

    /// Command whose output is shown when no messages are queued
    #[arg(long, value_name = "CMD")]
    pub default_cmd: Option<String>,

    /// Ignore broadcast messages
    #[arg(long)]
    pub direct_msg_only: bool,

    /// Directory holding the channels
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Seconds a send waits for a reader before removing the channel
    #[arg(long, value_name = "SECS")]
    pub write_timeout: Option<f64>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding the channels (default: /tmp)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Write timeout in milliseconds before a channel is considered stale
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Watcher settings
    #[serde(default)]
    pub watch: WatchSettings,
}

fn default_write_timeout() -> u64 {
    1000
}

/// Watcher-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Seconds to wait for a message before running the default command
    #[serde(default = "default_delay")]
    pub delay_secs: f64,

    /// Seconds each displayed item is held
    #[serde(default = "default_timer")]
    pub timer_secs: f64,

    /// Shell command shown when idle
    #[serde(default)]
    pub default_cmd: Option<String>,

    /// Ignore broadcast messages
    #[serde(default)]
    pub direct_msg_only: bool,
}

fn default_delay() -> f64 {
    3.0
}

fn default_timer() -> f64 {
    0.3
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            delay_secs: default_delay(),
            timer_secs: default_timer(),
            default_cmd: None,
            direct_msg_only: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: None,
            write_timeout_ms: default_write_timeout(),
            watch: WatchSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config file: {:?}", p))?;
            return toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", p));
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("pysl/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/pysl/config.toml")),
            dirs::home_dir().map(|p| p.join(".pysl.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        Ok(Self::default())
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(root) = &cli.root {
            self.root = Some(root.clone());
        }
        if let Some(secs) = cli.write_timeout {
            self.write_timeout_ms = (secs.max(0.0) * 1000.0).round() as u64;
        }
        if let Some(delay) = cli.delay {
            self.watch.delay_secs = delay;
        }
        if let Some(timer) = cli.timer {
            self.watch.timer_secs = timer;
        }
        if let Some(cmd) = &cli.default_cmd {
            self.watch.default_cmd = Some(cmd.clone());
        }
        if cli.direct_msg_only {
            self.watch.direct_msg_only = true;
        }
    }

    /// Validate and normalize settings values
    ///
    /// Durations are clamped to `[0, MAX_SECS]` (NaN becomes the default).
    /// The display timer and the write timeout never drop below 10ms.
    pub fn validate(&mut self) {
        const MAX_SECS: f64 = 86_400.0;
        const MIN_TIMER_SECS: f64 = 0.01;
        const MIN_WRITE_TIMEOUT_MS: u64 = 10;

        self.watch.delay_secs = clamp_secs(self.watch.delay_secs, default_delay(), MAX_SECS);
        self.watch.timer_secs = clamp_secs(self.watch.timer_secs, default_timer(), MAX_SECS)
            .max(MIN_TIMER_SECS);
        if self.write_timeout_ms < MIN_WRITE_TIMEOUT_MS {
            self.write_timeout_ms = MIN_WRITE_TIMEOUT_MS;
        }
        if matches!(&self.watch.default_cmd, Some(cmd) if cmd.trim().is_empty()) {
            self.watch.default_cmd = None;
        }
    }

    /// Registry rooted at the configured directory
    pub fn registry(&self) -> ChannelRegistry {
        match &self.root {
            Some(root) => ChannelRegistry::new(root),
            None => ChannelRegistry::default(),
        }
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            delay: Duration::try_from_secs_f64(self.watch.delay_secs).unwrap_or_default(),
            timer: Duration::try_from_secs_f64(self.watch.timer_secs).unwrap_or_default(),
            direct_only: self.watch.direct_msg_only,
        }
    }
}

fn clamp_secs(value: f64, default: f64, max: f64) -> f64 {
    if value.is_nan() {
        default
    } else {
        value.clamp(0.0, max)
    }
}
