//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::state::TimerSettings;

/// CLI argument parsing structure
#[derive(Debug, Parser)]
#[command(name = "cart-timer")]
#[command(about = "Cart reservation countdown service with stock holds and expired-cart archival")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Cart countdown duration in seconds
    #[arg(short, long, default_value = "90")]
    pub duration: u64,

    /// Remaining seconds at which the low-time warning fires
    #[arg(short, long, default_value = "30")]
    pub warning: u64,

    /// File the countdown is persisted to across restarts
    #[arg(long, default_value = "cart-timer-state.json")]
    pub state_file: PathBuf,

    /// Extra stock hold, in minutes, requested when checkout opens
    #[arg(long, default_value = "15")]
    pub checkout_hold_minutes: u32,

    /// Window after an expiry during which repeat triggers are ignored
    #[arg(long, default_value = "1000")]
    pub expiry_cooldown_ms: u64,

    /// Stock assumed for variants without an explicit level
    #[arg(long, default_value = "10")]
    pub default_stock: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Reject settings the countdown cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.duration == 0 {
            return Err("--duration must be at least 1 second".to_string());
        }
        if self.warning >= self.duration {
            return Err(format!(
                "--warning ({}s) must be shorter than --duration ({}s)",
                self.warning, self.duration
            ));
        }
        Ok(())
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn timer_settings(&self) -> TimerSettings {
        TimerSettings {
            duration_seconds: self.duration,
            warning_threshold_seconds: self.warning,
            checkout_hold_minutes: self.checkout_hold_minutes,
            expiry_cooldown: Duration::from_millis(self.expiry_cooldown_ms),
        }
    }
}
