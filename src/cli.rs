//! Command-line argument parsing for queryview.

use crate::config::Config;
use crate::error::{QueryViewError, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Output format for the headless report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary of the final state.
    #[default]
    Text,
    /// JSON with the final snapshot, events and assertion results.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid output format: {s}. Expected: text or json"
            )),
        }
    }
}

/// Drives a saved query page headlessly against a mock backend.
#[derive(Parser, Debug)]
#[command(name = "queryview")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Query fixture (JSON); the built-in demo query is used when omitted
    #[arg(short = 'q', long, value_name = "PATH")]
    pub query: Option<PathBuf>,

    /// Comma-separated events (e.g., "execute,settle,assert:state:state=succeeded")
    #[arg(short = 'e', long, value_name = "EVENTS")]
    pub events: Option<String>,

    /// Path to script file with events (use "-" for stdin)
    #[arg(long, value_name = "PATH")]
    pub script: Option<String>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub output: String,

    /// Write output to file instead of stdout
    #[arg(long, value_name = "PATH")]
    pub output_file: Option<PathBuf>,

    /// Stop on first assertion failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Write logs to the state directory instead of stderr
    #[arg(long)]
    pub log_file: bool,

    // === Execution policy overrides ===
    /// Let a new execution replace the in-flight one
    #[arg(long)]
    pub supersede: bool,

    /// Cancel acknowledgement timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub cancel_timeout_ms: Option<u64>,

    /// Backend poll interval in milliseconds
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Run as a user without edit permission
    #[arg(long)]
    pub read_only: bool,

    // === Mock backend ===
    /// Time each mock job takes to finish
    #[arg(long, value_name = "MS", default_value = "50")]
    pub mock_latency_ms: u64,

    /// Rows each mock job returns
    #[arg(long, value_name = "N", default_value = "3")]
    pub mock_rows: usize,

    /// Make every mock job fail with this message
    #[arg(long, value_name = "MESSAGE")]
    pub mock_fail: Option<String>,

    /// Mock backend acknowledges cancel requests but never stops the job
    #[arg(long)]
    pub mock_ignore_cancel: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if self.supersede {
            config.execution.supersede_in_flight = true;
        }
        if let Some(ms) = self.cancel_timeout_ms {
            config.execution.cancel_timeout_ms = ms;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.execution.poll_interval_ms = ms;
        }
        if self.read_only {
            config.permissions.can_edit = false;
        }
    }

    pub fn mock_latency(&self) -> Duration {
        Duration::from_millis(self.mock_latency_ms)
    }

    /// Parses the output format from the --output argument.
    pub fn parse_output_format(&self) -> std::result::Result<OutputFormat, String> {
        self.output.parse()
    }

    /// Validates argument combinations.
    pub fn validate(&self) -> Result<()> {
        if self.events.is_none() && self.script.is_none() {
            return Err(QueryViewError::config("--events or --script is required"));
        }
        if self.events.is_some() && self.script.is_some() {
            return Err(QueryViewError::config(
                "--events and --script cannot be combined",
            ));
        }
        self.parse_output_format().map_err(QueryViewError::config)?;
        Ok(())
    }
}
