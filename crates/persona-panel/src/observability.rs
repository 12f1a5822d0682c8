//! # Observability
//!
//! Installs a global `tracing` subscriber for the panel. Aggregation, the
//! session and the Gemini oracle emit spans and events under the
//! `persona_panel` target; this module decides where they go.

use std::str::FromStr;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::PanelError;

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum level captured for `persona_panel` events.
    pub level: Level,
    /// Where formatted events are written.
    pub target: LogTarget,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
        }
    }
}

impl ObservabilityConfig {
    /// Reads `PANEL_LOG_LEVEL` and `PANEL_LOG_FILE`, falling back to defaults.
    pub fn from_env() -> Result<Self, PanelError> {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("PANEL_LOG_LEVEL") {
            config.level = Level::from_str(level.trim())
                .map_err(|_| PanelError::Config(format!("invalid PANEL_LOG_LEVEL '{level}'")))?;
        }
        if let Ok(path) = std::env::var("PANEL_LOG_FILE") {
            config.target = LogTarget::File(path);
        }
        Ok(config)
    }
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogTarget {
    /// Log to stderr, keeping stdout free for answers.
    #[default]
    Console,
    /// Log to a file.
    File(String),
}

/// Initializes the global tracing subscriber.
///
/// Call once at startup. `RUST_LOG` directives are honored in addition to
/// the configured level.
///
/// # Errors
///
/// Fails if the log file cannot be created or a subscriber is already set.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("persona_panel={}", config.level).parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.target {
        LogTarget::Console => {
            let layer = fmt::layer().with_writer(std::io::stderr);
            subscriber.with(layer).try_init()?;
        }
        LogTarget::File(path) => {
            let file = std::fs::File::create(path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            subscriber.with(layer).try_init()?;
        }
    };

    Ok(())
}
