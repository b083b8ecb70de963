//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfigurationsdatei):
//! - `AVATALK_LOG_LEVEL`: Filter-Ausdruck (z.B. `debug` oder
//!   `info,avatalk_speech=trace`), Standard: info
//! - `AVATALK_LOG_FORMAT`: Format (text/json), Standard: text

use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "AVATALK_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "AVATALK_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("Unbekanntes Log-Format: {other}")),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// `AVATALK_LOG_LEVEL` und `AVATALK_LOG_FORMAT` haben Vorrang vor den
/// uebergebenen Werten. Ein ungueltiges Format faellt auf `text` zurueck.
/// Schlaegt fehl, wenn bereits ein globaler Subscriber installiert ist.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<()> {
    let filter = filter_bauen(std::env::var(LOG_LEVEL_ENV).ok().as_deref(), level);
    let format = format_waehlen(std::env::var(LOG_FORMAT_ENV).ok().as_deref(), format);

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };

    ergebnis.map_err(|e| anyhow!("Logging konnte nicht initialisiert werden: {e}"))
}

/// Filter aus Umgebung, sonst aus Konfiguration, sonst `info`
fn filter_bauen(env: Option<&str>, level: &str) -> EnvFilter {
    env.and_then(|e| EnvFilter::try_new(e).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn format_waehlen(env: Option<&str>, format: &str) -> LogFormat {
    env.and_then(|e| e.parse().ok())
        .or_else(|| format.parse().ok())
        .unwrap_or_default()
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    format.parse::<LogFormat>().is_ok()
}
