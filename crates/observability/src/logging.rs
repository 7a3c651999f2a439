//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die TOML-Werte):
//! - `AO_LOG_LEVEL`: Log-Level oder EnvFilter-Direktive, Standard: info
//! - `AO_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Ausgabe geht nach stderr; stdout bleibt fuer maschinenlesbare Ergebnisse frei.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "AO_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "AO_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Schlaegt fehl, wenn bereits ein globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = format_waehlen(std::env::var(ENV_LOG_FORMAT).ok(), format);

    let ergebnis = match format {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init(),
    };
    ergebnis.map_err(|e| anyhow!("Logging-Initialisierung fehlgeschlagen: {e}"))
}

/// Waehlt das Log-Format: Umgebung vor Konfiguration, ungueltige Werte → text
pub fn format_waehlen(aus_env: Option<String>, konfiguriert: &str) -> &'static str {
    let kandidat = aus_env.unwrap_or_else(|| konfiguriert.to_string());
    if kandidat.trim().eq_ignore_ascii_case("json") {
        "json"
    } else {
        "text"
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
