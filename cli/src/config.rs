//! Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass das Werkzeug ohne Konfigurationsdatei
//! lauffaehig ist.

use std::path::{Path, PathBuf};
use std::time::Duration;

use adaptive_opus_codec::{OpusToolsConfig, ZIEL_RATE_HZ};
use adaptive_opus_controller::{ControllerEinstellungen, HYBRID_SCHWELLE_PROZENT};
use adaptive_opus_core::{EncodingConfig, SWEEP_LOSS_LEVELS};
use adaptive_opus_evaluation::STANDARD_ENDUNGEN;
use adaptive_opus_observability::{log_format_gueltig, log_level_gueltig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Abtastraten, die opusdec ausgeben kann
pub const OPUS_RATEN_HZ: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sweep: SweepAbschnitt,
    pub codec: CodecAbschnitt,
    pub controller: ControllerAbschnitt,
    pub logging: LoggingAbschnitt,
}

/// Sweep-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepAbschnitt {
    /// Verzeichnis mit sauberen Quelldateien (rekursiv durchsucht)
    pub input_dir: PathBuf,
    /// Maximale Anzahl Quelldateien (0 = unbegrenzt)
    pub max_files: usize,
    /// Anzahl Worker (0 = Parallelitaet des Hosts)
    pub workers: usize,
    /// Simulierte Verluststufen in Prozent
    pub loss_levels: Vec<f64>,
    /// Ausgabepfad des Datensatzes (CSV)
    pub output: PathBuf,
    /// Optionaler Pfad fuer den Metrik-Export (Prometheus-Textformat)
    pub metrics_file: Option<PathBuf>,
}

impl Default for SweepAbschnitt {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/clean"),
            max_files: 20,
            workers: 0,
            loss_levels: SWEEP_LOSS_LEVELS.to_vec(),
            output: PathBuf::from("results/sweep.csv"),
            metrics_file: None,
        }
    }
}

/// Externe Codec-Werkzeuge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecAbschnitt {
    pub opusenc: PathBuf,
    pub opusdec: PathBuf,
    /// Zeitlimit pro externem Aufruf in Sekunden
    pub timeout_secs: u64,
    /// `--expect-loss` fuer opusenc bei aktiviertem FEC
    pub fec_expected_loss: u8,
    /// Basisverzeichnis fuer Job-Verzeichnisse (leer = System-Temp)
    pub work_dir: Option<PathBuf>,
    /// Abtastrate fuer Decode und Bewertung
    pub target_sample_rate: u32,
    /// Dateiendungen der Quellen
    pub extensions: Vec<String>,
}

impl Default for CodecAbschnitt {
    fn default() -> Self {
        Self {
            opusenc: PathBuf::from("opusenc"),
            opusdec: PathBuf::from("opusdec"),
            timeout_secs: 120,
            fec_expected_loss: 5,
            work_dir: None,
            target_sample_rate: ZIEL_RATE_HZ,
            extensions: STANDARD_ENDUNGEN.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl CodecAbschnitt {
    pub fn opus_tools(&self) -> OpusToolsConfig {
        OpusToolsConfig {
            opusenc: self.opusenc.clone(),
            opusdec: self.opusdec.clone(),
            zeitlimit: Duration::from_secs(self.timeout_secs),
            fec_erwarteter_verlust: self.fec_expected_loss,
        }
    }
}

/// Controller-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerAbschnitt {
    /// Predictor-Artefakt (JSON); fehlt es, nutzt ModelBased die Basis
    pub model_path: Option<PathBuf>,
    /// Basiskonfiguration fuer Static und alle Fallbacks
    pub baseline: EncodingConfig,
    /// Verlust in Prozent, ab dem Hybrid an Static delegiert
    pub hybrid_threshold: f64,
}

impl Default for ControllerAbschnitt {
    fn default() -> Self {
        Self {
            model_path: None,
            baseline: EncodingConfig::BASELINE,
            hybrid_threshold: HYBRID_SCHWELLE_PROZENT,
        }
    }
}

impl ControllerAbschnitt {
    pub fn einstellungen(&self) -> ControllerEinstellungen {
        ControllerEinstellungen {
            baseline: self.baseline,
            hybrid_schwelle: self.hybrid_threshold,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingAbschnitt {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingAbschnitt {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Herkunft der geladenen Konfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KonfigQuelle {
    Datei,
    Standardwerte,
}

/// Ergebnis von `AppConfig::laden`.
///
/// Das Laden selbst loggt nicht, da das Logging erst mit der geladenen
/// Konfiguration initialisiert wird; `melden` holt das danach nach.
#[derive(Debug, Clone)]
pub struct GeladeneConfig {
    pub config: AppConfig,
    pub quelle: KonfigQuelle,
    pub pfad: PathBuf,
}

impl GeladeneConfig {
    pub fn melden(&self) {
        match self.quelle {
            KonfigQuelle::Datei => {
                info!(pfad = %self.pfad.display(), "Konfiguration geladen");
            }
            KonfigQuelle::Standardwerte => {
                warn!(
                    pfad = %self.pfad.display(),
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
            }
        }
    }
}

impl AppConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Liefert die Standardkonfiguration wenn die Datei nicht existiert.
    pub fn laden(pfad: &Path) -> anyhow::Result<GeladeneConfig> {
        let (config, quelle) = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config = toml::from_str::<Self>(&inhalt).map_err(|e| {
                    anyhow::anyhow!("Konfigurationsfehler in '{}': {e}", pfad.display())
                })?;
                (config, KonfigQuelle::Datei)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Self::default(), KonfigQuelle::Standardwerte)
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{}' nicht lesbar: {e}",
                    pfad.display()
                ))
            }
        };
        config.validieren()?;
        Ok(GeladeneConfig {
            config,
            quelle,
            pfad: pfad.to_path_buf(),
        })
    }

    /// Prueft Werte, die Serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        self.controller
            .einstellungen()
            .validieren()
            .map_err(|e| anyhow::anyhow!("[controller] {e}"))?;
        if self.codec.timeout_secs == 0 {
            anyhow::bail!("[codec] timeout_secs muss groesser 0 sein");
        }
        if !OPUS_RATEN_HZ.contains(&self.codec.target_sample_rate) {
            anyhow::bail!(
                "[codec] target_sample_rate {} nicht unterstuetzt (erlaubt: {OPUS_RATEN_HZ:?})",
                self.codec.target_sample_rate
            );
        }
        if self.codec.extensions.is_empty() {
            anyhow::bail!("[codec] extensions darf nicht leer sein");
        }
        if self.sweep.loss_levels.is_empty() {
            anyhow::bail!("[sweep] loss_levels darf nicht leer sein");
        }
        if let Some(v) = self
            .sweep
            .loss_levels
            .iter()
            .find(|v| !v.is_finite() || !(0.0..=100.0).contains(*v))
        {
            anyhow::bail!("[sweep] Verluststufe {v} ausserhalb 0–100");
        }
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("[logging] unbekanntes Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("[logging] unbekanntes Format '{}'", self.logging.format);
        }
        Ok(())
    }
}
