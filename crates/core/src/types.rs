//! Gemeinsame Datentypen fuer Adaptive Opus
//!
//! `EncodingConfig` ist ein unveraenderlicher Wert: Controller geben ihn
//! zurueck, Pipeline und Transport bekommen ihn explizit uebergeben. Es gibt
//! keinen globalen "aktuellen" Encoder-Zustand.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::grid;

// ---------------------------------------------------------------------------
// Frame-Groesse
// ---------------------------------------------------------------------------

/// Frame-Groesse in Millisekunden
///
/// Nur die im Parameterraum vorkommenden Groessen sind darstellbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum FrameSizeMs {
    /// 20 ms – Standard fuer Echtzeit-VoIP
    Ms20 = 20,
    /// 40 ms
    Ms40 = 40,
    /// 60 ms – maximale Kompression, hoechste Latenz
    Ms60 = 60,
}

impl FrameSizeMs {
    /// Gibt die Frame-Groesse in Millisekunden zurueck
    pub fn as_ms(&self) -> u16 {
        *self as u16
    }

    /// Berechnet die Anzahl der Samples pro Frame bei gegebener Abtastrate
    pub fn samples_per_frame(&self, sample_rate: u32) -> u32 {
        self.as_ms() as u32 * sample_rate / 1000
    }
}

impl TryFrom<u16> for FrameSizeMs {
    type Error = String;

    fn try_from(ms: u16) -> Result<Self, Self::Error> {
        match ms {
            20 => Ok(Self::Ms20),
            40 => Ok(Self::Ms40),
            60 => Ok(Self::Ms60),
            andere => Err(format!(
                "Frame-Groesse muss 20, 40 oder 60 ms sein (war: {andere})"
            )),
        }
    }
}

impl From<FrameSizeMs> for u16 {
    fn from(f: FrameSizeMs) -> Self {
        f.as_ms()
    }
}

// ---------------------------------------------------------------------------
// Encoding-Konfiguration
// ---------------------------------------------------------------------------

/// Merkmalsvektor fuer den Predictor: [bitrate, frame_size, use_fec (0/1), packet_loss_perc]
pub type Features = [f64; 4];

/// Eine Encoder-Konfiguration aus dem Parameterraum
///
/// Gleichheit und Ordnung sind strukturell. Die Feldreihenfolge entspricht
/// der Erzeugungsreihenfolge des Rasters, daher ist `Ord` identisch mit der
/// Rasterreihenfolge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Ziel-Bitrate in kbps
    pub bitrate_kbps: u16,
    /// Frame-Groesse
    #[serde(rename = "frame_size_ms")]
    pub frame_size: FrameSizeMs,
    /// Encoder-Komplexitaet (0–10)
    pub complexity: u8,
    /// Forward Error Correction aktivieren
    pub use_fec: bool,
}

impl EncodingConfig {
    /// Dokumentierte Basiskonfiguration: 32 kbps / 20 ms / Komplexitaet 5 / kein FEC
    pub const BASELINE: EncodingConfig = EncodingConfig {
        bitrate_kbps: 32,
        frame_size: FrameSizeMs::Ms20,
        complexity: 5,
        use_fec: false,
    };

    /// Erstellt eine Konfiguration und prueft die Zugehoerigkeit zum Raster
    pub fn neu(
        bitrate_kbps: u16,
        frame_size: FrameSizeMs,
        complexity: u8,
        use_fec: bool,
    ) -> Result<Self, String> {
        let config = Self {
            bitrate_kbps,
            frame_size,
            complexity,
            use_fec,
        };
        config.validieren()?;
        Ok(config)
    }

    /// Validiert, dass die Konfiguration im 72er-Raster liegt
    pub fn validieren(&self) -> Result<(), String> {
        if !grid::BITRATES_KBPS.contains(&self.bitrate_kbps) {
            return Err(format!(
                "Bitrate {} kbps liegt nicht im Raster {:?}",
                self.bitrate_kbps,
                grid::BITRATES_KBPS
            ));
        }
        if !grid::COMPLEXITIES.contains(&self.complexity) {
            return Err(format!(
                "Komplexitaet {} liegt nicht im Raster {:?}",
                self.complexity,
                grid::COMPLEXITIES
            ));
        }
        Ok(())
    }

    /// Merkmalsvektor in Trainingsreihenfolge
    pub fn features(&self, verlust_prozent: f64) -> Features {
        [
            self.bitrate_kbps as f64,
            self.frame_size.as_ms() as f64,
            if self.use_fec { 1.0 } else { 0.0 },
            verlust_prozent,
        ]
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::BASELINE
    }
}

impl std::fmt::Display for EncodingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}kbps/{}ms/c{}/{}",
            self.bitrate_kbps,
            self.frame_size.as_ms(),
            self.complexity,
            if self.use_fec { "fec" } else { "nofec" }
        )
    }
}

/// Klemmt einen Paketverlust auf [0, 100] Prozent. NaN wird zu 0.
pub fn verlust_klemmen(verlust_prozent: f64) -> f64 {
    if verlust_prozent.is_nan() {
        return 0.0;
    }
    verlust_prozent.clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Audio-Quellen
// ---------------------------------------------------------------------------

/// Identitaet einer Quell-Audiodatei innerhalb eines Sweeps
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Referenz auf eine saubere Quell-Audiodatei
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSource {
    pub id: SourceId,
    pub pfad: PathBuf,
}

impl AudioSource {
    /// Erstellt eine Quelle mit dem Dateinamen als ID
    pub fn aus_pfad(pfad: impl Into<PathBuf>) -> Self {
        let pfad = pfad.into();
        let id = pfad
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| pfad.to_string_lossy().into_owned());
        Self {
            id: SourceId(id),
            pfad,
        }
    }

    /// Erstellt eine Quelle mit dem Pfad relativ zu `wurzel` als ID
    pub fn relativ_zu(wurzel: &Path, pfad: impl Into<PathBuf>) -> Self {
        let pfad = pfad.into();
        let id = pfad
            .strip_prefix(wurzel)
            .unwrap_or(&pfad)
            .to_string_lossy()
            .replace('\\', "/");
        Self {
            id: SourceId(id),
            pfad,
        }
    }
}

// ---------------------------------------------------------------------------
// Ergebnisse
// ---------------------------------------------------------------------------

/// Ein erfolgreich bewerteter Job (Quelle, Config, Verlust)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSample {
    pub source_id: SourceId,
    pub config: EncodingConfig,
    /// Simulierter Paketverlust in Prozent (0–100)
    pub packet_loss_perc: f64,
    /// MOS-aehnlicher Wert, typischerweise 1.0–4.5
    pub quality_score: f64,
    /// True wenn der Scorer versagte und der Boden-Wert eingesetzt wurde
    pub floor_fallback: bool,
    pub processing_time: Duration,
}
