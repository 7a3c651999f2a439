//! Vertrag des Qualitaets-Orakels
//!
//! Das Orakel kodiert eine Quelle mit einer Konfiguration, simuliert
//! Paketverlust und bewertet das Ergebnis. Es wird aus vielen Worker-Threads
//! gleichzeitig aufgerufen und darf zwischen Aufrufen keinen Zustand teilen,
//! der das Ergebnis eines anderen Aufrufs beeinflusst.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::EvalError;
use crate::types::{AudioSource, EncodingConfig};

/// Erwarteter Wertebereich eines MOS-Scores
pub const MOS_BEREICH: RangeInclusive<f64> = 1.0..=4.5;

/// Boden-Wert, wenn der Scorer an stark degradiertem Audio scheitert
pub const FLOOR_SCORE: f64 = 1.0;

/// Ergebnis einer Qualitaetsbewertung
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub mos: f64,
    /// True wenn `mos` der Boden-Wert nach einem Scorer-Fehler ist
    pub floor_fallback: bool,
}

impl QualityScore {
    /// Gemessener Score, auf den MOS-Bereich begrenzt.
    /// NaN und unendliche Werte gelten als gescheiterte Bewertung.
    pub fn gemessen(mos: f64) -> Self {
        if !mos.is_finite() {
            return Self::floor();
        }
        Self {
            mos: mos.clamp(*MOS_BEREICH.start(), *MOS_BEREICH.end()),
            floor_fallback: false,
        }
    }

    /// Boden-Wert nach einem Scorer-Fehler
    pub fn floor() -> Self {
        Self {
            mos: FLOOR_SCORE,
            floor_fallback: true,
        }
    }
}

/// Bewertet eine (Quelle, Config, Verlust)-Kombination
pub trait QualityOracle: Send + Sync {
    /// Fuehrt Encode → Verlustsimulation → Decode → Bewertung aus.
    ///
    /// `abbruch` muss von laufenden externen Aufrufen beobachtet werden;
    /// ein abgebrochener Aufruf endet mit `EvalError::Abgebrochen`.
    fn evaluate(
        &self,
        quelle: &AudioSource,
        config: &EncodingConfig,
        verlust_prozent: f64,
        abbruch: &CancellationToken,
    ) -> Result<QualityScore, EvalError>;
}

impl<T: QualityOracle + ?Sized> QualityOracle for std::sync::Arc<T> {
    fn evaluate(
        &self,
        quelle: &AudioSource,
        config: &EncodingConfig,
        verlust_prozent: f64,
        abbruch: &CancellationToken,
    ) -> Result<QualityScore, EvalError> {
        (**self).evaluate(quelle, config, verlust_prozent, abbruch)
    }
}
