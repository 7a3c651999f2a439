//! Predictor – Vorhersage der Qualitaet einer Konfiguration
//!
//! Der ModelBased-Controller kennt das Modell nur ueber `Predictor::predict`.
//! Trainiert wird ausserhalb; hier werden nur exportierte Artefakte (JSON)
//! ausgewertet.
//!
//! ## Artefakt-Format
//! ```json
//! {"typ": "linear", "gewichte": [0.02, -0.01, 0.3, -0.15], "achsenabschnitt": 3.1}
//! {"typ": "wald", "baeume": [{"links": [1, -1, -1], "rechts": [2, -1, -1],
//!   "merkmal": [3, -1, -1], "schwelle": [5.0, 0.0, 0.0], "wert": [0.0, 4.1, 2.3]}]}
//! ```
//! Merkmale in fester Reihenfolge: `[bitrate, frame_size, use_fec (0/1), packet_loss_perc]`.
//! In einem Baum ist ein Knoten ein Blatt, wenn `links == -1`; sonst geht
//! die Auswertung nach links bei `x[merkmal] <= schwelle`.

use std::path::Path;
use std::sync::Arc;

use adaptive_opus_core::Features;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PredictorError;

/// Anzahl der Merkmale pro Vorhersage
pub const MERKMAL_ANZAHL: usize = 4;

/// Faehigkeit, die Qualitaet eines Merkmalsvektors vorherzusagen
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &Features) -> Result<f64, PredictorError>;

    /// False fuer das Null-Objekt; ModelBased faellt dann zurueck
    fn ist_verfuegbar(&self) -> bool {
        true
    }
}

impl<T: Predictor + ?Sized> Predictor for Arc<T> {
    fn predict(&self, features: &Features) -> Result<f64, PredictorError> {
        (**self).predict(features)
    }

    fn ist_verfuegbar(&self) -> bool {
        (**self).ist_verfuegbar()
    }
}

/// Null-Objekt: kein Modell vorhanden
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPredictor;

impl Predictor for NullPredictor {
    fn predict(&self, _features: &Features) -> Result<f64, PredictorError> {
        Err(PredictorError::NichtVerfuegbar)
    }

    fn ist_verfuegbar(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Artefakte
// ---------------------------------------------------------------------------

/// Ein Entscheidungsbaum in flacher Knotendarstellung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baum {
    pub links: Vec<i64>,
    pub rechts: Vec<i64>,
    pub merkmal: Vec<i64>,
    pub schwelle: Vec<f64>,
    pub wert: Vec<f64>,
}

impl Baum {
    fn validieren(&self) -> Result<(), String> {
        let n = self.links.len();
        if n == 0 {
            return Err("Baum ohne Knoten".into());
        }
        if [self.rechts.len(), self.merkmal.len(), self.schwelle.len(), self.wert.len()]
            .iter()
            .any(|&l| l != n)
        {
            return Err("Knoten-Arrays haben unterschiedliche Laengen".into());
        }
        for i in 0..n {
            if self.links[i] < 0 {
                continue;
            }
            let kind_ok = |k: i64| k >= 0 && (k as usize) < n;
            if !kind_ok(self.links[i]) || !kind_ok(self.rechts[i]) {
                return Err(format!("Knoten {i}: Kind-Index ausserhalb des Baums"));
            }
            if self.merkmal[i] < 0 || self.merkmal[i] as usize >= MERKMAL_ANZAHL {
                return Err(format!("Knoten {i}: Merkmal {} unbekannt", self.merkmal[i]));
            }
        }
        Ok(())
    }

    fn auswerten(&self, x: &Features) -> Result<f64, PredictorError> {
        let mut knoten = 0usize;
        // Schutz gegen zyklische Artefakte: ein gueltiger Pfad besucht jeden Knoten hoechstens einmal
        for _ in 0..self.links.len() {
            let links = self.links[knoten];
            if links < 0 {
                return Ok(self.wert[knoten]);
            }
            let m = self.merkmal[knoten] as usize;
            knoten = if x[m] <= self.schwelle[knoten] {
                links as usize
            } else {
                self.rechts[knoten] as usize
            };
        }
        Err(PredictorError::Vorhersage("Baum enthaelt einen Zyklus".into()))
    }
}

/// Exportiertes Modell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum PredictorArtefakt {
    /// Lineare Regression ueber die vier Merkmale
    Linear {
        gewichte: [f64; MERKMAL_ANZAHL],
        achsenabschnitt: f64,
    },
    /// Baum-Ensemble, Vorhersage = Mittelwert der Baeume
    Wald { baeume: Vec<Baum> },
}

impl PredictorArtefakt {
    pub fn validieren(&self) -> Result<(), String> {
        match self {
            Self::Linear {
                gewichte,
                achsenabschnitt,
            } => {
                if gewichte.iter().chain(std::iter::once(achsenabschnitt)).any(|w| !w.is_finite()) {
                    return Err("nicht endliche Gewichte".into());
                }
                Ok(())
            }
            Self::Wald { baeume } => {
                if baeume.is_empty() {
                    return Err("Wald ohne Baeume".into());
                }
                for (i, baum) in baeume.iter().enumerate() {
                    baum.validieren().map_err(|e| format!("Baum {i}: {e}"))?;
                }
                Ok(())
            }
        }
    }
}

/// Predictor auf Basis eines geladenen Artefakts
#[derive(Debug, Clone)]
pub struct ArtefaktPredictor {
    artefakt: PredictorArtefakt,
}

impl ArtefaktPredictor {
    pub fn new(artefakt: PredictorArtefakt) -> Result<Self, String> {
        artefakt.validieren()?;
        Ok(Self { artefakt })
    }

    /// Laedt und validiert ein JSON-Artefakt
    pub fn laden(pfad: &Path) -> Result<Self, PredictorError> {
        let laden_fehler = |grund: String| PredictorError::Laden {
            pfad: pfad.to_path_buf(),
            grund,
        };
        let inhalt = std::fs::read_to_string(pfad).map_err(|e| laden_fehler(e.to_string()))?;
        let artefakt: PredictorArtefakt =
            serde_json::from_str(&inhalt).map_err(|e| laden_fehler(e.to_string()))?;
        Self::new(artefakt).map_err(laden_fehler)
    }

    pub fn artefakt(&self) -> &PredictorArtefakt {
        &self.artefakt
    }
}

impl Predictor for ArtefaktPredictor {
    fn predict(&self, features: &Features) -> Result<f64, PredictorError> {
        if features.iter().any(|f| !f.is_finite()) {
            return Err(PredictorError::Vorhersage(format!(
                "nicht endliche Merkmale: {features:?}"
            )));
        }
        let wert = match &self.artefakt {
            PredictorArtefakt::Linear {
                gewichte,
                achsenabschnitt,
            } => {
                achsenabschnitt
                    + gewichte
                        .iter()
                        .zip(features.iter())
                        .map(|(w, x)| w * x)
                        .sum::<f64>()
            }
            PredictorArtefakt::Wald { baeume } => {
                let mut summe = 0.0;
                for baum in baeume {
                    summe += baum.auswerten(features)?;
                }
                summe / baeume.len() as f64
            }
        };
        if !wert.is_finite() {
            return Err(PredictorError::Vorhersage(format!("nicht endliche Vorhersage: {wert}")));
        }
        Ok(wert)
    }
}

/// Laedt das Predictor-Artefakt oder faellt auf `NullPredictor` zurueck.
///
/// Ein fehlendes oder defektes Artefakt bricht den Aufrufer nie ab.
pub fn predictor_laden(pfad: Option<&Path>) -> Arc<dyn Predictor> {
    let Some(pfad) = pfad else {
        info!("Kein Predictor-Artefakt konfiguriert – ModelBased nutzt Fallback");
        return Arc::new(NullPredictor);
    };
    match ArtefaktPredictor::laden(pfad) {
        Ok(p) => {
            info!(pfad = %pfad.display(), "Predictor-Artefakt geladen");
            Arc::new(p)
        }
        Err(e) => {
            warn!(fehler = %e, "Predictor nicht verfuegbar – ModelBased nutzt Fallback");
            Arc::new(NullPredictor)
        }
    }
}
