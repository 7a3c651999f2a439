//! Fehlertypen fuer Controller und Predictor

use std::path::PathBuf;

use adaptive_opus_core::AdaptiveError;
use thiserror::Error;

/// Fehler eines Predictors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredictorError {
    /// Kein Modell geladen (Null-Objekt)
    #[error("Predictor nicht verfuegbar")]
    NichtVerfuegbar,

    /// Vorhersage fuer einen einzelnen Kandidaten fehlgeschlagen
    #[error("Vorhersage fehlgeschlagen: {0}")]
    Vorhersage(String),

    #[error("Predictor-Artefakt {pfad} nicht ladbar: {grund}")]
    Laden { pfad: PathBuf, grund: String },
}

/// Fehler bei der Controller-Auswahl
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControllerError {
    #[error("Unbekannter Controller-Typ: '{0}' (erlaubt: static, heuristic, model_based, hybrid)")]
    UnbekannterTyp(String),

    #[error("Ungueltige Controller-Konfiguration: {0}")]
    Konfiguration(String),
}

impl From<ControllerError> for AdaptiveError {
    fn from(e: ControllerError) -> Self {
        match e {
            ControllerError::UnbekannterTyp(typ) => AdaptiveError::UnbekannterController(typ),
            ControllerError::Konfiguration(grund) => AdaptiveError::Konfiguration(grund),
        }
    }
}

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;
