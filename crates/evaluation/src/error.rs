//! Fehlertypen fuer Sweep und Datensatz

use std::path::PathBuf;

use adaptive_opus_core::AdaptiveError;
use thiserror::Error;

/// Sweep-weite Fehler. Job-Fehler gehoeren nicht hierher, sie sind Daten.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Keine Audio-Eingaben gefunden in {0}")]
    KeineEingaben(PathBuf),

    #[error("Sweep abgebrochen nach {abgeschlossen} von {gesamt} Jobs")]
    Abgebrochen { abgeschlossen: usize, gesamt: usize },

    #[error("Worker konnte nicht gestartet werden: {0}")]
    WorkerStart(#[source] std::io::Error),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl SweepError {
    pub fn ist_abbruch(&self) -> bool {
        matches!(self, Self::Abgebrochen { .. })
    }
}

impl From<SweepError> for AdaptiveError {
    fn from(e: SweepError) -> Self {
        match e {
            SweepError::KeineEingaben(pfad) => AdaptiveError::KeineEingaben(pfad),
            SweepError::Abgebrochen {
                abgeschlossen,
                gesamt,
            } => AdaptiveError::Abgebrochen {
                abgeschlossen,
                gesamt,
            },
            SweepError::WorkerStart(e) | SweepError::Io(e) => AdaptiveError::Io(e),
        }
    }
}

pub type SweepResult<T> = std::result::Result<T, SweepError>;
