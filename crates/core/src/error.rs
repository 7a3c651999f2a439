//! Fehlertypen fuer Adaptive Opus
//!
//! `AdaptiveError` ist der zentrale Fehler fuer Konfiguration und Laeufe.
//! `EvalError` beschreibt das Scheitern eines einzelnen Jobs (Quelle, Config,
//! Verlust) und wird im Sweep als Daten behandelt, nie als Abbruchgrund.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Globaler Result-Alias fuer Adaptive Opus
pub type Result<T> = std::result::Result<T, AdaptiveError>;

/// Zentrale Fehler des Systems
#[derive(Debug, Error)]
pub enum AdaptiveError {
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Unbekannter Controller-Typ: '{0}'")]
    UnbekannterController(String),

    #[error("Keine Audio-Eingaben gefunden in {0}")]
    KeineEingaben(PathBuf),

    #[error("Abgebrochen nach {abgeschlossen} von {gesamt} Jobs")]
    Abgebrochen { abgeschlossen: usize, gesamt: usize },

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Pipeline-Schritt eines Jobs, fuer Fehlermeldungen und Zeitlimits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schritt {
    Encode,
    Decode,
    Score,
}

impl std::fmt::Display for Schritt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schritt::Encode => write!(f, "encode"),
            Schritt::Decode => write!(f, "decode"),
            Schritt::Score => write!(f, "score"),
        }
    }
}

/// Fehler eines einzelnen Bewertungs-Jobs
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("Encoding fehlgeschlagen: {0}")]
    Encode(String),

    #[error("Decoding fehlgeschlagen: {0}")]
    Decode(String),

    #[error("Qualitaetsbewertung fehlgeschlagen: {0}")]
    Score(String),

    #[error("Abtastrate passt nicht: erwartet={erwartet} Hz, referenz={referenz} Hz, degradiert={degradiert} Hz")]
    SampleRateMismatch {
        erwartet: u32,
        referenz: u32,
        degradiert: u32,
    },

    #[error("Zeitlimit ueberschritten ({schritt}, {zeitlimit:?})")]
    Zeitlimit { schritt: Schritt, zeitlimit: Duration },

    #[error("Job abgebrochen")]
    Abgebrochen,

    #[error("Audio nicht lesbar: {0}")]
    AudioLesen(String),

    #[error("Ungueltige Konfiguration: {0}")]
    Konfiguration(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl EvalError {
    /// Kurzer, stabiler Name der Fehlerart (fuer Metrik-Labels und Reports)
    pub fn art(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode",
            Self::Decode(_) => "decode",
            Self::Score(_) => "score",
            Self::SampleRateMismatch { .. } => "sample_rate",
            Self::Zeitlimit { .. } => "zeitlimit",
            Self::Abgebrochen => "abgebrochen",
            Self::AudioLesen(_) => "audio_lesen",
            Self::Konfiguration(_) => "konfiguration",
            Self::Intern(_) => "intern",
        }
    }

    /// True wenn der Job wegen eines Abbruchs durch den Operator endete
    pub fn ist_abbruch(&self) -> bool {
        matches!(self, Self::Abgebrochen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = EvalError::Encode("exit status 1".into());
        assert_eq!(e.to_string(), "Encoding fehlgeschlagen: exit status 1");
    }

    #[test]
    fn sample_rate_fehler_nennt_raten() {
        let e = EvalError::SampleRateMismatch {
            erwartet: 16000,
            referenz: 44100,
            degradiert: 16000,
        };
        assert!(e.to_string().contains("referenz=44100"));
        assert_eq!(e.art(), "sample_rate");
    }

    #[test]
    fn abbruch_erkennung() {
        assert!(EvalError::Abgebrochen.ist_abbruch());
        assert!(!EvalError::Decode("x".into()).ist_abbruch());
    }

    #[test]
    fn zeitlimit_nennt_schritt() {
        let e = EvalError::Zeitlimit {
            schritt: Schritt::Decode,
            zeitlimit: Duration::from_secs(3),
        };
        assert!(e.to_string().contains("decode"));
    }
}
