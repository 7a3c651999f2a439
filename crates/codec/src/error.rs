//! Fehlertypen fuer die Codec-Pipeline

use std::time::Duration;

use adaptive_opus_core::{EvalError, Schritt};
use thiserror::Error;

/// Alle moeglichen Fehler der Codec-Pipeline
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{schritt} beendet mit Status {status}: {stderr}")]
    ExitStatus {
        schritt: Schritt,
        status: String,
        stderr: String,
    },

    #[error("{programm} konnte nicht gestartet werden ({schritt}): {grund}")]
    Start {
        schritt: Schritt,
        programm: String,
        grund: String,
    },

    #[error("Zeitlimit ueberschritten ({schritt}, {zeitlimit:?})")]
    Zeitlimit { schritt: Schritt, zeitlimit: Duration },

    #[error("Abgebrochen waehrend {0}")]
    Abgebrochen(Schritt),

    #[error("Audio-Datei nicht lesbar: {0}")]
    AudioLesen(String),

    #[error("Abtastrate passt nicht: erwartet={erwartet}, referenz={referenz}, degradiert={degradiert}")]
    SampleRateMismatch {
        erwartet: u32,
        referenz: u32,
        degradiert: u32,
    },

    #[error("Umrechnung der Abtastrate fehlgeschlagen: {0}")]
    Resampling(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

impl From<CodecError> for EvalError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::ExitStatus { schritt, .. } | CodecError::Start { schritt, .. } => {
                match schritt {
                    Schritt::Decode => EvalError::Decode(e.to_string()),
                    Schritt::Encode => EvalError::Encode(e.to_string()),
                    Schritt::Score => EvalError::Score(e.to_string()),
                }
            }
            CodecError::Zeitlimit { schritt, zeitlimit } => {
                EvalError::Zeitlimit { schritt, zeitlimit }
            }
            CodecError::Abgebrochen(_) => EvalError::Abgebrochen,
            CodecError::AudioLesen(grund) | CodecError::Resampling(grund) => {
                EvalError::AudioLesen(grund)
            }
            CodecError::SampleRateMismatch {
                erwartet,
                referenz,
                degradiert,
            } => EvalError::SampleRateMismatch {
                erwartet,
                referenz,
                degradiert,
            },
            CodecError::Io(io) => EvalError::Intern(io.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_wird_nach_schritt_abgebildet() {
        let e = CodecError::ExitStatus {
            schritt: Schritt::Decode,
            status: "exit status: 1".into(),
            stderr: "kaputt".into(),
        };
        assert!(matches!(EvalError::from(e), EvalError::Decode(_)));

        let e = CodecError::Start {
            schritt: Schritt::Encode,
            programm: "opusenc".into(),
            grund: "nicht gefunden".into(),
        };
        assert!(matches!(EvalError::from(e), EvalError::Encode(_)));
    }

    #[test]
    fn abbruch_und_zeitlimit_bleiben_erhalten() {
        assert!(EvalError::from(CodecError::Abgebrochen(Schritt::Encode)).ist_abbruch());
        let e = CodecError::Zeitlimit {
            schritt: Schritt::Encode,
            zeitlimit: Duration::from_secs(1),
        };
        assert!(matches!(EvalError::from(e), EvalError::Zeitlimit { .. }));
    }
}
