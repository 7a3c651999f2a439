//! adaptive-opus-codec – Externe Codec-Pipeline und Qualitaetsbewertung
//!
//! - Encode/Decode ueber `opusenc`/`opusdec` mit Zeitlimit und Abbruch
//! - PCM-Laden (FLAC/WAV) via symphonia, Umrechnung der Referenz auf 16 kHz
//! - Vorbereitung von Bewertungspaaren (16 kHz, Mono, gleiche Laenge)
//! - Segment-SNR-Bewerter auf MOS-Skala
//! - `PipelineOracle` als `QualityOracle`-Implementierung

pub mod error;
pub mod oracle;
pub mod pcm;
pub mod pipeline;
pub mod scorer;

// Bequeme Re-Exporte der wichtigsten Typen
pub use error::{CodecError, CodecResult};
pub use oracle::{PipelineOracle, ZIEL_RATE_HZ};
pub use pcm::{auf_rate_umrechnen, paar_vorbereiten, pcm_laden, PcmAudio, ScoringPair};
pub use pipeline::{CodecPipeline, IntermediateStream, OpusToolsConfig, OpusToolsPipeline};
pub use scorer::{QualityScorer, ScoreError, SegSnrScorer};
