//! adaptive-opus-core – Gemeinsame Typen, Parameterraum und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die Controller, Codec-Pipeline
//! und Evaluations-Harness gemeinsam nutzen.

pub mod error;
pub mod grid;
pub mod oracle;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{AdaptiveError, EvalError, Result, Schritt};
pub use grid::{generate_all_configs, ParameterSpace, GRID_SIZE, SWEEP_LOSS_LEVELS};
pub use oracle::{QualityOracle, QualityScore, FLOOR_SCORE, MOS_BEREICH};
pub use types::{
    verlust_klemmen, AudioSource, EncodingConfig, EvaluationSample, Features, FrameSizeMs,
    SourceId,
};
