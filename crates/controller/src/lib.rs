//! adaptive-opus-controller – Auswahl der Encoder-Konfiguration
//!
//! Vier Controller (Static, Heuristic, ModelBased, Hybrid) als geschlossene
//! Variante sowie die Predictor-Schnittstelle fuer die modellbasierten Typen.

pub mod error;
pub mod policy;
pub mod predictor;

pub use error::{ControllerError, ControllerResult, PredictorError};
pub use policy::{
    Controller, ControllerDecision, ControllerEinstellungen, ControllerKind, HeuristicPolicy,
    HybridPolicy, ModelBasedPolicy, StaticPolicy, HYBRID_SCHWELLE_PROZENT, SENTINEL_SCORE,
};
pub use predictor::{
    predictor_laden, ArtefaktPredictor, Baum, NullPredictor, Predictor, PredictorArtefakt,
};
