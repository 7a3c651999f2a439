//! adaptive-opus-evaluation – Sweep, Datensatz und Controller-Vergleich
//!
//! - Quellensuche und kartesische Job-Menge (Quellen × Raster × Verluste)
//! - `SweepOrchestrator`: fester Worker-Pool, Ergebnisse in Fertigstellungsreihenfolge
//! - `Dataset`: eindeutige Sample-Tabelle mit CSV-Export
//! - `EvaluationHarness`: ein Controller gegen eine Quelle, Vergleich mehrerer Controller

pub mod dataset;
pub mod error;
pub mod harness;
pub mod jobs;
pub mod summary;
pub mod sweep;

pub use dataset::{verlust_schluessel, Dataset, SampleSchluessel, CSV_SPALTEN};
pub use error::{SweepError, SweepResult};
pub use harness::{controller_aufloesen, EvaluationHarness, EvaluationOutcome, OutcomeStatus};
pub use jobs::{jobs_erstellen, quellen_finden, SweepJob, STANDARD_ENDUNGEN};
pub use summary::{ControllerStatistik, VergleichsZusammenfassung, VerlustStatistik};
pub use sweep::{JobFehler, SweepEinstellungen, SweepErgebnis, SweepOrchestrator};
