//! EvaluationHarness – ein Controller, eine Quelle, ein Verlust
//!
//! Die Harness loest die Entscheidung des Controllers auf, bewertet die
//! gewaehlte Konfiguration mit dem Orakel und liefert ein strukturiertes
//! Ergebnis. Fehler eines Controllers sind Daten: `compare` laeuft ueber
//! alle Controller weiter und haelt Fehlschlaege als Zeilen fest.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use adaptive_opus_controller::{
    Controller, ControllerDecision, ControllerEinstellungen, ControllerKind, ControllerResult,
    Predictor,
};
use adaptive_opus_core::{verlust_klemmen, AudioSource, EvalError, ParameterSpace, QualityOracle, SourceId};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Ausgang eines einzelnen Laufs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Erfolg {
        quality_score: f64,
        floor_fallback: bool,
    },
    Fehler {
        art: String,
        grund: String,
    },
}

impl OutcomeStatus {
    fn aus_fehler(fehler: &EvalError) -> Self {
        Self::Fehler {
            art: fehler.art().to_string(),
            grund: fehler.to_string(),
        }
    }
}

/// Strukturiertes Ergebnis eines Harness-Laufs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub controller: ControllerKind,
    pub source_id: SourceId,
    pub loss_perc: f64,
    /// None nur wenn bereits die Auswahl scheiterte
    pub decision: Option<ControllerDecision>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    #[serde(rename = "entscheidung_ms", serialize_with = "dauer_ms")]
    pub entscheidung_dauer: Duration,
    #[serde(rename = "gesamt_ms", serialize_with = "dauer_ms")]
    pub dauer: Duration,
}

impl EvaluationOutcome {
    pub fn ist_erfolg(&self) -> bool {
        matches!(self.status, OutcomeStatus::Erfolg { .. })
    }

    pub fn quality_score(&self) -> Option<f64> {
        match self.status {
            OutcomeStatus::Erfolg { quality_score, .. } => Some(quality_score),
            OutcomeStatus::Fehler { .. } => None,
        }
    }
}

fn dauer_ms<S: serde::Serializer>(dauer: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(dauer.as_secs_f64() * 1000.0)
}

/// Baut Controller aus Typ-Namen. Ein unbekannter Name bricht ab.
pub fn controller_aufloesen(
    namen: &[String],
    einstellungen: &ControllerEinstellungen,
) -> ControllerResult<Vec<Controller>> {
    if namen.is_empty() {
        return ControllerKind::ALLE
            .iter()
            .map(|&kind| Controller::neu(kind, einstellungen))
            .collect();
    }
    namen
        .iter()
        .map(|name| Controller::aus_name(name, einstellungen))
        .collect()
}

/// Fuehrt Controller gegen ein Orakel aus
pub struct EvaluationHarness<'a, O: ?Sized> {
    oracle: &'a O,
    predictor: &'a dyn Predictor,
    raum: ParameterSpace,
}

impl<'a, O: QualityOracle + ?Sized> EvaluationHarness<'a, O> {
    pub fn new(oracle: &'a O, predictor: &'a dyn Predictor) -> Self {
        Self {
            oracle,
            predictor,
            raum: ParameterSpace,
        }
    }

    /// Ein Controller gegen eine Quelle bei einem Verlust. Kehrt immer zurueck.
    pub fn run(
        &self,
        controller: &Controller,
        quelle: &AudioSource,
        verlust_prozent: f64,
        abbruch: &CancellationToken,
    ) -> EvaluationOutcome {
        let start = Instant::now();
        let verlust = verlust_klemmen(verlust_prozent);
        let kind = controller.kind();

        let entscheidung = catch_unwind(AssertUnwindSafe(|| {
            controller.select(verlust, &self.raum, self.predictor)
        }));
        let entscheidung_dauer = start.elapsed();

        let (decision, status) = match entscheidung {
            Err(_) => {
                let fehler = EvalError::Intern(format!("Auswahl von {kind} fehlgeschlagen (Panic)"));
                (None, OutcomeStatus::aus_fehler(&fehler))
            }
            Ok(decision) => {
                let bewertung = catch_unwind(AssertUnwindSafe(|| {
                    self.oracle.evaluate(quelle, &decision.config, verlust, abbruch)
                }))
                .unwrap_or_else(|_| Err(EvalError::Intern("Panic im Orakel".into())));
                let status = match bewertung {
                    Ok(score) => OutcomeStatus::Erfolg {
                        quality_score: score.mos,
                        floor_fallback: score.floor_fallback,
                    },
                    Err(fehler) => {
                        warn!(controller = %kind, quelle = %quelle.id, verlust, fehler = %fehler,
                            "Bewertung fehlgeschlagen");
                        OutcomeStatus::aus_fehler(&fehler)
                    }
                };
                (Some(decision), status)
            }
        };

        EvaluationOutcome {
            controller: kind,
            source_id: quelle.id.clone(),
            loss_perc: verlust,
            decision,
            status,
            entscheidung_dauer,
            dauer: start.elapsed(),
        }
    }

    /// Alle Controller ueber alle Verluste, Controller aussen.
    ///
    /// Nach einem Abbruch werden keine weiteren Laeufe gestartet.
    pub fn compare(
        &self,
        controller: &[Controller],
        quelle: &AudioSource,
        verluste: &[f64],
        abbruch: &CancellationToken,
    ) -> Vec<EvaluationOutcome> {
        let mut ergebnisse = Vec::with_capacity(controller.len() * verluste.len());
        'aussen: for c in controller {
            for &verlust in verluste {
                if abbruch.is_cancelled() {
                    warn!(fertig = ergebnisse.len(), "Vergleich abgebrochen");
                    break 'aussen;
                }
                ergebnisse.push(self.run(c, quelle, verlust, abbruch));
            }
        }
        info!(
            quelle = %quelle.id,
            laeufe = ergebnisse.len(),
            fehler = ergebnisse.iter().filter(|o| !o.ist_erfolg()).count(),
            "Vergleich abgeschlossen"
        );
        ergebnisse
    }
}
