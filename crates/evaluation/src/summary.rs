//! Zusammenfassung eines Controller-Vergleichs
//!
//! Pro Controller: Anzahl Laeufe, Fehlschlaege und mittlerer Score.
//! Zusaetzlich der mittlere Score je (Controller, Verlust).

use std::collections::BTreeMap;

use adaptive_opus_controller::ControllerKind;
use serde::Serialize;

use crate::dataset::verlust_schluessel;
use crate::harness::EvaluationOutcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerStatistik {
    pub laeufe: usize,
    pub fehler: usize,
    /// None wenn kein Lauf erfolgreich war
    pub mittlerer_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerlustStatistik {
    pub controller: ControllerKind,
    pub loss_perc: f64,
    pub laeufe: usize,
    pub mittlerer_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VergleichsZusammenfassung {
    pub controller: BTreeMap<ControllerKind, ControllerStatistik>,
    pub pro_verlust: Vec<VerlustStatistik>,
}

#[derive(Default)]
struct Akku {
    laeufe: usize,
    erfolge: usize,
    summe: f64,
}

impl Akku {
    fn aufnehmen(&mut self, score: Option<f64>) {
        self.laeufe += 1;
        if let Some(s) = score {
            self.erfolge += 1;
            self.summe += s;
        }
    }

    fn mittelwert(&self) -> Option<f64> {
        (self.erfolge > 0).then(|| self.summe / self.erfolge as f64)
    }
}

impl VergleichsZusammenfassung {
    pub fn aus_ergebnissen(ergebnisse: &[EvaluationOutcome]) -> Self {
        let mut pro_controller: BTreeMap<ControllerKind, Akku> = BTreeMap::new();
        let mut pro_verlust: BTreeMap<(ControllerKind, i64), (f64, Akku)> = BTreeMap::new();

        for o in ergebnisse {
            let score = o.quality_score();
            pro_controller.entry(o.controller).or_default().aufnehmen(score);
            pro_verlust
                .entry((o.controller, verlust_schluessel(o.loss_perc)))
                .or_insert_with(|| (o.loss_perc, Akku::default()))
                .1
                .aufnehmen(score);
        }

        Self {
            controller: pro_controller
                .into_iter()
                .map(|(kind, a)| {
                    (
                        kind,
                        ControllerStatistik {
                            laeufe: a.laeufe,
                            fehler: a.laeufe - a.erfolge,
                            mittlerer_score: a.mittelwert(),
                        },
                    )
                })
                .collect(),
            pro_verlust: pro_verlust
                .into_iter()
                .map(|((controller, _), (loss_perc, a))| VerlustStatistik {
                    controller,
                    loss_perc,
                    laeufe: a.laeufe,
                    mittlerer_score: a.mittelwert(),
                })
                .collect(),
        }
    }

    /// Controller mit dem hoechsten mittleren Score
    pub fn bester(&self) -> Option<(ControllerKind, f64)> {
        self.controller
            .iter()
            .filter_map(|(k, s)| s.mittlerer_score.map(|m| (*k, m)))
            .fold(None, |bester: Option<(ControllerKind, f64)>, (k, m)| match bester {
                Some((_, b)) if b >= m => bester,
                _ => Some((k, m)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::OutcomeStatus;
    use adaptive_opus_core::SourceId;
    use std::time::Duration;

    fn outcome(controller: ControllerKind, verlust: f64, score: Option<f64>) -> EvaluationOutcome {
        EvaluationOutcome {
            controller,
            source_id: SourceId("a.wav".into()),
            loss_perc: verlust,
            decision: None,
            status: match score {
                Some(s) => OutcomeStatus::Erfolg {
                    quality_score: s,
                    floor_fallback: false,
                },
                None => OutcomeStatus::Fehler {
                    art: "decode".into(),
                    grund: "exit status 1".into(),
                },
            },
            entscheidung_dauer: Duration::ZERO,
            dauer: Duration::ZERO,
        }
    }

    #[test]
    fn mittelwerte_und_fehler_pro_controller() {
        let z = VergleichsZusammenfassung::aus_ergebnissen(&[
            outcome(ControllerKind::Static, 0.0, Some(3.0)),
            outcome(ControllerKind::Static, 5.0, Some(2.0)),
            outcome(ControllerKind::ModelBased, 0.0, None),
            outcome(ControllerKind::ModelBased, 5.0, Some(4.0)),
            outcome(ControllerKind::Hybrid, 0.0, None),
        ]);

        let statisch = &z.controller[&ControllerKind::Static];
        assert_eq!(statisch.laeufe, 2);
        assert_eq!(statisch.fehler, 0);
        assert_eq!(statisch.mittlerer_score, Some(2.5));

        let modell = &z.controller[&ControllerKind::ModelBased];
        assert_eq!(modell.fehler, 1);
        assert_eq!(modell.mittlerer_score, Some(4.0));

        assert_eq!(z.controller[&ControllerKind::Hybrid].mittlerer_score, None);
        assert_eq!(z.pro_verlust.len(), 5);
        assert_eq!(z.bester(), Some((ControllerKind::ModelBased, 4.0)));
    }
}
