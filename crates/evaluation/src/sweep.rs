//! SweepOrchestrator – Job-Menge ueber einen festen Worker-Pool abarbeiten
//!
//! ## Ablauf
//! - Alle Jobs liegen vorab in einer Queue, der Sender wird danach geschlossen
//! - N benannte Worker-Threads ziehen Jobs und rufen das Orakel auf
//! - Ergebnisse kommen in Fertigstellungsreihenfolge ueber einen Kanal zurueck
//! - Nur der koordinierende Thread sammelt Samples und pflegt Metriken
//!
//! ## Abbau
//! Der Pool lebt in einem `std::thread::scope`; beim Verlassen des Scopes
//! sind alle Worker beendet, auch bei Abbruch oder Panic im Koordinator.
//! Ergebnis-Kanal und Drop-Guard gehoeren dem Scope, sodass ein Panic im
//! Koordinator beide abbaut, bevor auf die Worker gewartet wird.
//! Ein Abbruch wird ueber ein Kind-Token an wartende und laufende Jobs
//! weitergegeben. Jobs werden nie automatisch wiederholt.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use adaptive_opus_core::{EncodingConfig, EvalError, EvaluationSample, QualityOracle, QualityScore, SourceId};
use adaptive_opus_observability::SweepMetrics;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{SweepError, SweepResult};
use crate::jobs::SweepJob;

/// Schrittweite der Fortschrittsmeldungen in Prozent
const FORTSCHRITT_SCHRITT_PROZENT: usize = 10;

/// Einstellungen des Worker-Pools
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepEinstellungen {
    /// Anzahl Worker; 0 = Parallelitaet des Hosts
    pub worker: usize,
}

impl SweepEinstellungen {
    /// Effektive Worker-Anzahl, nie mehr als Jobs und nie weniger als 1
    pub fn worker_anzahl(&self, jobs: usize) -> usize {
        let basis = if self.worker == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.worker
        };
        basis.min(jobs).max(1)
    }
}

/// Gescheiterter Job, als Datensatz festgehalten
#[derive(Debug, Clone)]
pub struct JobFehler {
    pub index: usize,
    pub source_id: SourceId,
    pub config: EncodingConfig,
    pub verlust_prozent: f64,
    pub fehler: EvalError,
}

/// Ergebnis eines vollstaendigen Sweeps
#[derive(Debug, Clone, Default)]
pub struct SweepErgebnis {
    /// Erfolgreiche Samples in Fertigstellungsreihenfolge
    pub samples: Vec<EvaluationSample>,
    pub fehler: Vec<JobFehler>,
    pub gesamt: usize,
    pub worker: usize,
    pub dauer: Duration,
}

impl SweepErgebnis {
    pub fn abgeschlossen(&self) -> usize {
        self.samples.len() + self.fehler.len()
    }

    pub fn floor_anzahl(&self) -> usize {
        self.samples.iter().filter(|s| s.floor_fallback).count()
    }
}

/// Meldung eines Workers an den Koordinator
struct JobMeldung {
    job: SweepJob,
    ergebnis: Result<QualityScore, EvalError>,
    dauer: Duration,
}

/// Fuehrt Job-Mengen gegen ein Orakel aus
pub struct SweepOrchestrator<O> {
    oracle: O,
    einstellungen: SweepEinstellungen,
    metriken: Option<SweepMetrics>,
}

impl<O: QualityOracle> SweepOrchestrator<O> {
    pub fn new(oracle: O, einstellungen: SweepEinstellungen) -> Self {
        Self {
            oracle,
            einstellungen,
            metriken: None,
        }
    }

    pub fn mit_metriken(mut self, metriken: SweepMetrics) -> Self {
        self.metriken = Some(metriken);
        self
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Fuehrt alle Jobs aus.
    ///
    /// Job-Fehler landen in `SweepErgebnis::fehler`. Einzig ein Abbruch vor
    /// dem letzten Job oder ein nicht startbarer Worker beendet den Sweep
    /// mit einem Fehler; bereits gesammelte Samples werden dann verworfen.
    pub fn run(&self, jobs: Vec<SweepJob>, abbruch: &CancellationToken) -> SweepResult<SweepErgebnis> {
        let start = Instant::now();
        let gesamt = jobs.len();
        let worker = self.einstellungen.worker_anzahl(gesamt);
        let mut ergebnis = SweepErgebnis {
            gesamt,
            worker,
            ..Default::default()
        };
        if gesamt == 0 {
            return Ok(ergebnis);
        }

        info!(jobs = gesamt, worker, "Sweep gestartet");

        let (job_tx, job_rx) = unbounded::<SweepJob>();
        for job in jobs {
            // Empfaenger lebt noch, senden kann nicht scheitern
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let lauf = abbruch.child_token();
        let mut start_fehler = None;

        std::thread::scope(|scope| {
            // Bricht die Worker ab, falls der Koordinator vorzeitig aussteigt
            let waechter = lauf.clone().drop_guard();
            // Der Empfaenger lebt im Scope: steigt der Koordinator per Panic aus,
            // scheitern blockierte `send`-Aufrufe und die Worker enden vor dem Join.
            let (meldung_tx, meldung_rx) = bounded::<JobMeldung>(worker * 2);

            for nr in 0..worker {
                let job_rx = job_rx.clone();
                let meldung_tx = meldung_tx.clone();
                let token = lauf.clone();
                let oracle = &self.oracle;
                let gestartet = std::thread::Builder::new()
                    .name(format!("ao-sweep-{nr}"))
                    .spawn_scoped(scope, move || worker_schleife(oracle, job_rx, meldung_tx, token));
                if let Err(e) = gestartet {
                    warn!(worker = nr, fehler = %e, "Worker-Start fehlgeschlagen – Sweep wird beendet");
                    lauf.cancel();
                    start_fehler = Some(e);
                    break;
                }
            }
            drop(meldung_tx);
            drop(job_rx);

            let mut letzte_stufe = 0;
            for meldung in meldung_rx.iter() {
                self.verbuchen(meldung, lauf.is_cancelled(), &mut ergebnis);

                let stufe = ergebnis.abgeschlossen() * 100 / gesamt / FORTSCHRITT_SCHRITT_PROZENT;
                if stufe > letzte_stufe {
                    letzte_stufe = stufe;
                    info!(
                        abgeschlossen = ergebnis.abgeschlossen(),
                        gesamt,
                        samples = ergebnis.samples.len(),
                        fehler = ergebnis.fehler.len(),
                        "Sweep-Fortschritt {}%",
                        stufe * FORTSCHRITT_SCHRITT_PROZENT
                    );
                }
            }
            // Alle Worker haben ihren Sender fallen gelassen; der Scope joined sie
            waechter.disarm();
        });

        ergebnis.dauer = start.elapsed();

        if let Some(e) = start_fehler {
            return Err(SweepError::WorkerStart(e));
        }
        let abgeschlossen = ergebnis.abgeschlossen();
        if lauf.is_cancelled() && abgeschlossen < gesamt {
            if let Some(m) = &self.metriken {
                for _ in abgeschlossen..gesamt {
                    m.job_abgebrochen();
                }
            }
            warn!(abgeschlossen, gesamt, "Sweep abgebrochen – Teilergebnisse verworfen");
            return Err(SweepError::Abgebrochen {
                abgeschlossen,
                gesamt,
            });
        }

        info!(
            gesamt,
            samples = ergebnis.samples.len(),
            fehler = ergebnis.fehler.len(),
            floor = ergebnis.floor_anzahl(),
            dauer_s = ergebnis.dauer.as_secs_f64(),
            "Sweep abgeschlossen"
        );
        Ok(ergebnis)
    }

    fn verbuchen(&self, meldung: JobMeldung, abgebrochen: bool, ergebnis: &mut SweepErgebnis) {
        let JobMeldung { job, ergebnis: r, dauer } = meldung;
        match r {
            Ok(score) => {
                if score.floor_fallback {
                    debug!(index = job.index, quelle = %job.quelle.id, config = %job.config,
                        verlust = job.verlust_prozent, "Boden-Wert uebernommen");
                }
                if let Some(m) = &self.metriken {
                    m.job_erfolg(dauer, score.mos, score.floor_fallback);
                }
                ergebnis.samples.push(EvaluationSample {
                    source_id: job.quelle.id.clone(),
                    config: job.config,
                    packet_loss_perc: job.verlust_prozent,
                    quality_score: score.mos,
                    floor_fallback: score.floor_fallback,
                    processing_time: dauer,
                });
            }
            Err(fehler) if abgebrochen && fehler.ist_abbruch() => {
                // Abgebrochene Jobs zaehlen nicht als abgeschlossen
                debug!(index = job.index, "Job abgebrochen");
            }
            Err(fehler) => {
                warn!(
                    index = job.index,
                    quelle = %job.quelle.id,
                    config = %job.config,
                    verlust = job.verlust_prozent,
                    art = fehler.art(),
                    fehler = %fehler,
                    "Job fehlgeschlagen – kein Sample"
                );
                if let Some(m) = &self.metriken {
                    m.job_fehler(fehler.art(), dauer);
                }
                ergebnis.fehler.push(JobFehler {
                    index: job.index,
                    source_id: job.quelle.id.clone(),
                    config: job.config,
                    verlust_prozent: job.verlust_prozent,
                    fehler,
                });
            }
        }
    }
}

fn worker_schleife<O: QualityOracle>(
    oracle: &O,
    jobs: Receiver<SweepJob>,
    meldungen: Sender<JobMeldung>,
    abbruch: CancellationToken,
) {
    for job in jobs.iter() {
        if abbruch.is_cancelled() {
            break;
        }
        let start = Instant::now();
        let ergebnis = catch_unwind(AssertUnwindSafe(|| {
            oracle.evaluate(&job.quelle, &job.config, job.verlust_prozent, &abbruch)
        }))
        .unwrap_or_else(|panik| Err(EvalError::Intern(panik_text(panik.as_ref()))));

        let meldung = JobMeldung {
            job,
            ergebnis,
            dauer: start.elapsed(),
        };
        if meldungen.send(meldung).is_err() {
            // Koordinator ist weg
            break;
        }
    }
}

fn panik_text(panik: &(dyn Any + Send)) -> String {
    if let Some(s) = panik.downcast_ref::<&str>() {
        format!("Panic im Job: {s}")
    } else if let Some(s) = panik.downcast_ref::<String>() {
        format!("Panic im Job: {s}")
    } else {
        "Panic im Job".to_string()
    }
}
