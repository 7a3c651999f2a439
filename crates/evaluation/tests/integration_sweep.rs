//! Integration-Tests fuer SweepOrchestrator und Dataset (Mock-Orakel)

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use adaptive_opus_core::{
    generate_all_configs, AudioSource, EncodingConfig, EvalError, QualityOracle, QualityScore,
    SWEEP_LOSS_LEVELS,
};
use adaptive_opus_evaluation::{
    jobs_erstellen, verlust_schluessel, Dataset, SampleSchluessel, SweepEinstellungen, SweepError, SweepJob,
    SweepOrchestrator,
};
use adaptive_opus_observability::SweepMetrics;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// ---- Hilfen ----

/// Zaehlt laufende Aufrufe und beteiligte Threads
#[derive(Default)]
struct Buchhaltung {
    aktiv: AtomicUsize,
    aufrufe: AtomicUsize,
    threads: Mutex<HashSet<ThreadId>>,
}

impl Buchhaltung {
    fn betreten(&self) -> usize {
        self.aktiv.fetch_add(1, Ordering::SeqCst);
        self.threads.lock().unwrap().insert(std::thread::current().id());
        self.aufrufe.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn verlassen(&self) {
        self.aktiv.fetch_sub(1, Ordering::SeqCst);
    }
}

fn score_fuer(config: &EncodingConfig, verlust: f64) -> f64 {
    1.0 + config.bitrate_kbps as f64 / 16.0 - verlust / 10.0
}

/// Scheitert fuer b.wav bei 3 % Verlust und fuer 16 kbps mit FEC; panict bei 12/60/c9/fec
#[derive(Default)]
struct TeilweiseKaputt {
    buch: Buchhaltung,
}

impl TeilweiseKaputt {
    fn soll_scheitern(quelle: &AudioSource, config: &EncodingConfig, verlust: f64) -> bool {
        (quelle.id.as_str() == "b.wav" && verlust == 3.0)
            || (config.bitrate_kbps == 16 && config.use_fec)
            || Self::soll_paniken(config)
    }

    fn soll_paniken(config: &EncodingConfig) -> bool {
        config.bitrate_kbps == 12 && config.frame_size.as_ms() == 60 && config.complexity == 9 && config.use_fec
    }
}

impl QualityOracle for TeilweiseKaputt {
    fn evaluate(
        &self,
        quelle: &AudioSource,
        config: &EncodingConfig,
        verlust_prozent: f64,
        _abbruch: &CancellationToken,
    ) -> Result<QualityScore, EvalError> {
        self.buch.betreten();
        let ergebnis = if Self::soll_paniken(config) {
            self.buch.verlassen();
            panic!("Scorer-Bibliothek abgestuerzt");
        } else if Self::soll_scheitern(quelle, config, verlust_prozent) {
            Err(EvalError::Encode("opusenc exit status 1".into()))
        } else {
            Ok(QualityScore::gemessen(score_fuer(config, verlust_prozent)))
        };
        self.buch.verlassen();
        ergebnis
    }
}

fn quellen() -> Vec<AudioSource> {
    ["a.wav", "b.wav", "c.wav"]
        .iter()
        .map(|n| AudioSource::aus_pfad(format!("/daten/{n}")))
        .collect()
}

fn alle_jobs() -> Vec<SweepJob> {
    jobs_erstellen(&quellen(), &generate_all_configs(), &SWEEP_LOSS_LEVELS)
}

fn schluessel_von_job(job: &SweepJob) -> SampleSchluessel {
    SampleSchluessel {
        source_id: job.quelle.id.clone(),
        config: job.config,
        verlust_milli: verlust_schluessel(job.verlust_prozent),
    }
}

// ---- Fehlerisolation ----

#[test]
fn fehlschlagende_jobs_fehlen_genau() {
    let orchestrator = SweepOrchestrator::new(TeilweiseKaputt::default(), SweepEinstellungen { worker: 4 });
    let jobs = alle_jobs();
    let gesamt = jobs.len();

    let erwartet_ok: HashSet<SampleSchluessel> = jobs
        .iter()
        .filter(|j| !TeilweiseKaputt::soll_scheitern(&j.quelle, &j.config, j.verlust_prozent))
        .map(schluessel_von_job)
        .collect();
    let erwartet_fehler = gesamt - erwartet_ok.len();

    let ergebnis = orchestrator.run(jobs, &CancellationToken::new()).unwrap();

    let (dataset, doppelt) = Dataset::aus_samples(ergebnis.samples.clone());
    assert_eq!(doppelt, 0);
    let erhalten: HashSet<SampleSchluessel> =
        dataset.samples().iter().map(SampleSchluessel::von).collect();
    assert_eq!(erhalten, erwartet_ok);
    assert_eq!(ergebnis.fehler.len(), erwartet_fehler);
    assert_eq!(ergebnis.abgeschlossen(), gesamt);

    // Nicht betroffene Jobs sind unveraendert
    for s in &ergebnis.samples {
        let erwartet = QualityScore::gemessen(score_fuer(&s.config, s.packet_loss_perc)).mos;
        assert!((s.quality_score - erwartet).abs() < 1e-12);
    }

    // Panics werden als interne Fehler erfasst
    let panik_fehler = ergebnis
        .fehler
        .iter()
        .filter(|f| matches!(f.fehler, EvalError::Intern(_)))
        .count();
    assert_eq!(panik_fehler, 3 * 7);

    // Sauberer Abbau: keine laufenden Aufrufe, nie mehr Threads als Worker
    let buch = &orchestrator.oracle().buch;
    assert_eq!(buch.aktiv.load(Ordering::SeqCst), 0);
    assert_eq!(buch.aufrufe.load(Ordering::SeqCst), gesamt);
    assert!(buch.threads.lock().unwrap().len() <= 4);
}

#[test]
fn metriken_zaehlen_fehler_nach_art() {
    let metriken = SweepMetrics::neu().unwrap();
    let orchestrator = SweepOrchestrator::new(TeilweiseKaputt::default(), SweepEinstellungen { worker: 2 })
        .mit_metriken(metriken.clone());
    let ergebnis = orchestrator.run(alle_jobs(), &CancellationToken::new()).unwrap();

    assert_eq!(metriken.jobs("ok") as usize, ergebnis.samples.len());
    assert_eq!(metriken.jobs("fehler") as usize, ergebnis.fehler.len());
    assert_eq!(
        metriken.job_failures_total.with_label_values(&["intern"]).get(),
        21
    );
}

// ---- Abbruch ----

/// Bricht den Sweep nach `nach` Aufrufen ab; laufende Jobs beachten das Token
struct AbbruchNach {
    nach: usize,
    sweep_token: CancellationToken,
    buch: Buchhaltung,
}

impl QualityOracle for AbbruchNach {
    fn evaluate(
        &self,
        _quelle: &AudioSource,
        config: &EncodingConfig,
        verlust_prozent: f64,
        abbruch: &CancellationToken,
    ) -> Result<QualityScore, EvalError> {
        let nr = self.buch.betreten();
        if nr == self.nach {
            self.sweep_token.cancel();
        }
        std::thread::sleep(Duration::from_millis(2));
        let ergebnis = if abbruch.is_cancelled() {
            Err(EvalError::Abgebrochen)
        } else {
            Ok(QualityScore::gemessen(score_fuer(config, verlust_prozent)))
        };
        self.buch.verlassen();
        ergebnis
    }
}

#[test]
fn abbruch_nach_n_jobs_beendet_alle_worker() {
    let token = CancellationToken::new();
    let orchestrator = SweepOrchestrator::new(
        AbbruchNach {
            nach: 20,
            sweep_token: token.clone(),
            buch: Buchhaltung::default(),
        },
        SweepEinstellungen { worker: 4 },
    );
    let jobs = alle_jobs();
    let gesamt = jobs.len();

    let err = orchestrator.run(jobs, &token).unwrap_err();
    match err {
        SweepError::Abgebrochen {
            abgeschlossen,
            gesamt: g,
        } => {
            assert_eq!(g, gesamt);
            assert!(abgeschlossen < 20, "abgeschlossen = {abgeschlossen}");
        }
        andere => panic!("unerwarteter Fehler: {andere}"),
    }

    let buch = &orchestrator.oracle().buch;
    assert_eq!(buch.aktiv.load(Ordering::SeqCst), 0);
    // Nach dem Abbruch startet kein Worker mehr einen neuen Job
    assert!(buch.aufrufe.load(Ordering::SeqCst) < 20 + 4);
}

/// Blockiert, bis der Abbruch beobachtet wird
#[derive(Default)]
struct Haengt {
    buch: Buchhaltung,
}

impl QualityOracle for Haengt {
    fn evaluate(
        &self,
        _quelle: &AudioSource,
        _config: &EncodingConfig,
        _verlust_prozent: f64,
        abbruch: &CancellationToken,
    ) -> Result<QualityScore, EvalError> {
        self.buch.betreten();
        while !abbruch.is_cancelled() {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.buch.verlassen();
        Err(EvalError::Abgebrochen)
    }
}

#[test]
fn abbruch_laufender_jobs_ohne_deadlock() {
    let token = CancellationToken::new();
    let orchestrator = Arc::new(SweepOrchestrator::new(Haengt::default(), SweepEinstellungen { worker: 3 }));

    let (tx, rx) = mpsc::channel();
    let lauf = {
        let orchestrator = Arc::clone(&orchestrator);
        let token = token.clone();
        std::thread::spawn(move || {
            let r = orchestrator.run(alle_jobs(), &token);
            let _ = tx.send(r.is_err());
        })
    };

    std::thread::sleep(Duration::from_millis(50));
    token.cancel();

    let war_fehler = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("Sweep haengt nach Abbruch");
    assert!(war_fehler);
    lauf.join().unwrap();

    let buch = &orchestrator.oracle().buch;
    assert_eq!(buch.aktiv.load(Ordering::SeqCst), 0);
    assert!(buch.aufrufe.load(Ordering::SeqCst) <= 3);
}

#[test]
fn abbruch_vor_start_fuehrt_keinen_job_aus() {
    let token = CancellationToken::new();
    token.cancel();
    let orchestrator = SweepOrchestrator::new(TeilweiseKaputt::default(), SweepEinstellungen { worker: 2 });
    let err = orchestrator.run(alle_jobs(), &token).unwrap_err();
    assert!(matches!(err, SweepError::Abgebrochen { abgeschlossen: 0, .. }));
    assert_eq!(orchestrator.oracle().buch.aufrufe.load(Ordering::SeqCst), 0);
}

// ---- Panic im Koordinator ----

/// Antwortet sofort mit festem Score
#[derive(Default)]
struct Sofort {
    buch: Buchhaltung,
}

impl QualityOracle for Sofort {
    fn evaluate(
        &self,
        _quelle: &AudioSource,
        config: &EncodingConfig,
        verlust_prozent: f64,
        _abbruch: &CancellationToken,
    ) -> Result<QualityScore, EvalError> {
        self.buch.betreten();
        let score = QualityScore::gemessen(score_fuer(config, verlust_prozent));
        self.buch.verlassen();
        Ok(score)
    }
}

/// Laesst die erste Fortschrittsmeldung des Koordinators scheitern
struct FortschrittPanik;

struct Nachricht(String);

impl tracing::field::Visit for Nachricht {
    fn record_debug(&mut self, feld: &tracing::field::Field, wert: &dyn std::fmt::Debug) {
        if feld.name() == "message" {
            self.0 = format!("{wert:?}");
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for FortschrittPanik {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut nachricht = Nachricht(String::new());
        event.record(&mut nachricht);
        if nachricht.0.starts_with("Sweep-Fortschritt") {
            panic!("Koordinator defekt");
        }
    }
}

#[test]
fn panic_im_koordinator_baut_pool_ab() {
    let orchestrator = Arc::new(SweepOrchestrator::new(Sofort::default(), SweepEinstellungen { worker: 4 }));
    let quellen: Vec<AudioSource> = (0..10)
        .map(|i| AudioSource::aus_pfad(format!("/korpus/q{i}.wav")))
        .collect();
    let jobs = jobs_erstellen(&quellen, &generate_all_configs(), &SWEEP_LOSS_LEVELS);

    let (tx, rx) = mpsc::channel();
    let helfer = {
        let orchestrator = Arc::clone(&orchestrator);
        std::thread::spawn(move || {
            let subscriber = tracing_subscriber::registry().with(FortschrittPanik);
            let r = tracing::subscriber::with_default(subscriber, || {
                catch_unwind(AssertUnwindSafe(|| {
                    orchestrator.run(jobs, &CancellationToken::new())
                }))
            });
            let _ = tx.send(r.is_err());
        })
    };

    let panik_weitergereicht = rx
        .recv_timeout(Duration::from_secs(15))
        .expect("Worker-Pool nach Panic im Koordinator nicht abgebaut");
    assert!(panik_weitergereicht);
    helfer.join().unwrap();

    let buch = &orchestrator.oracle().buch;
    assert_eq!(buch.aktiv.load(Ordering::SeqCst), 0);
    assert!(buch.aufrufe.load(Ordering::SeqCst) < 10 * 72 * SWEEP_LOSS_LEVELS.len());
}

// ---- Datensatz ----

#[test]
fn zwei_sweeps_ohne_doppelte_schluessel() {
    let erster = SweepOrchestrator::new(TeilweiseKaputt::default(), SweepEinstellungen { worker: 4 })
        .run(alle_jobs(), &CancellationToken::new())
        .unwrap();
    let zweiter = SweepOrchestrator::new(TeilweiseKaputt::default(), SweepEinstellungen { worker: 1 })
        .run(alle_jobs(), &CancellationToken::new())
        .unwrap();

    let (mut a, doppelt_a) = Dataset::aus_samples(erster.samples);
    let (b, doppelt_b) = Dataset::aus_samples(zweiter.samples);
    assert_eq!(doppelt_a, 0);
    assert_eq!(doppelt_b, 0);
    assert_eq!(a.len(), b.len());

    // Gleiche Schluesselmenge: Zusammenfuehren fuegt nichts hinzu
    let vorher = a.len();
    let verworfen = a.erweitern(b.samples().to_vec());
    assert_eq!(verworfen, b.len());
    assert_eq!(a.len(), vorher);

    let dir = tempfile::tempdir().unwrap();
    let pfad = dir.path().join("datensatz.csv");
    a.speichern(&pfad).unwrap();
    let zeilen: Vec<String> = std::fs::read_to_string(&pfad)
        .unwrap()
        .lines()
        .skip(1)
        .map(|z| z.rsplit_once(',').unwrap().0.to_string())
        .collect();
    let eindeutig: HashSet<&String> = zeilen.iter().collect();
    assert_eq!(eindeutig.len(), zeilen.len());
}
