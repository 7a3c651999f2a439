//! Prometheus-kompatible Metriken eines Sweeps
//!
//! Registrierte Metriken:
//! - `ao_sweep_jobs_total{ergebnis}` – Counter: Jobs nach Ergebnis (ok/fehler/abgebrochen)
//! - `ao_sweep_job_failures_total{art}` – Counter: Fehlgeschlagene Jobs nach Fehlerart
//! - `ao_sweep_job_duration_seconds` – Histogram: Laufzeit eines Jobs
//! - `ao_sweep_quality_score` – Histogram: MOS-Werte erfolgreicher Jobs
//! - `ao_sweep_floor_scores_total` – Counter: Boden-Werte nach Scorer-Fehlern
//!
//! Aktualisiert wird ausschliesslich vom koordinierenden Thread.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Ergebnis-Label fuer `ao_sweep_jobs_total`
pub const ERGEBNIS_OK: &str = "ok";
pub const ERGEBNIS_FEHLER: &str = "fehler";
pub const ERGEBNIS_ABGEBROCHEN: &str = "abgebrochen";

/// Alle Sweep-Metriken in einer eigenen Registry
#[derive(Clone)]
pub struct SweepMetrics {
    pub registry: Arc<Registry>,

    pub jobs_total: IntCounterVec,
    pub job_failures_total: IntCounterVec,
    pub job_duration_seconds: Histogram,
    pub quality_score: Histogram,
    pub floor_scores_total: IntCounter,
}

impl SweepMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("ao_sweep_jobs_total", "Abgeschlossene Sweep-Jobs nach Ergebnis"),
            &["ergebnis"],
        )?;
        registry.register(Box::new(jobs_total.clone()))?;

        let job_failures_total = IntCounterVec::new(
            Opts::new(
                "ao_sweep_job_failures_total",
                "Fehlgeschlagene Sweep-Jobs nach Fehlerart",
            ),
            &["art"],
        )?;
        registry.register(Box::new(job_failures_total.clone()))?;

        let job_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "ao_sweep_job_duration_seconds",
                "Laufzeit eines Jobs (Encode, Decode, Bewertung) in Sekunden",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;
        registry.register(Box::new(job_duration_seconds.clone()))?;

        let quality_score = Histogram::with_opts(
            HistogramOpts::new("ao_sweep_quality_score", "MOS-Werte erfolgreicher Jobs")
                .buckets(vec![1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5]),
        )?;
        registry.register(Box::new(quality_score.clone()))?;

        let floor_scores_total = IntCounter::with_opts(Opts::new(
            "ao_sweep_floor_scores_total",
            "Jobs, deren Score nach einem Scorer-Fehler auf den Boden-Wert gesetzt wurde",
        ))?;
        registry.register(Box::new(floor_scores_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            jobs_total,
            job_failures_total,
            job_duration_seconds,
            quality_score,
            floor_scores_total,
        })
    }

    /// Erfasst einen erfolgreichen Job
    pub fn job_erfolg(&self, dauer: Duration, mos: f64, floor_fallback: bool) {
        self.jobs_total.with_label_values(&[ERGEBNIS_OK]).inc();
        self.job_duration_seconds.observe(dauer.as_secs_f64());
        self.quality_score.observe(mos);
        if floor_fallback {
            self.floor_scores_total.inc();
        }
    }

    /// Erfasst einen fehlgeschlagenen Job mit Fehlerart
    pub fn job_fehler(&self, art: &str, dauer: Duration) {
        self.jobs_total.with_label_values(&[ERGEBNIS_FEHLER]).inc();
        self.job_failures_total.with_label_values(&[art]).inc();
        self.job_duration_seconds.observe(dauer.as_secs_f64());
    }

    /// Erfasst einen durch Abbruch beendeten Job
    pub fn job_abgebrochen(&self) {
        self.jobs_total.with_label_values(&[ERGEBNIS_ABGEBROCHEN]).inc();
    }

    /// Anzahl Jobs mit dem gegebenen Ergebnis-Label
    pub fn jobs(&self, ergebnis: &str) -> u64 {
        self.jobs_total.with_label_values(&[ergebnis]).get()
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn als_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
