//! adaptive-opus-cli – Befehle des `adaptive-opus`-Werkzeugs
//!
//! Die Befehle laufen blockierend (Worker-Threads, externe Prozesse) und
//! werden von `main` ueber `spawn_blocking` gestartet. Ein gemeinsames
//! `CancellationToken` traegt den Operator-Abbruch (Ctrl-C) hinein.

pub mod args;
pub mod config;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use adaptive_opus_codec::{OpusToolsPipeline, PipelineOracle, SegSnrScorer};
use adaptive_opus_controller::predictor_laden;
use adaptive_opus_core::{AudioSource, ParameterSpace, QualityOracle};
use adaptive_opus_evaluation::{
    controller_aufloesen, jobs_erstellen, quellen_finden, Dataset, EvaluationHarness,
    EvaluationOutcome, SweepEinstellungen, SweepError, SweepOrchestrator,
    VergleichsZusammenfassung,
};
use adaptive_opus_observability::SweepMetrics;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::args::EvaluateArgs;
use crate::config::AppConfig;

// ---- Exit-Codes ----

pub const EXIT_OK: u8 = 0;
/// Eingaben vorhanden, aber kein einziges Sample / sonstiger Fehler
pub const EXIT_FEHLER: u8 = 1;
pub const EXIT_KEINE_EINGABEN: u8 = 2;
pub const EXIT_ABBRUCH: u8 = 130;

/// Zusammenfassung eines Sweep-Laufs, als JSON neben dem Datensatz abgelegt
#[derive(Debug, Clone, Serialize)]
pub struct SweepBericht {
    pub gestartet: DateTime<Utc>,
    pub beendet: DateTime<Utc>,
    pub eingaben: usize,
    pub jobs: usize,
    pub worker: usize,
    pub samples: usize,
    pub fehler: usize,
    pub floor_scores: usize,
    pub fehler_nach_art: BTreeMap<String, usize>,
    pub dauer_s: f64,
    pub dataset: PathBuf,
}

/// Baut das Qualitaets-Orakel aus der Konfiguration
pub fn oracle_bauen(config: &AppConfig) -> PipelineOracle<OpusToolsPipeline, SegSnrScorer> {
    let oracle = PipelineOracle::new(
        OpusToolsPipeline::new(config.codec.opus_tools()),
        SegSnrScorer::default(),
    )
    .mit_ziel_rate(config.codec.target_sample_rate);
    match &config.codec.work_dir {
        Some(pfad) => oracle.mit_arbeitsverzeichnis(pfad),
        None => oracle,
    }
}

/// Pfad der JSON-Zusammenfassung: `<output>.summary.json`
pub fn bericht_pfad(dataset: &Path) -> PathBuf {
    let mut name = OsString::from(dataset.as_os_str());
    name.push(".summary.json");
    PathBuf::from(name)
}

/// Fuehrt einen vollstaendigen Sweep aus und schreibt Datensatz, Bericht und Metriken
pub fn sweep_ausfuehren<O: QualityOracle>(
    config: &AppConfig,
    oracle: O,
    abbruch: &CancellationToken,
) -> Result<SweepBericht> {
    let gestartet = Utc::now();
    let quellen = quellen_finden(
        &config.sweep.input_dir,
        &config.codec.extensions,
        config.sweep.max_files,
    )?;
    let jobs = jobs_erstellen(
        &quellen,
        &ParameterSpace.generate_all_configs(),
        &config.sweep.loss_levels,
    );
    info!(
        eingaben = quellen.len(),
        jobs = jobs.len(),
        eingabe = %config.sweep.input_dir.display(),
        "Job-Menge erstellt"
    );

    let metriken = SweepMetrics::neu()?;
    let orchestrator = SweepOrchestrator::new(
        oracle,
        SweepEinstellungen {
            worker: config.sweep.workers,
        },
    )
    .mit_metriken(metriken.clone());
    let ergebnis = orchestrator.run(jobs, abbruch)?;

    let mut fehler_nach_art = BTreeMap::new();
    for f in &ergebnis.fehler {
        *fehler_nach_art.entry(f.fehler.art().to_string()).or_insert(0) += 1;
    }
    let floor_scores = ergebnis.floor_anzahl();
    let (dataset, doppelt) = Dataset::aus_samples(ergebnis.samples);
    if doppelt > 0 {
        warn!(doppelt, "Doppelte Datensatz-Schluessel verworfen");
    }
    dataset
        .speichern(&config.sweep.output)
        .with_context(|| format!("Datensatz '{}' nicht schreibbar", config.sweep.output.display()))?;

    let bericht = SweepBericht {
        gestartet,
        beendet: Utc::now(),
        eingaben: quellen.len(),
        jobs: ergebnis.gesamt,
        worker: ergebnis.worker,
        samples: dataset.len(),
        fehler: ergebnis.fehler.len(),
        floor_scores,
        fehler_nach_art,
        dauer_s: ergebnis.dauer.as_secs_f64(),
        dataset: config.sweep.output.clone(),
    };
    let pfad = bericht_pfad(&config.sweep.output);
    std::fs::write(&pfad, serde_json::to_string_pretty(&bericht)?)
        .with_context(|| format!("Bericht '{}' nicht schreibbar", pfad.display()))?;

    if let Some(metrik_pfad) = &config.sweep.metrics_file {
        std::fs::write(metrik_pfad, metriken.als_text()?)
            .with_context(|| format!("Metriken '{}' nicht schreibbar", metrik_pfad.display()))?;
    }

    info!(
        samples = bericht.samples,
        fehler = bericht.fehler,
        dataset = %bericht.dataset.display(),
        "Sweep-Ergebnisse geschrieben"
    );
    Ok(bericht)
}

/// Exit-Code eines Sweep-Laufs
pub fn sweep_exit_code(ergebnis: &Result<SweepBericht>) -> u8 {
    match ergebnis {
        Ok(b) if b.samples > 0 => EXIT_OK,
        Ok(_) => EXIT_FEHLER,
        Err(e) => match e.downcast_ref::<SweepError>() {
            Some(SweepError::KeineEingaben(_)) => EXIT_KEINE_EINGABEN,
            Some(SweepError::Abgebrochen { .. }) => EXIT_ABBRUCH,
            _ => EXIT_FEHLER,
        },
    }
}

/// Vergleicht Controller auf einer Quelle.
///
/// Schreibt eine JSON-Zeile pro Lauf und abschliessend die Zusammenfassung.
pub fn evaluate_ausfuehren<O: QualityOracle, W: Write>(
    config: &AppConfig,
    args: &EvaluateArgs,
    oracle: &O,
    abbruch: &CancellationToken,
    ausgabe: &mut W,
) -> Result<Vec<EvaluationOutcome>> {
    if !args.input.is_file() {
        anyhow::bail!("Eingabedatei '{}' nicht gefunden", args.input.display());
    }
    let controller = controller_aufloesen(&args.controller, &config.controller.einstellungen())?;
    let modell_pfad = args.model.as_ref().or(config.controller.model_path.as_ref());
    let predictor = predictor_laden(modell_pfad.map(PathBuf::as_path));
    let verluste = if args.verluste.is_empty() {
        config.sweep.loss_levels.clone()
    } else {
        args.verluste.clone()
    };

    let quelle = AudioSource::aus_pfad(&args.input);
    let harness = EvaluationHarness::new(oracle, predictor.as_ref());
    let ergebnisse = harness.compare(&controller, &quelle, &verluste, abbruch);

    for o in &ergebnisse {
        writeln!(ausgabe, "{}", serde_json::to_string(o)?)?;
    }
    let zusammenfassung = VergleichsZusammenfassung::aus_ergebnissen(&ergebnisse);
    writeln!(
        ausgabe,
        "{}",
        serde_json::json!({ "zusammenfassung": zusammenfassung })
    )?;
    if let Some((kind, mittel)) = zusammenfassung.bester() {
        info!(controller = %kind, mittlerer_score = mittel, "Bester Controller");
    }
    Ok(ergebnisse)
}

/// Gibt das Raster aus: Index und Konfiguration pro Zeile
pub fn configs_ausgeben<W: Write>(ausgabe: &mut W) -> std::io::Result<()> {
    for (i, config) in ParameterSpace.generate_all_configs().iter().enumerate() {
        writeln!(ausgabe, "{i:>2}  {config}")?;
    }
    Ok(())
}
