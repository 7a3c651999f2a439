//! Quellensuche und Aufbau der Job-Menge
//!
//! Job-Menge = Quellen × Konfigurationen × Verluststufen, in dieser
//! Schachtelung (Quelle aussen, Verlust innen). Doppelte Quellen-IDs,
//! Konfigurationen und (nach dem Klemmen) Verluste werden entfernt, damit
//! jeder Datensatz-Schluessel hoechstens einmal entsteht.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use adaptive_opus_core::{verlust_klemmen, AudioSource, EncodingConfig};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::dataset::verlust_schluessel;
use crate::error::{SweepError, SweepResult};

/// Standard-Dateiendungen fuer Quellen
pub const STANDARD_ENDUNGEN: [&str; 2] = ["flac", "wav"];

/// Ein einzelner Bewertungsauftrag
#[derive(Debug, Clone)]
pub struct SweepJob {
    /// Position in der Einreichungsreihenfolge
    pub index: usize,
    pub quelle: Arc<AudioSource>,
    pub config: EncodingConfig,
    /// Geklemmter Verlust in Prozent
    pub verlust_prozent: f64,
}

/// Sucht Quelldateien rekursiv unter `wurzel`.
///
/// Treffer werden nach Pfad sortiert und auf `max_dateien` gekuerzt
/// (0 = unbegrenzt). Die ID einer Quelle ist ihr Pfad relativ zu `wurzel`.
/// Ohne einen einzigen Treffer endet die Suche mit `KeineEingaben`.
pub fn quellen_finden(
    wurzel: &Path,
    endungen: &[String],
    max_dateien: usize,
) -> SweepResult<Vec<AudioSource>> {
    if !wurzel.is_dir() {
        warn!(pfad = %wurzel.display(), "Eingabeverzeichnis existiert nicht");
        return Err(SweepError::KeineEingaben(wurzel.to_path_buf()));
    }

    let endungen: Vec<String> = endungen.iter().map(|e| e.to_ascii_lowercase()).collect();
    let mut treffer = sammeln(wurzel, &endungen);
    treffer.sort();

    let gefunden = treffer.len();
    if max_dateien > 0 {
        treffer.truncate(max_dateien);
    }
    debug!(
        pfad = %wurzel.display(),
        gefunden,
        verwendet = treffer.len(),
        "Quellen gesucht"
    );

    if treffer.is_empty() {
        return Err(SweepError::KeineEingaben(wurzel.to_path_buf()));
    }
    Ok(treffer
        .into_iter()
        .map(|pfad| AudioSource::relativ_zu(wurzel, pfad))
        .collect())
}

/// Laeuft rekursiv ueber `wurzel`; Ignore-Dateien und versteckte Eintraege
/// spielen fuer Audio-Korpora keine Rolle und werden nicht ausgewertet.
fn sammeln(wurzel: &Path, endungen: &[String]) -> Vec<PathBuf> {
    let mut treffer = Vec::new();
    let walker = WalkBuilder::new(wurzel)
        .standard_filters(false)
        .follow_links(false)
        .build();
    for eintrag in walker {
        let eintrag = match eintrag {
            Ok(e) => e,
            Err(e) => {
                warn!(pfad = %wurzel.display(), fehler = %e, "Eintrag nicht lesbar – uebersprungen");
                continue;
            }
        };
        let ist_datei = eintrag.file_type().is_some_and(|t| t.is_file());
        if ist_datei && hat_endung(eintrag.path(), endungen) {
            treffer.push(eintrag.into_path());
        }
    }
    treffer
}

fn hat_endung(pfad: &Path, endungen: &[String]) -> bool {
    pfad.extension()
        .and_then(|e| e.to_str())
        .map(|e| endungen.iter().any(|erlaubt| erlaubt.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Baut die kartesische Job-Menge
pub fn jobs_erstellen(
    quellen: &[AudioSource],
    configs: &[EncodingConfig],
    verluste: &[f64],
) -> Vec<SweepJob> {
    let mut gesehene_ids = HashSet::new();
    let quellen: Vec<Arc<AudioSource>> = quellen
        .iter()
        .filter(|q| {
            let neu = gesehene_ids.insert(q.id.clone());
            if !neu {
                warn!(quelle = %q.id, "Doppelte Quellen-ID – uebersprungen");
            }
            neu
        })
        .cloned()
        .map(Arc::new)
        .collect();

    let mut gesehene_configs = HashSet::new();
    let configs: Vec<EncodingConfig> = configs
        .iter()
        .copied()
        .filter(|c| gesehene_configs.insert(*c))
        .collect();

    let mut gesehene_verluste = HashSet::new();
    let verluste: Vec<f64> = verluste
        .iter()
        .map(|&v| verlust_klemmen(v))
        .filter(|&v| gesehene_verluste.insert(verlust_schluessel(v)))
        .collect();

    let mut jobs = Vec::with_capacity(quellen.len() * configs.len() * verluste.len());
    for quelle in &quellen {
        for config in &configs {
            for &verlust_prozent in &verluste {
                jobs.push(SweepJob {
                    index: jobs.len(),
                    quelle: Arc::clone(quelle),
                    config: *config,
                    verlust_prozent,
                });
            }
        }
    }
    jobs
}
