//! Datensatz der Sweep-Ergebnisse
//!
//! Eine Zeile pro erfolgreichem Job. Der Schluessel
//! (source_id, bitrate, frame_size, complexity, use_fec, packet_loss_perc)
//! ist innerhalb eines Datensatzes eindeutig.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use adaptive_opus_core::{verlust_klemmen, EncodingConfig, EvaluationSample, SourceId};
use tracing::{debug, info};

/// Spalten der CSV-Datei in fester Reihenfolge
pub const CSV_SPALTEN: [&str; 7] = [
    "source_id",
    "bitrate",
    "frame_size",
    "complexity",
    "use_fec",
    "packet_loss_perc",
    "quality_score",
];

/// Verlust als ganzzahliger Schluessel in Tausendstel Prozent
pub fn verlust_schluessel(verlust_prozent: f64) -> i64 {
    (verlust_klemmen(verlust_prozent) * 1000.0).round() as i64
}

/// Eindeutiger Schluessel einer Datensatz-Zeile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleSchluessel {
    pub source_id: SourceId,
    pub config: EncodingConfig,
    pub verlust_milli: i64,
}

impl SampleSchluessel {
    pub fn von(sample: &EvaluationSample) -> Self {
        Self {
            source_id: sample.source_id.clone(),
            config: sample.config,
            verlust_milli: verlust_schluessel(sample.packet_loss_perc),
        }
    }
}

/// Geordnete Sample-Tabelle ohne doppelte Schluessel
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    samples: Vec<EvaluationSample>,
    schluessel: HashSet<SampleSchluessel>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baut einen Datensatz; liefert zusaetzlich die Anzahl verworfener Duplikate
    pub fn aus_samples(samples: impl IntoIterator<Item = EvaluationSample>) -> (Self, usize) {
        let mut dataset = Self::new();
        let verworfen = dataset.erweitern(samples);
        (dataset, verworfen)
    }

    /// Fuegt ein Sample an. False wenn der Schluessel schon vorhanden ist.
    pub fn einfuegen(&mut self, sample: EvaluationSample) -> bool {
        if !self.schluessel.insert(SampleSchluessel::von(&sample)) {
            debug!(quelle = %sample.source_id, config = %sample.config, "Doppelte Zeile verworfen");
            return false;
        }
        self.samples.push(sample);
        true
    }

    /// Fuegt mehrere Samples an und liefert die Anzahl verworfener Duplikate
    pub fn erweitern(&mut self, samples: impl IntoIterator<Item = EvaluationSample>) -> usize {
        samples
            .into_iter()
            .map(|s| self.einfuegen(s))
            .filter(|eingefuegt| !eingefuegt)
            .count()
    }

    pub fn enthaelt(&self, schluessel: &SampleSchluessel) -> bool {
        self.schluessel.contains(schluessel)
    }

    pub fn samples(&self) -> &[EvaluationSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Schreibt den Datensatz als CSV mit Kopfzeile
    pub fn csv_schreiben<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "{}", CSV_SPALTEN.join(","))?;
        for s in &self.samples {
            writeln!(
                w,
                "{},{},{},{},{},{},{}",
                csv_feld(s.source_id.as_str()),
                s.config.bitrate_kbps,
                s.config.frame_size.as_ms(),
                s.config.complexity,
                s.config.use_fec,
                s.packet_loss_perc,
                s.quality_score
            )?;
        }
        w.flush()
    }

    /// Speichert den Datensatz als CSV-Datei; fehlende Verzeichnisse werden angelegt
    pub fn speichern(&self, pfad: &Path) -> std::io::Result<()> {
        if let Some(eltern) = pfad.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(eltern)?;
        }
        self.csv_schreiben(BufWriter::new(File::create(pfad)?))?;
        info!(pfad = %pfad.display(), zeilen = self.len(), "Datensatz gespeichert");
        Ok(())
    }
}

fn csv_feld(wert: &str) -> String {
    if wert.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", wert.replace('"', "\"\""))
    } else {
        wert.to_string()
    }
}
