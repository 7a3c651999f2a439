//! Wahrnehmungsnahe Qualitaetsbewertung
//!
//! `QualityScorer` ist die Schnittstelle zum eigentlichen Bewerter. Der
//! mitgelieferte `SegSnrScorer` bildet das segmentelle SNR zwischen Referenz
//! und degradiertem Signal linear auf die MOS-Skala ab. Er ersetzt keinen
//! PESQ-Bewerter, liefert aber vergleichbare, monotone Werte.

use std::ops::RangeInclusive;

use adaptive_opus_core::MOS_BEREICH;
use thiserror::Error;

use crate::pcm::ScoringPair;

/// Fehler eines Bewerters. Wird vom Orakel auf den Boden-Wert abgebildet.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoreError {
    #[error("Signal zu kurz: {samples} Samples, mindestens {minimum} noetig")]
    ZuKurz { samples: usize, minimum: usize },

    #[error("Referenz enthaelt keine aktiven Segmente")]
    KeineAktivitaet,

    #[error("Bewertung fehlgeschlagen: {0}")]
    Intern(String),
}

/// Bewertet ein vorbereitetes Paar (Referenz, degradiert)
pub trait QualityScorer: Send + Sync {
    fn score(&self, paar: &ScoringPair) -> Result<f64, ScoreError>;

    /// Wertebereich, den der Bewerter liefert
    fn bereich(&self) -> RangeInclusive<f64> {
        MOS_BEREICH
    }
}

/// Segmentelles SNR, abgebildet auf 1.0–4.5
#[derive(Debug, Clone)]
pub struct SegSnrScorer {
    /// Segmentlaenge in Millisekunden
    pub segment_ms: u32,
    /// Untere Klemmgrenze pro Segment in dB (entspricht MOS 1.0)
    pub min_db: f64,
    /// Obere Klemmgrenze pro Segment in dB (entspricht MOS 4.5)
    pub max_db: f64,
    /// Segmente mit weniger Referenzenergie (dBFS) gelten als Stille
    pub stille_dbfs: f64,
}

impl Default for SegSnrScorer {
    fn default() -> Self {
        Self {
            segment_ms: 20,
            min_db: -10.0,
            max_db: 35.0,
            stille_dbfs: -50.0,
        }
    }
}

impl SegSnrScorer {
    /// Mittleres, geklemmtes Segment-SNR in dB ueber alle aktiven Segmente
    pub fn segment_snr_db(&self, paar: &ScoringPair) -> Result<f64, ScoreError> {
        let segment = (paar.sample_rate as usize * self.segment_ms as usize / 1000).max(1);
        if paar.len() < segment {
            return Err(ScoreError::ZuKurz {
                samples: paar.len(),
                minimum: segment,
            });
        }

        let stille_energie = 10f64.powf(self.stille_dbfs / 10.0);
        let mut summe = 0.0;
        let mut aktive = 0usize;

        for (r, d) in paar
            .referenz
            .chunks_exact(segment)
            .zip(paar.degradiert.chunks_exact(segment))
        {
            let signal: f64 = r.iter().map(|&x| (x as f64).powi(2)).sum();
            if signal / (segment as f64) < stille_energie {
                continue;
            }
            let rauschen: f64 = r
                .iter()
                .zip(d)
                .map(|(&x, &y)| (x as f64 - y as f64).powi(2))
                .sum();
            let snr = if rauschen <= f64::EPSILON {
                self.max_db
            } else {
                10.0 * (signal / rauschen).log10()
            };
            summe += snr.clamp(self.min_db, self.max_db);
            aktive += 1;
        }

        if aktive == 0 {
            return Err(ScoreError::KeineAktivitaet);
        }
        Ok(summe / aktive as f64)
    }
}

impl QualityScorer for SegSnrScorer {
    fn score(&self, paar: &ScoringPair) -> Result<f64, ScoreError> {
        let snr = self.segment_snr_db(paar)?;
        let anteil = (snr - self.min_db) / (self.max_db - self.min_db);
        let (lo, hi) = (*MOS_BEREICH.start(), *MOS_BEREICH.end());
        let mos = lo + anteil * (hi - lo);
        if !mos.is_finite() {
            return Err(ScoreError::Intern(format!("nicht endlicher Wert: {mos}")));
        }
        Ok(mos.clamp(lo, hi))
    }
}
