//! QualityOracle ueber externe Pipeline und Bewerter
//!
//! Jeder Aufruf arbeitet in einem eigenen temporaeren Verzeichnis, das beim
//! Verlassen (Erfolg, Fehler, Abbruch, Panic) entfernt wird. Einziger
//! geteilter Zustand ist der Cache der dekodierten Referenzen, ein
//! nebenlaeufiger Map-Typ, dessen Eintraege nach dem Einfuegen unveraenderlich
//! sind.

use std::path::PathBuf;
use std::sync::Arc;

use adaptive_opus_core::{
    AudioSource, EncodingConfig, EvalError, QualityOracle, QualityScore, SourceId,
};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::pcm::{auf_rate_umrechnen, paar_vorbereiten, pcm_laden, PcmAudio};
use crate::pipeline::CodecPipeline;
use crate::scorer::QualityScorer;

/// Ziel-Abtastrate fuer Decode und Bewertung
pub const ZIEL_RATE_HZ: u32 = 16000;

/// Orakel aus Codec-Pipeline und Bewerter
pub struct PipelineOracle<P, S> {
    pipeline: P,
    scorer: S,
    /// Basisverzeichnis fuer Job-Verzeichnisse (None = System-Temp)
    arbeitsverzeichnis: Option<PathBuf>,
    ziel_rate: u32,
    referenzen: DashMap<SourceId, Arc<PcmAudio>>,
}

impl<P, S> PipelineOracle<P, S>
where
    P: CodecPipeline,
    S: QualityScorer,
{
    pub fn new(pipeline: P, scorer: S) -> Self {
        Self {
            pipeline,
            scorer,
            arbeitsverzeichnis: None,
            ziel_rate: ZIEL_RATE_HZ,
            referenzen: DashMap::new(),
        }
    }

    /// Legt Job-Verzeichnisse unter `pfad` statt im System-Temp an
    pub fn mit_arbeitsverzeichnis(mut self, pfad: impl Into<PathBuf>) -> Self {
        self.arbeitsverzeichnis = Some(pfad.into());
        self
    }

    pub fn mit_ziel_rate(mut self, rate: u32) -> Self {
        self.ziel_rate = rate;
        self
    }

    /// Anzahl zwischengespeicherter Referenzen
    pub fn referenzen_im_cache(&self) -> usize {
        self.referenzen.len()
    }

    fn referenz(&self, quelle: &AudioSource) -> Result<Arc<PcmAudio>, EvalError> {
        if let Some(pcm) = self.referenzen.get(&quelle.id) {
            return Ok(Arc::clone(pcm.value()));
        }
        // Zwei Worker koennen dieselbe Quelle parallel laden; der zweite
        // Eintrag ersetzt den ersten mit identischem Inhalt.
        let pcm = Arc::new(auf_rate_umrechnen(pcm_laden(&quelle.pfad)?, self.ziel_rate)?);
        self.referenzen.insert(quelle.id.clone(), Arc::clone(&pcm));
        Ok(pcm)
    }

    fn job_verzeichnis(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ao-job-");
        match &self.arbeitsverzeichnis {
            Some(basis) => {
                std::fs::create_dir_all(basis)?;
                builder.tempdir_in(basis)
            }
            None => builder.tempdir(),
        }
    }
}

impl<P, S> QualityOracle for PipelineOracle<P, S>
where
    P: CodecPipeline,
    S: QualityScorer,
{
    fn evaluate(
        &self,
        quelle: &AudioSource,
        config: &EncodingConfig,
        verlust_prozent: f64,
        abbruch: &CancellationToken,
    ) -> Result<QualityScore, EvalError> {
        let verzeichnis = self
            .job_verzeichnis()
            .map_err(|e| EvalError::Intern(format!("Job-Verzeichnis: {e}")))?;

        let strom = self
            .pipeline
            .encode(&quelle.pfad, config, verzeichnis.path(), abbruch)?;
        let degradiert_pfad = self.pipeline.decode(
            &strom,
            self.ziel_rate,
            verlust_prozent,
            verzeichnis.path(),
            abbruch,
        )?;

        let referenz = self.referenz(quelle)?;
        let degradiert = pcm_laden(&degradiert_pfad)?;
        let paar = paar_vorbereiten(&referenz, &degradiert, self.ziel_rate)?;

        let score = match self.scorer.score(&paar) {
            Ok(mos) => QualityScore::gemessen(mos),
            Err(e) => {
                debug!(
                    quelle = %quelle.id,
                    %config,
                    verlust_prozent,
                    fehler = %e,
                    "Bewertung gescheitert – Boden-Wert eingesetzt"
                );
                QualityScore::floor()
            }
        };
        trace!(quelle = %quelle.id, %config, verlust_prozent, mos = score.mos, "Job bewertet");
        Ok(score)
        // `verzeichnis` wird hier entfernt
    }
}
