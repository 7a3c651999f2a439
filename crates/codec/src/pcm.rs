//! PCM-Laden und Vorbereitung von Bewertungspaaren
//!
//! Quellen (FLAC/WAV) und degradierte Ausgaben werden ueber symphonia
//! dekodiert. Mehrkanalige Eingaben werden auf den ersten Kanal reduziert.
//! Referenzen in anderer Abtastrate werden vor der Bewertung per
//! Sinc-Interpolation auf die Zielrate umgerechnet.

use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{CodecError, CodecResult};

// ---- Resampling ----

const RESAMPLE_CHUNK_FRAMES: usize = 1024;
const RESAMPLE_SINC_LEN: usize = 256;
const RESAMPLE_CUTOFF: f32 = 0.95;
const RESAMPLE_OVERSAMPLING_FACTOR: usize = 128;

/// Mono-PCM mit Abtastrate, Samples normalisiert auf -1.0..1.0
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl PcmAudio {
    /// Dauer in Sekunden
    pub fn dauer_s(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Referenz und degradiertes Signal gleicher Laenge und Abtastrate
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPair {
    pub sample_rate: u32,
    pub referenz: Vec<f32>,
    pub degradiert: Vec<f32>,
}

impl ScoringPair {
    pub fn len(&self) -> usize {
        self.referenz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.referenz.is_empty()
    }
}

/// Bereitet ein Bewertungspaar vor.
///
/// Beide Signale muessen `erwartete_rate` haben; eine Abweichung ist ein
/// harter Fehler und wird nicht stillschweigend umgerechnet. Das laengere
/// Signal wird auf die Laenge des kuerzeren gekuerzt.
pub fn paar_vorbereiten(
    referenz: &PcmAudio,
    degradiert: &PcmAudio,
    erwartete_rate: u32,
) -> CodecResult<ScoringPair> {
    if referenz.sample_rate != erwartete_rate || degradiert.sample_rate != erwartete_rate {
        return Err(CodecError::SampleRateMismatch {
            erwartet: erwartete_rate,
            referenz: referenz.sample_rate,
            degradiert: degradiert.sample_rate,
        });
    }
    let len = referenz.samples.len().min(degradiert.samples.len());
    Ok(ScoringPair {
        sample_rate: erwartete_rate,
        referenz: referenz.samples[..len].to_vec(),
        degradiert: degradiert.samples[..len].to_vec(),
    })
}

/// Dekodiert eine Audio-Datei vollstaendig zu Mono-PCM (erster Kanal)
pub fn pcm_laden(pfad: &Path) -> CodecResult<PcmAudio> {
    let datei = File::open(pfad)
        .map_err(|e| CodecError::AudioLesen(format!("{}: {e}", pfad.display())))?;

    let mut hint = Hint::new();
    if let Some(ext) = pfad.extension().and_then(|e| e.to_str()) {
        hint.with_extension(&ext.to_ascii_lowercase());
    }

    let mss = MediaSourceStream::new(Box::new(datei), MediaSourceStreamOptions::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| lesefehler(pfad, &format!("Format nicht erkannt: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| lesefehler(pfad, "keine Audiospur"))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| lesefehler(pfad, "Abtastrate fehlt"))?;
    let kanaele = params.channels.map(|c| c.count()).unwrap_or(0);
    if kanaele == 0 {
        return Err(lesefehler(pfad, "Kanalanzahl fehlt"));
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| lesefehler(pfad, &format!("Decoder nicht erstellbar: {e}")))?;

    let mut samples = Vec::new();
    let mut puffer: Option<SampleBuffer<f32>> = None;

    loop {
        let paket = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(lesefehler(pfad, &format!("Paket nicht lesbar: {e}"))),
        };
        if paket.track_id() != track_id {
            continue;
        }

        match decoder.decode(&paket) {
            Ok(audio) => {
                let spec = SignalSpec::new(audio.spec().rate, audio.spec().channels);
                let kapazitaet = audio.capacity();
                if puffer.as_ref().map_or(true, |p| p.capacity() < kapazitaet) {
                    puffer = Some(SampleBuffer::<f32>::new(kapazitaet as u64, spec));
                }
                if let Some(p) = puffer.as_mut() {
                    p.copy_interleaved_ref(audio);
                    samples.extend(p.samples().iter().step_by(kanaele).copied());
                }
            }
            // Einzelne defekte Pakete ueberspringen
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(lesefehler(pfad, &format!("Dekodierung fehlgeschlagen: {e}"))),
        }
    }

    Ok(PcmAudio {
        sample_rate,
        samples,
    })
}

/// Rechnet Mono-PCM auf `ziel_rate` um. Gleiche Rate gibt die Eingabe zurueck.
///
/// Die Ausgabe ist um die Filterverzoegerung bereinigt und hat
/// `round(len * ziel_rate / sample_rate)` Samples.
pub fn auf_rate_umrechnen(pcm: PcmAudio, ziel_rate: u32) -> CodecResult<PcmAudio> {
    if pcm.sample_rate == ziel_rate {
        return Ok(pcm);
    }
    if pcm.sample_rate == 0 || ziel_rate == 0 {
        return Err(CodecError::Resampling(format!(
            "ungueltige Raten {} -> {ziel_rate}",
            pcm.sample_rate
        )));
    }
    let verhaeltnis = ziel_rate as f64 / pcm.sample_rate as f64;
    let erwartet = (pcm.samples.len() as f64 * verhaeltnis).round() as usize;
    if pcm.samples.is_empty() {
        return Ok(PcmAudio {
            sample_rate: ziel_rate,
            samples: Vec::new(),
        });
    }

    let params = SincInterpolationParameters {
        sinc_len: RESAMPLE_SINC_LEN,
        f_cutoff: RESAMPLE_CUTOFF,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: RESAMPLE_OVERSAMPLING_FACTOR,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(verhaeltnis, 1.0, params, RESAMPLE_CHUNK_FRAMES, 1)
            .map_err(|e| CodecError::Resampling(e.to_string()))?;
    let verzoegerung = resampler.output_delay();

    let eingabe = &pcm.samples;
    let mut ausgabe = Vec::with_capacity(erwartet + verzoegerung + RESAMPLE_CHUNK_FRAMES);
    let mut pos = 0;
    while pos + resampler.input_frames_next() <= eingabe.len() {
        let ende = pos + resampler.input_frames_next();
        let kanal: [&[f32]; 1] = [&eingabe[pos..ende]];
        let block = resampler
            .process(&kanal[..], None)
            .map_err(|e| CodecError::Resampling(e.to_string()))?;
        ausgabe.extend_from_slice(&block[0]);
        pos = ende;
    }
    if pos < eingabe.len() {
        let rest: [&[f32]; 1] = [&eingabe[pos..]];
        let block = resampler
            .process_partial(Some(&rest[..]), None)
            .map_err(|e| CodecError::Resampling(e.to_string()))?;
        ausgabe.extend_from_slice(&block[0]);
    }
    // Filterverzoegerung ausspuelen
    while ausgabe.len() < erwartet + verzoegerung {
        let block = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| CodecError::Resampling(e.to_string()))?;
        if block[0].is_empty() {
            break;
        }
        ausgabe.extend_from_slice(&block[0]);
    }

    ausgabe.drain(..verzoegerung.min(ausgabe.len()));
    ausgabe.truncate(erwartet);
    Ok(PcmAudio {
        sample_rate: ziel_rate,
        samples: ausgabe,
    })
}

fn lesefehler(pfad: &Path, grund: &str) -> CodecError {
    CodecError::AudioLesen(format!("{}: {grund}", pfad.display()))
}
