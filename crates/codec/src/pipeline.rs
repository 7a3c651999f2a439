//! Externe Encode/Decode-Pipeline ueber opus-tools
//!
//! `opusenc` kodiert die saubere Quelle, `opusdec` dekodiert auf 16 kHz und
//! simuliert dabei zufaelligen Paketverlust. Beide Aufrufe laufen als
//! Kindprozess mit Zeitlimit; ein Abbruch beendet den Kindprozess sofort.
//! Zwischendateien liegen im vom Aufrufer verwalteten Arbeitsverzeichnis.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use adaptive_opus_core::{EncodingConfig, Schritt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CodecError, CodecResult};

/// Abfrageintervall fuer laufende Kindprozesse
const POLL_INTERVALL: Duration = Duration::from_millis(10);

/// Maximale Laenge der stderr-Ausgabe in Fehlermeldungen
const STDERR_MAX: usize = 2000;

/// Kodierter Zwischenstrom (Opus-Datei im Arbeitsverzeichnis)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateStream {
    pub pfad: PathBuf,
}

/// Externe Codec-Pipeline
///
/// Implementierungen duerfen keinen Zustand zwischen Aufrufen teilen;
/// alle Dateien entstehen unter `arbeitsverzeichnis`.
pub trait CodecPipeline: Send + Sync {
    /// Kodiert `eingabe` mit den Parametern aus `config`
    fn encode(
        &self,
        eingabe: &Path,
        config: &EncodingConfig,
        arbeitsverzeichnis: &Path,
        abbruch: &CancellationToken,
    ) -> CodecResult<IntermediateStream>;

    /// Dekodiert den Strom auf `ziel_rate` Hz und simuliert `verlust_prozent` Paketverlust
    fn decode(
        &self,
        strom: &IntermediateStream,
        ziel_rate: u32,
        verlust_prozent: f64,
        arbeitsverzeichnis: &Path,
        abbruch: &CancellationToken,
    ) -> CodecResult<PathBuf>;
}

/// Konfiguration der opus-tools-Pipeline
#[derive(Debug, Clone)]
pub struct OpusToolsConfig {
    /// Pfad oder Name von `opusenc`
    pub opusenc: PathBuf,
    /// Pfad oder Name von `opusdec`
    pub opusdec: PathBuf,
    /// Zeitlimit pro externem Aufruf
    pub zeitlimit: Duration,
    /// Wert fuer `--expect-loss` wenn FEC aktiv ist
    pub fec_erwarteter_verlust: u8,
}

impl Default for OpusToolsConfig {
    fn default() -> Self {
        Self {
            opusenc: PathBuf::from("opusenc"),
            opusdec: PathBuf::from("opusdec"),
            zeitlimit: Duration::from_secs(120),
            fec_erwarteter_verlust: 5,
        }
    }
}

/// Pipeline ueber die Kommandozeilen-Werkzeuge `opusenc`/`opusdec`
#[derive(Debug, Clone, Default)]
pub struct OpusToolsPipeline {
    config: OpusToolsConfig,
}

impl OpusToolsPipeline {
    pub fn new(config: OpusToolsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OpusToolsConfig {
        &self.config
    }

    /// Argumente fuer `opusenc`
    pub fn encode_argumente(&self, config: &EncodingConfig, eingabe: &Path, ausgabe: &Path) -> Vec<String> {
        let mut args = vec![
            "--quiet".to_string(),
            "--bitrate".to_string(),
            config.bitrate_kbps.to_string(),
            "--framesize".to_string(),
            config.frame_size.as_ms().to_string(),
            "--comp".to_string(),
            config.complexity.to_string(),
        ];
        if config.use_fec {
            args.push("--expect-loss".to_string());
            args.push(self.config.fec_erwarteter_verlust.to_string());
        }
        args.push(eingabe.to_string_lossy().into_owned());
        args.push(ausgabe.to_string_lossy().into_owned());
        args
    }

    /// Argumente fuer `opusdec`
    pub fn decode_argumente(
        &self,
        ziel_rate: u32,
        verlust_prozent: f64,
        eingabe: &Path,
        ausgabe: &Path,
    ) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--rate".to_string(),
            ziel_rate.to_string(),
            "--packet-loss".to_string(),
            verlust_prozent.to_string(),
            eingabe.to_string_lossy().into_owned(),
            ausgabe.to_string_lossy().into_owned(),
        ]
    }
}

impl CodecPipeline for OpusToolsPipeline {
    fn encode(
        &self,
        eingabe: &Path,
        config: &EncodingConfig,
        arbeitsverzeichnis: &Path,
        abbruch: &CancellationToken,
    ) -> CodecResult<IntermediateStream> {
        let ausgabe = arbeitsverzeichnis.join("kodiert.opus");
        let args = self.encode_argumente(config, eingabe, &ausgabe);
        prozess_ausfuehren(
            Schritt::Encode,
            &self.config.opusenc,
            &args,
            &arbeitsverzeichnis.join("encode.log"),
            self.config.zeitlimit,
            abbruch,
        )?;
        Ok(IntermediateStream { pfad: ausgabe })
    }

    fn decode(
        &self,
        strom: &IntermediateStream,
        ziel_rate: u32,
        verlust_prozent: f64,
        arbeitsverzeichnis: &Path,
        abbruch: &CancellationToken,
    ) -> CodecResult<PathBuf> {
        let ausgabe = arbeitsverzeichnis.join("degradiert.wav");
        let args = self.decode_argumente(ziel_rate, verlust_prozent, &strom.pfad, &ausgabe);
        let ergebnis = prozess_ausfuehren(
            Schritt::Decode,
            &self.config.opusdec,
            &args,
            &arbeitsverzeichnis.join("decode.log"),
            self.config.zeitlimit,
            abbruch,
        );
        // Zwischenstrom wird nach dem Decode nicht mehr gebraucht
        if let Err(e) = std::fs::remove_file(&strom.pfad) {
            debug!(pfad = %strom.pfad.display(), fehler = %e, "Zwischenstrom nicht entfernt");
        }
        ergebnis?;
        Ok(ausgabe)
    }
}

/// Startet einen Kindprozess und wartet mit Zeitlimit und Abbruch auf ihn.
///
/// stderr geht in eine Logdatei statt in eine Pipe, damit ein gespraechiger
/// Prozess nicht an einem vollen Pipe-Puffer haengen bleibt.
fn prozess_ausfuehren(
    schritt: Schritt,
    programm: &Path,
    args: &[String],
    log_pfad: &Path,
    zeitlimit: Duration,
    abbruch: &CancellationToken,
) -> CodecResult<()> {
    if abbruch.is_cancelled() {
        return Err(CodecError::Abgebrochen(schritt));
    }

    let log = File::create(log_pfad)?;
    let mut kind = Command::new(programm)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log))
        .spawn()
        .map_err(|e| CodecError::Start {
            schritt,
            programm: programm.to_string_lossy().into_owned(),
            grund: e.to_string(),
        })?;

    let start = Instant::now();
    let status = loop {
        if let Some(status) = kind.try_wait()? {
            break status;
        }
        if abbruch.is_cancelled() {
            beenden(&mut kind, schritt);
            return Err(CodecError::Abgebrochen(schritt));
        }
        if start.elapsed() >= zeitlimit {
            warn!(
                %schritt,
                programm = %programm.display(),
                zeitlimit_s = zeitlimit.as_secs_f64(),
                "Externer Prozess ueberschreitet Zeitlimit – wird beendet"
            );
            beenden(&mut kind, schritt);
            return Err(CodecError::Zeitlimit { schritt, zeitlimit });
        }
        std::thread::sleep(POLL_INTERVALL);
    };

    if status.success() {
        return Ok(());
    }

    let mut stderr = std::fs::read_to_string(log_pfad).unwrap_or_default();
    if stderr.len() > STDERR_MAX {
        let mut ende = STDERR_MAX;
        while !stderr.is_char_boundary(ende) {
            ende -= 1;
        }
        stderr.truncate(ende);
    }
    Err(CodecError::ExitStatus {
        schritt,
        status: status.to_string(),
        stderr: stderr.trim().to_string(),
    })
}

fn beenden(kind: &mut std::process::Child, schritt: Schritt) {
    if let Err(e) = kind.kill() {
        debug!(%schritt, fehler = %e, "Kindprozess bereits beendet");
    }
    // Zombie vermeiden
    let _ = kind.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_opus_core::FrameSizeMs;

    fn pipeline() -> OpusToolsPipeline {
        OpusToolsPipeline::default()
    }

    #[test]
    fn encode_argumente_ohne_fec() {
        let cfg = EncodingConfig::BASELINE;
        let args = pipeline().encode_argumente(&cfg, Path::new("in.flac"), Path::new("out.opus"));
        assert_eq!(
            args,
            vec!["--quiet", "--bitrate", "32", "--framesize", "20", "--comp", "5", "in.flac", "out.opus"]
        );
    }

    #[test]
    fn encode_argumente_mit_fec() {
        let cfg = EncodingConfig::neu(16, FrameSizeMs::Ms40, 9, true).unwrap();
        let args = pipeline().encode_argumente(&cfg, Path::new("a"), Path::new("b"));
        let pos = args.iter().position(|a| a == "--expect-loss").unwrap();
        assert_eq!(args[pos + 1], "5");
    }

    #[test]
    fn decode_argumente_rate_und_verlust() {
        let args = pipeline().decode_argumente(16000, 7.0, Path::new("x.opus"), Path::new("y.wav"));
        assert_eq!(
            args,
            vec!["--quiet", "--rate", "16000", "--packet-loss", "7", "x.opus", "y.wav"]
        );
    }

    #[test]
    fn fehlendes_programm_ist_startfehler() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = OpusToolsPipeline::new(OpusToolsConfig {
            opusenc: PathBuf::from("/nicht/vorhanden/opusenc"),
            ..Default::default()
        });
        let err = pipeline
            .encode(
                Path::new("in.flac"),
                &EncodingConfig::BASELINE,
                dir.path(),
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CodecError::Start { schritt: Schritt::Encode, .. }));
    }

    #[test]
    fn abbruch_vor_start() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = pipeline()
            .encode(Path::new("in.flac"), &EncodingConfig::BASELINE, dir.path(), &token)
            .unwrap_err();
        assert!(matches!(err, CodecError::Abgebrochen(Schritt::Encode)));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn skript(dir: &Path, name: &str, inhalt: &str) -> PathBuf {
            let pfad = dir.join(name);
            std::fs::write(&pfad, format!("#!/bin/sh\n{inhalt}\n")).unwrap();
            std::fs::set_permissions(&pfad, std::fs::Permissions::from_mode(0o755)).unwrap();
            pfad
        }

        #[test]
        fn exit_status_fehler_enthaelt_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let opusenc = skript(dir.path(), "opusenc", "echo 'ungueltige eingabe' >&2; exit 3");
            let pipeline = OpusToolsPipeline::new(OpusToolsConfig {
                opusenc,
                ..Default::default()
            });
            let err = pipeline
                .encode(
                    Path::new("in.flac"),
                    &EncodingConfig::BASELINE,
                    dir.path(),
                    &CancellationToken::new(),
                )
                .unwrap_err();
            match err {
                CodecError::ExitStatus { schritt, stderr, .. } => {
                    assert_eq!(schritt, Schritt::Encode);
                    assert!(stderr.contains("ungueltige eingabe"));
                }
                andere => panic!("Falscher Fehler: {andere:?}"),
            }
        }

        #[test]
        fn haengender_prozess_laeuft_in_zeitlimit() {
            let dir = tempfile::tempdir().unwrap();
            let opusenc = skript(dir.path(), "opusenc", "exec sleep 30");
            let pipeline = OpusToolsPipeline::new(OpusToolsConfig {
                opusenc,
                zeitlimit: Duration::from_millis(200),
                ..Default::default()
            });
            let start = Instant::now();
            let err = pipeline
                .encode(
                    Path::new("in.flac"),
                    &EncodingConfig::BASELINE,
                    dir.path(),
                    &CancellationToken::new(),
                )
                .unwrap_err();
            assert!(matches!(err, CodecError::Zeitlimit { .. }));
            assert!(start.elapsed() < Duration::from_secs(10));
        }

        #[test]
        fn decode_entfernt_zwischenstrom_auch_bei_fehler() {
            let dir = tempfile::tempdir().unwrap();
            let opusdec = skript(dir.path(), "opusdec", "exit 1");
            let strom_pfad = dir.path().join("kodiert.opus");
            std::fs::write(&strom_pfad, b"opus").unwrap();
            let pipeline = OpusToolsPipeline::new(OpusToolsConfig {
                opusdec,
                ..Default::default()
            });
            let err = pipeline
                .decode(
                    &IntermediateStream { pfad: strom_pfad.clone() },
                    16000,
                    5.0,
                    dir.path(),
                    &CancellationToken::new(),
                )
                .unwrap_err();
            assert!(matches!(err, CodecError::ExitStatus { schritt: Schritt::Decode, .. }));
            assert!(!strom_pfad.exists());
        }
    }
}
