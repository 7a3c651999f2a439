//! Kommandozeilen-Argumente

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "adaptive-opus")]
#[command(version, about = "Adaptive Opus – Controller-Vergleich und Parameter-Sweeps unter Paketverlust")]
pub struct Cli {
    /// Pfad der TOML-Konfiguration
    #[arg(long, env = "AO_CONFIG", default_value = "adaptive-opus.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub befehl: Befehl,
}

#[derive(Debug, Subcommand)]
pub enum Befehl {
    /// Bewertet Quellen × 72 Konfigurationen × Verluststufen und schreibt den Datensatz
    Sweep(SweepArgs),
    /// Vergleicht Controller auf einer Quelle
    Evaluate(EvaluateArgs),
    /// Gibt das Konfigurationsraster in Erzeugungsreihenfolge aus
    Configs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct SweepArgs {
    /// Verzeichnis mit Quelldateien
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Maximale Anzahl Quelldateien (0 = unbegrenzt)
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Ausgabepfad des Datensatzes (CSV)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Anzahl Worker (0 = Parallelitaet des Hosts)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Metrik-Export im Prometheus-Textformat
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

impl SweepArgs {
    /// Ueberschreibt Konfigurationswerte mit gesetzten Argumenten
    pub fn anwenden(&self, config: &mut AppConfig) {
        if let Some(d) = &self.input_dir {
            config.sweep.input_dir = d.clone();
        }
        if let Some(n) = self.max_files {
            config.sweep.max_files = n;
        }
        if let Some(p) = &self.output {
            config.sweep.output = p.clone();
        }
        if let Some(n) = self.workers {
            config.sweep.workers = n;
        }
        if let Some(p) = &self.metrics_file {
            config.sweep.metrics_file = Some(p.clone());
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct EvaluateArgs {
    /// Quelldatei (FLAC/WAV)
    #[arg(long)]
    pub input: PathBuf,

    /// Verlust in Prozent, mehrfach angebbar (Standard: Sweep-Verluststufen)
    #[arg(long = "loss")]
    pub verluste: Vec<f64>,

    /// Controller-Typ, mehrfach angebbar (Standard: alle vier)
    #[arg(long = "controller")]
    pub controller: Vec<String>,

    /// Predictor-Artefakt, ueberschreibt `[controller] model_path`
    #[arg(long)]
    pub model: Option<PathBuf>,
}
