//! Adaptive Opus – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und fuehrt den
//! gewaehlten Befehl aus. Ctrl-C bricht laufende Sweeps geordnet ab.

use std::process::ExitCode;

use adaptive_opus_cli::args::{Befehl, Cli};
use adaptive_opus_cli::config::AppConfig;
use adaptive_opus_cli::{
    configs_ausgeben, evaluate_ausfuehren, oracle_bauen, sweep_ausfuehren, sweep_exit_code,
    EXIT_ABBRUCH, EXIT_FEHLER, EXIT_OK,
};
use adaptive_opus_observability::logging_initialisieren;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let geladen = match AppConfig::laden(&cli.config) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(EXIT_FEHLER);
        }
    };

    if let Err(e) = logging_initialisieren(&geladen.config.logging.level, &geladen.config.logging.format) {
        eprintln!("{e:#}");
    }
    // Herkunft der Konfiguration erst jetzt, mit aktivem Subscriber
    geladen.melden();
    let mut config = geladen.config;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "Adaptive Opus wird gestartet"
    );

    let abbruch = CancellationToken::new();
    {
        let abbruch = abbruch.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Abbruch angefordert – laufende Jobs werden beendet");
                abbruch.cancel();
            }
        });
    }

    let code = match cli.befehl {
        Befehl::Sweep(args) => {
            args.anwenden(&mut config);
            let token = abbruch.clone();
            let lauf = tokio::task::spawn_blocking(move || {
                let oracle = oracle_bauen(&config);
                sweep_ausfuehren(&config, oracle, &token)
            })
            .await;
            match lauf {
                Ok(ergebnis) => {
                    if let Err(e) = &ergebnis {
                        error!(fehler = %format!("{e:#}"), "Sweep fehlgeschlagen");
                    }
                    sweep_exit_code(&ergebnis)
                }
                Err(e) => {
                    error!(fehler = %e, "Sweep-Task abgestuerzt");
                    EXIT_FEHLER
                }
            }
        }
        Befehl::Evaluate(args) => {
            let token = abbruch.clone();
            let lauf = tokio::task::spawn_blocking(move || {
                let oracle = oracle_bauen(&config);
                let stdout = std::io::stdout();
                let mut ausgabe = stdout.lock();
                evaluate_ausfuehren(&config, &args, &oracle, &token, &mut ausgabe)
            })
            .await;
            match lauf {
                Ok(Ok(_)) if abbruch.is_cancelled() => EXIT_ABBRUCH,
                Ok(Ok(_)) => EXIT_OK,
                Ok(Err(e)) => {
                    error!(fehler = %format!("{e:#}"), "Vergleich fehlgeschlagen");
                    EXIT_FEHLER
                }
                Err(e) => {
                    error!(fehler = %e, "Vergleichs-Task abgestuerzt");
                    EXIT_FEHLER
                }
            }
        }
        Befehl::Configs => match configs_ausgeben(&mut std::io::stdout().lock()) {
            Ok(()) => EXIT_OK,
            Err(e) => {
                error!(fehler = %e, "Ausgabe fehlgeschlagen");
                EXIT_FEHLER
            }
        },
    };

    ExitCode::from(code)
}
