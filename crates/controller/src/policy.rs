//! Controller-Policies – Auswahl einer Encoder-Konfiguration aus dem Paketverlust
//!
//! ## Varianten
//! - **Static**: ignoriert den Verlust, liefert immer die Basiskonfiguration
//! - **Heuristic**: Stufenfunktion des Verlusts ueber die Bitrate
//! - **ModelBased**: bewertet alle 72 Rasterpunkte mit dem Predictor, waehlt das Maximum
//! - **Hybrid**: unter der Schwelle ModelBased, ab der Schwelle Static
//!
//! Keine Variante haelt Zustand zwischen Aufrufen. Die gewaehlte
//! Konfiguration ist ein Wert und wird nie nachtraeglich veraendert.

use std::str::FromStr;

use adaptive_opus_core::{verlust_klemmen, EncodingConfig, FrameSizeMs, ParameterSpace};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ControllerError, ControllerResult};
use crate::predictor::Predictor;

/// Wert fuer einen Kandidaten, dessen Vorhersage fehlschlug
pub const SENTINEL_SCORE: f64 = 0.0;

/// Standard-Schwelle des Hybrid-Controllers in Prozent
pub const HYBRID_SCHWELLE_PROZENT: f64 = 5.0;

// ---------------------------------------------------------------------------
// ControllerKind
// ---------------------------------------------------------------------------

/// Geschlossene Menge der Controller-Typen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    Static,
    Heuristic,
    ModelBased,
    Hybrid,
}

impl ControllerKind {
    /// Alle Typen in Vergleichsreihenfolge
    pub const ALLE: [ControllerKind; 4] = [
        ControllerKind::Static,
        ControllerKind::Heuristic,
        ControllerKind::ModelBased,
        ControllerKind::Hybrid,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Heuristic => "heuristic",
            Self::ModelBased => "model_based",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControllerKind {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "heuristic" => Ok(Self::Heuristic),
            "model_based" | "model-based" | "ml_adaptive" => Ok(Self::ModelBased),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(ControllerError::UnbekannterTyp(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Entscheidung und Einstellungen
// ---------------------------------------------------------------------------

/// Ergebnis einer Auswahl. Wird nicht persistiert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerDecision {
    pub config: EncodingConfig,
    /// Geklemmter Verlust, fuer den entschieden wurde
    pub loss_perc: f64,
    /// Variante, die tatsaechlich entschieden hat (bei Hybrid die delegierte)
    pub entschieden_von: ControllerKind,
    /// True wenn ModelBased mangels Predictor auf die Basiskonfiguration auswich
    pub fallback: bool,
}

/// Parameter, die beim Aufbau eines Controllers festgelegt werden
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerEinstellungen {
    pub baseline: EncodingConfig,
    pub hybrid_schwelle: f64,
}

impl Default for ControllerEinstellungen {
    fn default() -> Self {
        Self {
            baseline: EncodingConfig::BASELINE,
            hybrid_schwelle: HYBRID_SCHWELLE_PROZENT,
        }
    }
}

impl ControllerEinstellungen {
    pub fn validieren(&self) -> ControllerResult<()> {
        self.baseline
            .validieren()
            .map_err(|e| ControllerError::Konfiguration(format!("Basiskonfiguration: {e}")))?;
        if !self.hybrid_schwelle.is_finite() || !(0.0..=100.0).contains(&self.hybrid_schwelle) {
            return Err(ControllerError::Konfiguration(format!(
                "Hybrid-Schwelle {} ausserhalb 0–100",
                self.hybrid_schwelle
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Feste Basiskonfiguration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticPolicy {
    pub baseline: EncodingConfig,
}

impl StaticPolicy {
    pub fn select(&self, _verlust_prozent: f64) -> EncodingConfig {
        self.baseline
    }
}

impl Default for StaticPolicy {
    fn default() -> Self {
        Self {
            baseline: EncodingConfig::BASELINE,
        }
    }
}

/// Stufenfunktion ueber die Bitrate, sonst 20 ms / Komplexitaet 5 / kein FEC
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeuristicPolicy;

impl HeuristicPolicy {
    /// Bitrate-Stufe; untere Grenzen geschlossen, obere offen
    pub fn bitrate_fuer_verlust(verlust_prozent: f64) -> u16 {
        let verlust = verlust_klemmen(verlust_prozent);
        if verlust < 2.0 {
            48
        } else if verlust < 5.0 {
            24
        } else if verlust < 10.0 {
            16
        } else {
            12
        }
    }

    pub fn select(&self, verlust_prozent: f64) -> EncodingConfig {
        EncodingConfig {
            bitrate_kbps: Self::bitrate_fuer_verlust(verlust_prozent),
            frame_size: FrameSizeMs::Ms20,
            complexity: 5,
            use_fec: false,
        }
    }
}

/// Argmax der Predictor-Vorhersage ueber das Raster
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelBasedPolicy {
    /// Ausweichziel, wenn kein Predictor verfuegbar ist oder alle Kandidaten scheitern
    pub fallback: StaticPolicy,
}

impl ModelBasedPolicy {
    /// Liefert die Konfiguration und ob auf die Basiskonfiguration ausgewichen wurde.
    ///
    /// Gleichstand entscheidet die Rasterreihenfolge (erster gewinnt).
    /// Scheitert die Vorhersage fuer einzelne Kandidaten, zaehlen diese mit
    /// `SENTINEL_SCORE` weiter im Vergleich mit.
    pub fn select(
        &self,
        verlust_prozent: f64,
        raum: &ParameterSpace,
        predictor: &dyn Predictor,
    ) -> (EncodingConfig, bool) {
        if !predictor.ist_verfuegbar() {
            debug!(verlust_prozent, "Kein Predictor – Basiskonfiguration");
            return (self.fallback.select(verlust_prozent), true);
        }

        let kandidaten = raum.generate_all_configs();
        let mut bester: Option<(EncodingConfig, f64)> = None;
        let mut fehlgeschlagen = 0usize;

        for config in &kandidaten {
            let score = match predictor.predict(&config.features(verlust_prozent)) {
                Ok(s) => s,
                Err(e) => {
                    fehlgeschlagen += 1;
                    debug!(%config, fehler = %e, "Vorhersage fehlgeschlagen – Sentinel");
                    SENTINEL_SCORE
                }
            };
            if bester.map_or(true, |(_, b)| score > b) {
                bester = Some((*config, score));
            }
        }

        if fehlgeschlagen == kandidaten.len() {
            warn!(
                verlust_prozent,
                kandidaten = kandidaten.len(),
                "Predictor scheiterte fuer alle Kandidaten – Basiskonfiguration"
            );
            return (self.fallback.select(verlust_prozent), true);
        }
        if fehlgeschlagen > 0 {
            warn!(
                verlust_prozent,
                fehlgeschlagen,
                kandidaten = kandidaten.len(),
                "Predictor scheiterte fuer einzelne Kandidaten"
            );
        }

        match bester {
            Some((config, _)) => (config, false),
            None => (self.fallback.select(verlust_prozent), true),
        }
    }
}

/// Verzweigt nach Verlust: darunter ModelBased, ab der Schwelle Static
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridPolicy {
    pub schwelle: f64,
    pub modell: ModelBasedPolicy,
    pub statisch: StaticPolicy,
}

impl Default for HybridPolicy {
    fn default() -> Self {
        Self {
            schwelle: HYBRID_SCHWELLE_PROZENT,
            modell: ModelBasedPolicy::default(),
            statisch: StaticPolicy::default(),
        }
    }
}

impl HybridPolicy {
    /// Variante, an die fuer diesen Verlust delegiert wird
    pub fn delegiert_an(&self, verlust_prozent: f64) -> ControllerKind {
        if verlust_klemmen(verlust_prozent) < self.schwelle {
            ControllerKind::ModelBased
        } else {
            ControllerKind::Static
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Einer der vier Controller, einmalig bei der Konfiguration festgelegt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Controller {
    Static(StaticPolicy),
    Heuristic(HeuristicPolicy),
    ModelBased(ModelBasedPolicy),
    Hybrid(HybridPolicy),
}

impl Controller {
    /// Baut den Controller fuer `kind` mit validierten Einstellungen
    pub fn neu(kind: ControllerKind, einstellungen: &ControllerEinstellungen) -> ControllerResult<Self> {
        einstellungen.validieren()?;
        let statisch = StaticPolicy {
            baseline: einstellungen.baseline,
        };
        let modell = ModelBasedPolicy { fallback: statisch };
        Ok(match kind {
            ControllerKind::Static => Self::Static(statisch),
            ControllerKind::Heuristic => Self::Heuristic(HeuristicPolicy),
            ControllerKind::ModelBased => Self::ModelBased(modell),
            ControllerKind::Hybrid => Self::Hybrid(HybridPolicy {
                schwelle: einstellungen.hybrid_schwelle,
                modell,
                statisch,
            }),
        })
    }

    /// Parst den Typ-Namen und baut den Controller
    pub fn aus_name(name: &str, einstellungen: &ControllerEinstellungen) -> ControllerResult<Self> {
        Self::neu(name.parse()?, einstellungen)
    }

    pub fn kind(&self) -> ControllerKind {
        match self {
            Self::Static(_) => ControllerKind::Static,
            Self::Heuristic(_) => ControllerKind::Heuristic,
            Self::ModelBased(_) => ControllerKind::ModelBased,
            Self::Hybrid(_) => ControllerKind::Hybrid,
        }
    }

    /// Waehlt eine Konfiguration fuer den (geklemmten) Verlust
    pub fn select(
        &self,
        verlust_prozent: f64,
        raum: &ParameterSpace,
        predictor: &dyn Predictor,
    ) -> ControllerDecision {
        let verlust = verlust_klemmen(verlust_prozent);
        let (config, entschieden_von, fallback) = match self {
            Self::Static(p) => (p.select(verlust), ControllerKind::Static, false),
            Self::Heuristic(p) => (p.select(verlust), ControllerKind::Heuristic, false),
            Self::ModelBased(p) => {
                let (config, fallback) = p.select(verlust, raum, predictor);
                (config, ControllerKind::ModelBased, fallback)
            }
            Self::Hybrid(p) => match p.delegiert_an(verlust) {
                ControllerKind::ModelBased => {
                    let (config, fallback) = p.modell.select(verlust, raum, predictor);
                    (config, ControllerKind::ModelBased, fallback)
                }
                _ => (p.statisch.select(verlust), ControllerKind::Static, false),
            },
        };
        debug!(
            controller = %self.kind(),
            %entschieden_von,
            verlust,
            %config,
            fallback,
            "Konfiguration gewaehlt"
        );
        ControllerDecision {
            config,
            loss_perc: verlust,
            entschieden_von,
            fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictorError;
    use crate::predictor::NullPredictor;
    use adaptive_opus_core::Features;

    /// Bevorzugt niedrige Bitrate und grosse Frames – klar verschieden von der Basis
    struct KleinBevorzugt;

    impl Predictor for KleinBevorzugt {
        fn predict(&self, f: &Features) -> Result<f64, PredictorError> {
            Ok(100.0 - f[0] + f[1] / 10.0)
        }
    }

    /// Gleicher Wert fuer alle Kandidaten
    struct Konstant(f64);

    impl Predictor for Konstant {
        fn predict(&self, _f: &Features) -> Result<f64, PredictorError> {
            Ok(self.0)
        }
    }

    /// Scheitert fuer FEC-Kandidaten, sonst negativ
    struct FecKaputt;

    impl Predictor for FecKaputt {
        fn predict(&self, f: &Features) -> Result<f64, PredictorError> {
            if f[2] > 0.5 {
                Err(PredictorError::Vorhersage("nan".into()))
            } else {
                Ok(-1.0 - f[0])
            }
        }
    }

    struct ImmerKaputt;

    impl Predictor for ImmerKaputt {
        fn predict(&self, _f: &Features) -> Result<f64, PredictorError> {
            Err(PredictorError::Vorhersage("defekt".into()))
        }
    }

    fn controller(kind: ControllerKind) -> Controller {
        Controller::neu(kind, &ControllerEinstellungen::default()).unwrap()
    }

    #[test]
    fn static_ignoriert_verlust() {
        let c = controller(ControllerKind::Static);
        for verlust in [0.0, 7.0, 50.0, 100.0] {
            let d = c.select(verlust, &ParameterSpace, &NullPredictor);
            assert_eq!(d.config, EncodingConfig::BASELINE);
            assert!(!d.fallback);
        }
        let d = c.select(7.0, &ParameterSpace, &NullPredictor);
        assert_eq!(d.config.bitrate_kbps, 32);
        assert_eq!(d.config.frame_size, FrameSizeMs::Ms20);
        assert_eq!(d.config.complexity, 5);
        assert!(!d.config.use_fec);
    }

    #[test]
    fn heuristik_stufen_und_grenzen() {
        let c = controller(ControllerKind::Heuristic);
        let faelle = [
            (1.9, 48),
            (2.0, 24),
            (4.999, 24),
            (5.0, 16),
            (9.999, 16),
            (10.0, 12),
        ];
        for (verlust, bitrate) in faelle {
            let d = c.select(verlust, &ParameterSpace, &NullPredictor);
            assert_eq!(d.config.bitrate_kbps, bitrate, "Verlust {verlust}");
            assert_eq!(d.config.frame_size, FrameSizeMs::Ms20);
            assert_eq!(d.config.complexity, 5);
            assert!(!d.config.use_fec);
        }
    }

    #[test]
    fn heuristik_klemmt_verlust() {
        assert_eq!(HeuristicPolicy::bitrate_fuer_verlust(-3.0), 48);
        assert_eq!(HeuristicPolicy::bitrate_fuer_verlust(f64::NAN), 48);
        assert_eq!(HeuristicPolicy::bitrate_fuer_verlust(250.0), 12);
        let d = controller(ControllerKind::Heuristic).select(250.0, &ParameterSpace, &NullPredictor);
        assert_eq!(d.loss_perc, 100.0);
    }

    #[test]
    fn hybrid_grenze_bei_fuenf_prozent() {
        let c = controller(ControllerKind::Hybrid);

        let unten = c.select(4.999, &ParameterSpace, &KleinBevorzugt);
        assert_eq!(unten.entschieden_von, ControllerKind::ModelBased);
        assert_eq!(unten.config.bitrate_kbps, 8);
        assert_eq!(unten.config.frame_size, FrameSizeMs::Ms60);

        let grenze = c.select(5.0, &ParameterSpace, &KleinBevorzugt);
        assert_eq!(grenze.entschieden_von, ControllerKind::Static);
        assert_eq!(grenze.config, EncodingConfig::BASELINE);
    }

    #[test]
    fn model_based_gleichstand_erster_gewinnt() {
        let c = controller(ControllerKind::ModelBased);
        let d = c.select(3.0, &ParameterSpace, &Konstant(2.5));
        assert_eq!(d.config, ParameterSpace.generate_all_configs()[0]);
        assert!(!d.fallback);
    }

    #[test]
    fn model_based_gleichstand_zweier_kandidaten() {
        // Nur zwei Kandidaten mit Hoechstwert, der fruehere im Raster gewinnt
        struct ZweiGleich;
        impl Predictor for ZweiGleich {
            fn predict(&self, f: &Features) -> Result<f64, PredictorError> {
                let oben = f[0] == 24.0 && f[1] == 40.0;
                Ok(if oben { 4.0 } else { 1.0 })
            }
        }
        let d = controller(ControllerKind::ModelBased).select(0.0, &ParameterSpace, &ZweiGleich);
        // Kandidaten 24/40/c5/nofec, 24/40/c5/fec, 24/40/c9/... – erster ist nofec, c5
        assert_eq!(d.config.bitrate_kbps, 24);
        assert_eq!(d.config.frame_size, FrameSizeMs::Ms40);
        assert_eq!(d.config.complexity, 5);
        assert!(!d.config.use_fec);
    }

    #[test]
    fn model_based_sentinel_bei_einzelfehlern() {
        // Alle erfolgreichen Vorhersagen sind negativ, Sentinel 0.0 gewinnt
        let d = controller(ControllerKind::ModelBased).select(1.0, &ParameterSpace, &FecKaputt);
        assert!(d.config.use_fec);
        assert_eq!(d.config, ParameterSpace.generate_all_configs()[1]);
        assert!(!d.fallback);
    }

    #[test]
    fn model_based_ohne_predictor_faellt_zurueck() {
        let c = controller(ControllerKind::ModelBased);
        let d = c.select(3.0, &ParameterSpace, &NullPredictor);
        assert_eq!(d.config, EncodingConfig::BASELINE);
        assert!(d.fallback);

        let d = c.select(3.0, &ParameterSpace, &ImmerKaputt);
        assert_eq!(d.config, EncodingConfig::BASELINE);
        assert!(d.fallback);
    }

    #[test]
    fn controller_typ_parsen() {
        assert_eq!("static".parse::<ControllerKind>().unwrap(), ControllerKind::Static);
        assert_eq!(" Hybrid ".parse::<ControllerKind>().unwrap(), ControllerKind::Hybrid);
        assert_eq!("ml_adaptive".parse::<ControllerKind>().unwrap(), ControllerKind::ModelBased);
        assert_eq!(
            "adaptiv".parse::<ControllerKind>(),
            Err(ControllerError::UnbekannterTyp("adaptiv".into()))
        );
        for kind in ControllerKind::ALLE {
            assert_eq!(kind.to_string().parse::<ControllerKind>().unwrap(), kind);
        }
    }

    #[test]
    fn ungueltige_baseline_wird_abgelehnt() {
        let einstellungen = ControllerEinstellungen {
            baseline: EncodingConfig {
                bitrate_kbps: 64,
                ..EncodingConfig::BASELINE
            },
            ..Default::default()
        };
        assert!(matches!(
            Controller::neu(ControllerKind::Static, &einstellungen),
            Err(ControllerError::Konfiguration(_))
        ));
    }
}
