//! Parameterraum der Encoder-Konfigurationen
//!
//! 6 Bitraten × 3 Frame-Groessen × 2 Komplexitaeten × 2 FEC-Stufen = 72.
//! Die Reihenfolge (Bitrate aussen, FEC innen) ist Teil des Vertrags:
//! der modellbasierte Controller loest Gleichstaende ueber sie auf.

use crate::types::{EncodingConfig, FrameSizeMs};

pub const BITRATES_KBPS: [u16; 6] = [8, 12, 16, 24, 32, 48];
pub const FRAME_SIZES: [FrameSizeMs; 3] = [FrameSizeMs::Ms20, FrameSizeMs::Ms40, FrameSizeMs::Ms60];
pub const COMPLEXITIES: [u8; 2] = [5, 9];
pub const FEC_OPTIONS: [bool; 2] = [false, true];

/// Anzahl der Konfigurationen im Raster
pub const GRID_SIZE: usize =
    BITRATES_KBPS.len() * FRAME_SIZES.len() * COMPLEXITIES.len() * FEC_OPTIONS.len();

/// Standard-Verluststufen eines Sweeps in Prozent
pub const SWEEP_LOSS_LEVELS: [f64; 7] = [0.0, 1.0, 2.0, 3.0, 5.0, 7.0, 10.0];

/// Der feste, endliche Raum aller Encoder-Konfigurationen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParameterSpace;

impl ParameterSpace {
    /// Erzeugt alle 72 Konfigurationen in fester Reihenfolge
    ///
    /// Wird bei jedem Aufruf neu erzeugt; keine Zwischenspeicherung.
    pub fn generate_all_configs(&self) -> Vec<EncodingConfig> {
        generate_all_configs()
    }

    /// True wenn die Konfiguration im Raster liegt
    pub fn enthaelt(&self, config: &EncodingConfig) -> bool {
        BITRATES_KBPS.contains(&config.bitrate_kbps)
            && FRAME_SIZES.contains(&config.frame_size)
            && COMPLEXITIES.contains(&config.complexity)
    }

    pub fn len(&self) -> usize {
        GRID_SIZE
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Erzeugt alle 72 Konfigurationen (Bitrate, Frame-Groesse, Komplexitaet, FEC)
pub fn generate_all_configs() -> Vec<EncodingConfig> {
    let mut configs = Vec::with_capacity(GRID_SIZE);
    for bitrate_kbps in BITRATES_KBPS {
        for frame_size in FRAME_SIZES {
            for complexity in COMPLEXITIES {
                for use_fec in FEC_OPTIONS {
                    configs.push(EncodingConfig {
                        bitrate_kbps,
                        frame_size,
                        complexity,
                        use_fec,
                    });
                }
            }
        }
    }
    configs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn genau_72_verschiedene_configs() {
        let configs = generate_all_configs();
        assert_eq!(configs.len(), 72);
        let eindeutig: HashSet<_> = configs.iter().collect();
        assert_eq!(eindeutig.len(), 72);
    }

    #[test]
    fn reihenfolge_stabil_ueber_aufrufe() {
        let space = ParameterSpace;
        assert_eq!(space.generate_all_configs(), space.generate_all_configs());
    }

    #[test]
    fn reihenfolge_bitrate_aussen_fec_innen() {
        let configs = generate_all_configs();
        assert_eq!(
            configs[0],
            EncodingConfig {
                bitrate_kbps: 8,
                frame_size: FrameSizeMs::Ms20,
                complexity: 5,
                use_fec: false
            }
        );
        assert!(configs[1].use_fec);
        assert_eq!(configs[2].complexity, 9);
        assert_eq!(configs[4].frame_size, FrameSizeMs::Ms40);
        assert_eq!(configs[12].bitrate_kbps, 12);
        assert_eq!(configs[71].bitrate_kbps, 48);
    }

    #[test]
    fn rasterreihenfolge_entspricht_ord() {
        let configs = generate_all_configs();
        let mut sortiert = configs.clone();
        sortiert.sort();
        assert_eq!(configs, sortiert);
    }

    #[test]
    fn alle_configs_sind_valide() {
        let space = ParameterSpace;
        for cfg in space.generate_all_configs() {
            assert!(space.enthaelt(&cfg));
            assert!(cfg.validieren().is_ok());
        }
    }
}
