use serde::{Deserialize, Serialize};

use crate::data::levels::DEFAULT_LEVEL_PRECISION;

/// Branching fractions below this are not considered significant.
pub const MIN_SIGNIFICANT_BF: f64 = 0.01;

/// Settings threaded through pairing, scaling and aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Tolerance (cm⁻¹) for grouping levels and matching wavenumbers.
    pub level_precision: f64,
    /// Divide line S/N by the fit residual before estimating errors.
    pub correct_snr: bool,
    /// Threshold used when reporting missing significant branches.
    pub min_significant_bf: f64,
    /// Whether freshly matched lines start out selected.
    pub select_matched: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            level_precision: DEFAULT_LEVEL_PRECISION,
            correct_snr: false,
            min_significant_bf: MIN_SIGNIFICANT_BF,
            select_matched: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: AnalysisConfig = serde_json::from_str(r#"{ "correct_snr": true }"#).unwrap();
        assert!(cfg.correct_snr);
        assert_eq!(cfg.level_precision, DEFAULT_LEVEL_PRECISION);
        assert!(cfg.select_matched);
    }
}
