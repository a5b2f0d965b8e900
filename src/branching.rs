//! Branching fractions, transition probabilities and log(gf) for one upper
//! level.
//!
//! Every surviving transition takes its intensity from the first spectrum
//! (reference first) where its line is matched, enabled and selected. The
//! intensity is response corrected and put on the reference scale; the
//! branching fractions are then normalised to the theoretical fraction of the
//! level that was actually observed.

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::data::model::{FittedLine, Spectrum, SpectrumId, TargetTransition, UpperLevel};
use crate::pairing::{LevelPairing, SpectrumPairs};
use crate::scaling::{ScalingFactor, ScalingTable};

/// gf = GF_CONST · (2J+1) · λ²[nm] · A
const GF_CONST: f64 = 1.499e-14;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One contributing line of a level. All errors are in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchingFractionRow {
    /// Index into the level's transitions.
    pub transition: usize,
    pub spectrum: SpectrumId,
    pub spectrum_label: String,
    /// Running number of the fitted line.
    pub line: i64,
    pub wavenumber: f64,
    /// Wavelength (nm) used for gf.
    pub wavelength: f64,
    pub lower_energy: f64,
    pub lower_j: f64,
    pub lower_config: String,
    /// Response corrected intensity on the reference scale.
    pub intensity: f64,
    pub signal_error: f64,
    pub calibration_error: f64,
    pub transfer_error: f64,
    pub total_error: f64,
    /// Absolute intensity uncertainty.
    pub intensity_error: f64,
    pub br_frac_theory: f64,
    pub br_frac: f64,
    pub br_frac_error: f64,
    pub tr_prob: Option<f64>,
    pub tr_prob_error: Option<f64>,
    pub log_gf: Option<f64>,
    /// Uncertainty of log(gf) in dex.
    pub log_gf_error: Option<f64>,
    pub calibrated: bool,
    pub linked_to_reference: bool,
}

/// Level totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LevelSummary {
    pub lines_used: usize,
    pub total_intensity: f64,
    pub total_intensity_error: f64,
    /// Sum of theoretical branching fractions of the contributing lines.
    pub fraction_found: f64,
    /// Total transition probability (s⁻¹) of the observed branches.
    pub tr_prob_total: Option<f64>,
    /// Share of the decay rate not accounted for, in percent.
    pub missing_percent: Option<f64>,
}

/// Every matched, visible observation of a level, whether it contributes or
/// not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedLine {
    pub transition: usize,
    pub spectrum: SpectrumId,
    pub spectrum_label: String,
    pub line: i64,
    pub wavenumber: f64,
    pub eq_width: f64,
    pub snr: f64,
    /// Scaled intensity; `None` when the line lies outside the calibration.
    pub intensity: Option<f64>,
    pub selected: bool,
    pub disabled: bool,
    pub linked_to_reference: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelResult {
    pub level: usize,
    pub name: String,
    pub energy: f64,
    pub rows: Vec<BranchingFractionRow>,
    pub summary: LevelSummary,
    pub observed: Vec<ObservedLine>,
}

impl LevelResult {
    pub fn row(&self, transition: usize) -> Option<&BranchingFractionRow> {
        self.rows.iter().find(|r| r.transition == transition)
    }
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// A spectrum column together with its transfer factor from the reference.
struct ScaledColumn<'a> {
    spectrum: &'a Spectrum,
    pairs: &'a SpectrumPairs,
    factor: ScalingFactor,
    linked: bool,
}

impl ScaledColumn<'_> {
    /// Intensity of `line` on the reference scale and the response used.
    fn scaled_intensity(&self, line: &FittedLine) -> Option<(f64, f64)> {
        let response = self.spectrum.response(line.wavenumber);
        if response > 0.0 {
            Some((line.eq_width / response * self.factor.ratio, response))
        } else {
            None
        }
    }
}

fn scaled_columns<'a>(
    pairing: &'a LevelPairing,
    spectra: &'a [Spectrum],
    scaling: &ScalingTable,
    reference: SpectrumId,
) -> Vec<ScaledColumn<'a>> {
    pairing
        .ordered_columns(reference)
        .into_iter()
        .filter_map(|pairs| {
            let spectrum = spectra.iter().find(|s| s.id == pairs.spectrum)?;
            let (factor, linked) = scaling.resolve_or_identity(reference, spectrum.id);
            Some(ScaledColumn {
                spectrum,
                pairs,
                factor,
                linked,
            })
        })
        .collect()
}

/// Oscillator-strength factor gf/A for a transition, with J from the higher
/// tabulated level.
fn gf_factor(transition: &TargetTransition, wavelength: f64) -> f64 {
    GF_CONST * (2.0 * transition.upper_j() + 1.0) * wavelength.powi(2)
}

/// Compute the branching-fraction table of one level.
pub fn calculate_level(
    index: usize,
    level: &UpperLevel,
    pairing: &LevelPairing,
    scaling: &ScalingTable,
    spectra: &[Spectrum],
    reference: SpectrumId,
    config: &AnalysisConfig,
) -> LevelResult {
    let columns = scaled_columns(pairing, spectra, scaling, reference);
    let mut rows: Vec<BranchingFractionRow> = Vec::new();

    for (row, &t) in pairing.transitions.iter().enumerate() {
        let transition = &level.transitions[t];
        let contribution = columns.iter().find_map(|column| {
            let line = column.pairs.pairs[row].contributing_line()?;
            match column.scaled_intensity(line) {
                Some((intensity, response)) => Some((column, line, intensity, response)),
                None => {
                    log::warn!(
                        "Line {} ({:.4} cm-1) in spectrum {} lies outside the calibration; skipped",
                        line.line,
                        line.wavenumber,
                        column.spectrum.label
                    );
                    None
                }
            }
        });
        let Some((column, line, intensity, response)) = contribution else {
            continue;
        };

        let signal_error = 100.0 / line.effective_snr(config.correct_snr);
        let calibration_error = column.spectrum.response_error(line.wavenumber);
        let transfer_error = 100.0 * column.factor.error;
        let total_error = (signal_error.powi(2)
            + (calibration_error / 2f64.sqrt()).powi(2)
            + transfer_error.powi(2))
        .sqrt();

        rows.push(BranchingFractionRow {
            transition: t,
            spectrum: column.spectrum.id,
            spectrum_label: column.spectrum.label.clone(),
            line: line.line,
            wavenumber: line.wavenumber,
            wavelength: line.wavelength.unwrap_or(transition.wavelength),
            lower_energy: transition.lower_energy(),
            lower_j: transition.lower_j(),
            lower_config: transition.lower_config().to_string(),
            intensity,
            signal_error,
            calibration_error,
            transfer_error,
            total_error,
            intensity_error: intensity * total_error / 100.0,
            br_frac_theory: transition.br_frac,
            br_frac: 0.0,
            br_frac_error: 0.0,
            tr_prob: None,
            tr_prob_error: None,
            log_gf: None,
            log_gf_error: None,
            calibrated: response != 1.0,
            linked_to_reference: column.linked,
        });
    }

    let total_intensity: f64 = rows.iter().map(|r| r.intensity).sum();
    let total_intensity_error = rows.iter().map(|r| r.intensity_error.powi(2)).sum::<f64>().sqrt();
    let fraction_found: f64 = rows.iter().map(|r| r.br_frac_theory).sum();

    if total_intensity > 0.0 {
        for r in rows.iter_mut() {
            r.br_frac = r.intensity * fraction_found / total_intensity;
        }
    }
    let weighted: f64 = rows.iter().map(|r| (r.br_frac * r.total_error).powi(2)).sum();
    for r in rows.iter_mut() {
        r.br_frac_error = ((1.0 - 2.0 * r.br_frac) * r.total_error.powi(2) + weighted).sqrt();
    }

    if let Some(lifetime) = level.lifetime {
        for r in rows.iter_mut() {
            let tr_prob = r.br_frac / lifetime.value;
            let tr_prob_error = r.br_frac_error.hypot(lifetime.relative_error());
            let gf = gf_factor(&level.transitions[r.transition], r.wavelength);
            r.tr_prob = Some(tr_prob);
            r.tr_prob_error = Some(tr_prob_error);
            r.log_gf = Some((gf * tr_prob).log10());
            r.log_gf_error = Some((gf * (1.0 + tr_prob_error / 100.0)).log10() - gf.log10());
        }
    }

    let tr_prob_total = level.lifetime.map(|lt| fraction_found / lt.value);
    let summary = LevelSummary {
        lines_used: rows.len(),
        total_intensity,
        total_intensity_error,
        fraction_found,
        tr_prob_total,
        missing_percent: level
            .lifetime
            .zip(tr_prob_total)
            .map(|(lt, total)| 100.0 * (1.0 - lt.value * total)),
    };
    log::debug!(
        "Level {}: {} lines, {:.1}% of the theoretical decay observed",
        level.name(),
        summary.lines_used,
        100.0 * fraction_found
    );

    LevelResult {
        level: index,
        name: level.name(),
        energy: level.energy(),
        rows,
        summary,
        observed: observed_lines(pairing, &columns),
    }
}

fn observed_lines(pairing: &LevelPairing, columns: &[ScaledColumn<'_>]) -> Vec<ObservedLine> {
    let mut observed = Vec::new();
    for (row, &t) in pairing.transitions.iter().enumerate() {
        for column in columns {
            let pair = &column.pairs.pairs[row];
            let Some(matched) = pair.line.as_ref().filter(|_| !pair.hidden) else {
                continue;
            };
            let line = &matched.line;
            observed.push(ObservedLine {
                transition: t,
                spectrum: column.spectrum.id,
                spectrum_label: column.spectrum.label.clone(),
                line: line.line,
                wavenumber: line.wavenumber,
                eq_width: line.eq_width,
                snr: line.snr,
                intensity: column.scaled_intensity(line).map(|(i, _)| i),
                selected: pair.selected,
                disabled: pair.disabled,
                linked_to_reference: column.linked,
            });
        }
    }
    observed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::levels::group_upper_levels;
    use crate::data::model::{Lifetime, LineRef, PairFlags, Samples};
    use crate::data::response::Calibration;
    use crate::scaling::build_level_scaling;

    fn fitted(wavenumber: f64, eq_width: f64, snr: f64) -> FittedLine {
        FittedLine {
            line: wavenumber as i64,
            wavenumber,
            peak: 1.0,
            width: 100.0,
            damping: 0.0,
            eq_width,
            eps_tot: 0.0,
            eps_evn: 0.0,
            eps_odd: 0.0,
            eps_ran: 0.0,
            snr,
            noise: 1.0,
            wavelength: None,
            tag: String::new(),
        }
    }

    fn spectrum(n: u32, lines: Vec<FittedLine>) -> Spectrum {
        let mut s = Spectrum::new(format!("S{n}"), "test", Samples::default());
        s.id = SpectrumId(n);
        s.attach_lines("lines", lines);
        s
    }

    /// Two branches of the 40000 cm-1 level.
    fn level() -> UpperLevel {
        let t = |wavenumber: f64, e_lower: f64, log_gf: f64| TargetTransition {
            wavenumber,
            wavelength: 1.0e7 / wavenumber,
            log_gf,
            e_lower,
            j_lower: 1.0,
            config_lower: "low".into(),
            e_upper: 40000.0,
            j_upper: 2.0,
            config_upper: "up".into(),
            tr_prob: 0.0,
            br_frac: 0.0,
        };
        let transitions = vec![t(30000.0, 10000.0, -1.0), t(20000.0, 20000.0, -0.5)];
        let mut levels = group_upper_levels(transitions, 0.09);
        levels.remove(0)
    }

    fn run_with(level: &UpperLevel, spectra: &[Spectrum], config: &AnalysisConfig) -> LevelResult {
        let pairing = LevelPairing::build(level, spectra, config);
        let scaling = build_level_scaling(&pairing, spectra, spectra[0].id, &[], config);
        calculate_level(0, level, &pairing, &scaling.table, spectra, spectra[0].id, config)
    }

    fn run(level: &UpperLevel, spectra: &[Spectrum]) -> LevelResult {
        run_with(level, spectra, &AnalysisConfig::default())
    }

    #[test]
    fn intensities_split_the_observed_fraction() {
        let mut level = level();
        level.lifetime = Some(Lifetime::from_ns(10.0, 0.5).unwrap());
        // No line in common, so the second spectrum keeps a unit factor.
        let spectra = vec![
            spectrum(0, vec![fitted(30000.0, 70.0, 100.0)]),
            spectrum(1, vec![fitted(20000.0, 30.0, 100.0)]),
        ];
        let result = run(&level, &spectra);

        assert_eq!(result.rows.len(), 2);
        let (a, b) = (result.row(0).unwrap(), result.row(1).unwrap());
        assert!((a.br_frac - 0.7).abs() < 1e-12);
        assert!((b.br_frac - 0.3).abs() < 1e-12);
        assert!(a.linked_to_reference);
        assert!(!b.linked_to_reference);
        assert!((a.tr_prob.unwrap() - 7.0e7).abs() < 1e-3);
        assert!((result.summary.tr_prob_total.unwrap() - 1.0e8).abs() < 1e-3);
        assert!(result.summary.missing_percent.unwrap().abs() < 1e-9);
    }

    #[test]
    fn equal_intensities_give_equal_fractions() {
        let spectra = vec![spectrum(
            0,
            vec![fitted(30000.0, 100.0, 100.0), fitted(20000.0, 100.0, 100.0)],
        )];
        let result = run(&level(), &spectra);
        for row in &result.rows {
            assert!((row.br_frac - 0.5).abs() < 1e-12);
            assert!(row.tr_prob.is_none());
            assert!(row.log_gf.is_none());
        }
        assert!(result.summary.tr_prob_total.is_none());
    }

    #[test]
    fn error_propagation_keeps_the_linear_term() {
        let spectra = vec![spectrum(
            0,
            vec![fitted(30000.0, 70.0, 50.0), fitted(20000.0, 30.0, 20.0)],
        )];
        let result = run(&level(), &spectra);
        let (a, b) = (result.row(0).unwrap(), result.row(1).unwrap());
        assert!((a.total_error - 2.0).abs() < 1e-12);
        assert!((b.total_error - 5.0).abs() < 1e-12);
        let weighted = (0.7f64 * 2.0).powi(2) + (0.3f64 * 5.0).powi(2);
        let expected = ((1.0 - 2.0 * 0.7) * 4.0 + weighted).sqrt();
        assert!((a.br_frac_error - expected).abs() < 1e-9);
        assert!((a.intensity_error - 70.0 * 0.02).abs() < 1e-12);
    }

    #[test]
    fn snr_correction_raises_the_signal_error() {
        let noisy = |wavenumber: f64, eq_width: f64, snr: f64| FittedLine {
            noise: 2.0,
            ..fitted(wavenumber, eq_width, snr)
        };
        let spectra = vec![spectrum(
            0,
            vec![noisy(30000.0, 70.0, 50.0), noisy(20000.0, 30.0, 20.0)],
        )];

        let plain = run(&level(), &spectra);
        assert!((plain.row(0).unwrap().signal_error - 2.0).abs() < 1e-12);

        let config = AnalysisConfig {
            correct_snr: true,
            ..AnalysisConfig::default()
        };
        let result = run_with(&level(), &spectra, &config);
        let (a, b) = (result.row(0).unwrap(), result.row(1).unwrap());
        // Effective S/N 25 and 10.
        assert!((a.signal_error - 4.0).abs() < 1e-12);
        assert!((b.signal_error - 10.0).abs() < 1e-12);
        assert!((a.br_frac - 0.7).abs() < 1e-12);
        let weighted = (0.7f64 * 4.0).powi(2) + (0.3f64 * 10.0).powi(2);
        let expected = ((1.0 - 2.0 * 0.7) * 16.0 + weighted).sqrt();
        assert!((a.br_frac_error - expected).abs() < 1e-9);
        assert!(a.br_frac_error > plain.row(0).unwrap().br_frac_error);
    }

    #[test]
    fn log_gf_uses_the_higher_level_j() {
        let mut level = level();
        level.lifetime = Some(Lifetime::from_ns(10.0, 0.0).unwrap());
        // Swap the columns of one record: J of the "lower" column is now the
        // upper level's J.
        let t = &mut level.transitions[0];
        std::mem::swap(&mut t.e_lower, &mut t.e_upper);
        std::mem::swap(&mut t.j_lower, &mut t.j_upper);
        let spectra = vec![spectrum(
            0,
            vec![fitted(30000.0, 70.0, 100.0), fitted(20000.0, 30.0, 100.0)],
        )];
        let result = run(&level, &spectra);
        let row = result.row(0).unwrap();
        let lambda = 1.0e7 / 30000.0;
        let expected = (1.499e-14 * 5.0 * lambda * lambda * row.tr_prob.unwrap()).log10();
        assert!((row.log_gf.unwrap() - expected).abs() < 1e-12);
        let dex = (1.0f64 + row.tr_prob_error.unwrap() / 100.0).log10();
        assert!((row.log_gf_error.unwrap() - dex).abs() < 1e-12);
    }

    #[test]
    fn fitted_wavelength_takes_precedence() {
        let mut level = level();
        level.lifetime = Some(Lifetime::from_ns(10.0, 0.0).unwrap());
        let mut line = fitted(30000.0, 70.0, 100.0);
        line.wavelength = Some(333.2);
        let spectra = vec![spectrum(0, vec![line, fitted(20000.0, 30.0, 100.0)])];
        let result = run(&level, &spectra);
        assert_eq!(result.row(0).unwrap().wavelength, 333.2);
        assert_eq!(result.row(1).unwrap().wavelength, 500.0);
    }

    #[test]
    fn first_selected_spectrum_wins() {
        let spectra = vec![
            spectrum(0, vec![fitted(30000.0, 70.0, 100.0)]),
            spectrum(1, vec![fitted(30000.0, 35.0, 100.0), fitted(20000.0, 15.0, 100.0)]),
        ];
        let mut level = level();
        level.flags.insert(
            (SpectrumId(0), LineRef { list: 0, index: 0 }),
            PairFlags::with_selection(false),
        );
        let result = run(&level, &spectra);
        let row = result.row(0).unwrap();
        assert_eq!(row.spectrum, SpectrumId(1));
        // Spectrum 1 is scaled by 70 / 35.
        assert!((row.intensity - 70.0).abs() < 1e-9);
        assert!((result.row(1).unwrap().intensity - 30.0).abs() < 1e-9);
    }

    #[test]
    fn lines_outside_the_calibration_are_excluded() {
        let mut s = spectrum(0, vec![fitted(30000.0, 70.0, 100.0), fitted(20000.0, 30.0, 100.0)]);
        s.calibration = Some(Calibration::from_response(
            Samples::new(vec![25000.0, 35000.0], vec![0.5, 0.5]).unwrap(),
        ));
        let result = run(&level(), &[s]);
        assert_eq!(result.rows.len(), 1);
        let row = result.row(0).unwrap();
        assert!(row.calibrated);
        assert!((row.intensity - 140.0).abs() < 1e-12);
        assert_eq!(result.observed.iter().filter(|o| o.intensity.is_none()).count(), 1);
    }

    #[test]
    fn hidden_pairs_only_leave_the_observed_view() {
        let spectra = vec![spectrum(
            0,
            vec![fitted(30000.0, 70.0, 100.0), fitted(20000.0, 30.0, 100.0)],
        )];
        let mut level = level();
        level.flags.insert(
            (SpectrumId(0), LineRef { list: 0, index: 1 }),
            PairFlags {
                selected: true,
                disabled: false,
                hidden: true,
            },
        );
        let result = run(&level, &spectra);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.observed.len(), 1);
    }
}
