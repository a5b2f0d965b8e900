use super::model::{TargetTransition, UpperLevel};

/// Default tolerance (cm⁻¹) for treating two energies, or two wavenumbers, as
/// the same.
pub const DEFAULT_LEVEL_PRECISION: f64 = 9.0e-2;

/// Two lower levels closer than this are the same level.
const DUPLICATE_LOWER_LEVEL: f64 = 1e-6;

/// Constant of the log(gf) → A conversion used for theoretical branching
/// fractions.
const TR_PROB_CONST: f64 = 1.49919;

/// Group reference transitions by upper level.
///
/// Transitions whose upper energy lies within `precision` of the first
/// ungrouped transition join its level; a second branch to the same lower
/// level is dropped as a duplicate. Levels are returned in ascending upper
/// energy with theoretical branching fractions filled in.
pub fn group_upper_levels(transitions: Vec<TargetTransition>, precision: f64) -> Vec<UpperLevel> {
    let mut remaining = transitions;
    let mut levels: Vec<Vec<TargetTransition>> = Vec::new();

    while !remaining.is_empty() {
        let energy = remaining[0].upper_energy();
        let (members, rest): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|t| (t.upper_energy() - energy).abs() < precision);
        remaining = rest;

        let mut level: Vec<TargetTransition> = Vec::with_capacity(members.len());
        for t in members {
            let duplicate = level
                .iter()
                .any(|m| (m.lower_energy() - t.lower_energy()).abs() < DUPLICATE_LOWER_LEVEL);
            if duplicate {
                log::debug!(
                    "Dropping duplicate branch {:.4} cm-1 of level {:.3}",
                    t.wavenumber,
                    energy
                );
            } else {
                level.push(t);
            }
        }
        levels.push(level);
    }

    levels.sort_by(|a, b| a[0].upper_energy().total_cmp(&b[0].upper_energy()));
    levels
        .into_iter()
        .map(|mut level| {
            assign_branching_fractions(&mut level);
            UpperLevel::new(level)
        })
        .collect()
}

/// Theoretical A = 10^log(gf) · σ² / (1.49919 · (2J+1)) per branch, then
/// normalised over the level to give branching fractions.
fn assign_branching_fractions(level: &mut [TargetTransition]) {
    for t in level.iter_mut() {
        let statistical_weight = 2.0 * t.upper_j() + 1.0;
        t.tr_prob =
            10f64.powf(t.log_gf) * t.wavenumber.powi(2) / (TR_PROB_CONST * statistical_weight);
    }
    let total: f64 = level.iter().map(|t| t.tr_prob).sum();
    for t in level.iter_mut() {
        t.br_frac = if total > 0.0 { t.tr_prob / total } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(wavenumber: f64, log_gf: f64, e_upper: f64, e_lower: f64) -> TargetTransition {
        TargetTransition {
            wavenumber,
            wavelength: 1.0e7 / wavenumber,
            log_gf,
            e_lower,
            j_lower: 1.5,
            config_lower: "lower".into(),
            e_upper,
            j_upper: 2.5,
            config_upper: "upper".into(),
            tr_prob: 0.0,
            br_frac: 0.0,
        }
    }

    #[test]
    fn groups_by_upper_energy_within_precision() {
        let levels = group_upper_levels(
            vec![
                transition(30000.0, -1.0, 40000.00, 10000.0),
                transition(20000.0, -0.5, 35000.00, 15000.0),
                transition(25000.0, -1.2, 40000.05, 15000.0),
            ],
            DEFAULT_LEVEL_PRECISION,
        );
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].transitions.len(), 1);
        assert_eq!(levels[0].energy(), 35000.0);
        assert_eq!(levels[1].transitions.len(), 2);
        assert_eq!(levels[1].transitions[0].wavenumber, 30000.0);
    }

    #[test]
    fn duplicate_lower_levels_are_dropped() {
        let levels = group_upper_levels(
            vec![
                transition(30000.0, -1.0, 40000.0, 10000.0),
                transition(30000.01, -1.0, 40000.0, 10000.0),
            ],
            DEFAULT_LEVEL_PRECISION,
        );
        assert_eq!(levels[0].transitions.len(), 1);
    }

    #[test]
    fn theoretical_branching_fractions_sum_to_one() {
        let levels = group_upper_levels(
            vec![
                transition(30000.0, -1.0, 40000.0, 10000.0),
                transition(25000.0, -0.3, 40000.0, 15000.0),
                transition(15000.0, -2.0, 40000.0, 25000.0),
            ],
            DEFAULT_LEVEL_PRECISION,
        );
        let total: f64 = levels[0].transitions.iter().map(|t| t.br_frac).sum();
        assert!((total - 1.0).abs() < 1e-12);
        // Same J for every branch: the ratio of A values is gf·σ².
        let t = &levels[0].transitions;
        let expected =
            (10f64.powf(-1.0) * 30000f64.powi(2)) / (10f64.powf(-0.3) * 25000f64.powi(2));
        assert!((t[0].tr_prob / t[1].tr_prob - expected).abs() < 1e-9);
    }

    #[test]
    fn swapped_records_group_on_the_higher_energy() {
        let levels = group_upper_levels(
            vec![
                transition(30000.0, -1.0, 40000.0, 10000.0),
                transition(20000.0, -1.0, 20000.0, 40000.0),
            ],
            DEFAULT_LEVEL_PRECISION,
        );
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].transitions.len(), 2);
    }
}
