use std::collections::BTreeSet;

use super::model::{TargetTransition, UpperLevel};
use crate::pairing::LevelPairing;

// ---------------------------------------------------------------------------
// Transition predicate: which reference lines to consider at all
// ---------------------------------------------------------------------------

/// Lower bound applied to reference transitions before levels are grouped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionFilter {
    /// Keep transitions with log(gf) ≥ the bound.
    MinLogGf(f64),
    /// Keep transitions with theoretical branching fraction ≥ the bound.
    MinBranchingFraction(f64),
}

impl TransitionFilter {
    pub fn accepts(&self, transition: &TargetTransition) -> bool {
        match *self {
            TransitionFilter::MinLogGf(min) => transition.log_gf >= min,
            TransitionFilter::MinBranchingFraction(min) => transition.br_frac >= min,
        }
    }
}

// ---------------------------------------------------------------------------
// Level completeness
// ---------------------------------------------------------------------------

/// Transitions of `level` with a line contributing in some spectrum.
fn contributing(pairing: &LevelPairing) -> BTreeSet<usize> {
    pairing
        .transitions
        .iter()
        .enumerate()
        .filter(|(row, _)| {
            pairing
                .columns
                .iter()
                .any(|c| c.pairs[*row].contributing_line().is_some())
        })
        .map(|(_, &t)| t)
        .collect()
}

/// Percentage of the level's theoretical decay covered by selected lines.
/// Each transition counts once however many spectra observe it.
pub fn level_completeness(level: &UpperLevel, pairing: &LevelPairing) -> f64 {
    contributing(pairing)
        .into_iter()
        .map(|t| 100.0 * level.transitions[t].br_frac)
        .sum()
}

/// Transitions whose theoretical branching fraction is at least `min_bf` but
/// which no selected line accounts for.
pub fn missing_significant(level: &UpperLevel, pairing: &LevelPairing, min_bf: f64) -> Vec<usize> {
    let found = contributing(pairing);
    level
        .transitions
        .iter()
        .enumerate()
        .filter(|(t, tr)| tr.br_frac >= min_bf && !found.contains(t))
        .map(|(t, _)| t)
        .collect()
}
