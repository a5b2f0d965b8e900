//! Line pairing: binds every predicted transition of an upper level to the
//! closest observed line of each spectrum.
//!
//! ```text
//!   UpperLevel.transitions        Spectrum.lines()  (all lists, fakes removed)
//!            │                           │
//!            └──────────┬────────────────┘
//!                       ▼
//!              match_transitions      nearest |Δσ| < precision, no reuse
//!                       │
//!                       ▼
//!   LevelPairing { transitions: [t0, t2, ...],  columns: [A: [p, p, ...],
//!                                                         B: [p, p, ...]] }
//! ```
//!
//! Rows unmatched in every spectrum are dropped, so each column has one pair
//! per surviving transition and row `i` means the same transition in every
//! column.

use crate::config::AnalysisConfig;
use crate::data::model::{FittedLine, LineRef, Spectrum, SpectrumId, TargetTransition, UpperLevel};

// ---------------------------------------------------------------------------
// TransitionPair
// ---------------------------------------------------------------------------

/// The observed line bound to a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedLine {
    pub line_ref: LineRef,
    pub line: FittedLine,
}

/// One transition in one spectrum, with the line matched to it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPair {
    /// Index into the level's `transitions`.
    pub transition: usize,
    pub line: Option<MatchedLine>,
    pub selected: bool,
    pub disabled: bool,
    pub hidden: bool,
}

impl TransitionPair {
    pub fn is_matched(&self) -> bool {
        self.line.is_some()
    }

    /// Matched and not disabled: may take part in intensity comparisons.
    pub fn usable_line(&self) -> Option<&FittedLine> {
        if self.disabled {
            return None;
        }
        self.line.as_ref().map(|m| &m.line)
    }

    /// Usable and selected by the user: may contribute a branching fraction.
    pub fn contributing_line(&self) -> Option<&FittedLine> {
        if self.selected {
            self.usable_line()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Match each transition, in order, to the non-fake line of `spectrum`
/// closest in wavenumber and strictly within `precision`. A matched line
/// leaves the pool, so no line serves two transitions.
pub fn match_transitions(
    transitions: &[TargetTransition],
    spectrum: &Spectrum,
    precision: f64,
) -> Vec<Option<MatchedLine>> {
    let mut pool: Vec<(LineRef, &FittedLine)> =
        spectrum.lines().filter(|(_, line)| !line.is_fake()).collect();

    transitions
        .iter()
        .map(|target| {
            let mut best: Option<(usize, f64)> = None;
            for (i, (_, line)) in pool.iter().enumerate() {
                let diff = (line.wavenumber - target.wavenumber).abs();
                if diff >= precision {
                    continue;
                }
                // Strict comparison keeps the first candidate on ties.
                if best.map_or(true, |(_, d)| diff < d) {
                    best = Some((i, diff));
                }
            }
            best.map(|(i, _)| {
                let (line_ref, line) = pool.remove(i);
                MatchedLine {
                    line_ref,
                    line: line.clone(),
                }
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Per-level matrix
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumPairs {
    pub spectrum: SpectrumId,
    pub pairs: Vec<TransitionPair>,
}

/// Pairing of one upper level against every loaded spectrum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelPairing {
    /// Surviving transition indices, one per row.
    pub transitions: Vec<usize>,
    /// One column per spectrum, in project order.
    pub columns: Vec<SpectrumPairs>,
}

impl LevelPairing {
    pub fn build(level: &UpperLevel, spectra: &[Spectrum], config: &AnalysisConfig) -> Self {
        let matches: Vec<Vec<Option<MatchedLine>>> = spectra
            .iter()
            .map(|s| match_transitions(&level.transitions, s, config.level_precision))
            .collect();

        let transitions: Vec<usize> = (0..level.transitions.len())
            .filter(|&t| matches.iter().any(|column| column[t].is_some()))
            .collect();

        let columns = spectra
            .iter()
            .zip(matches)
            .map(|(spectrum, mut column)| {
                let pairs = transitions
                    .iter()
                    .map(|&t| {
                        let line = column[t].take();
                        let flags = match &line {
                            Some(m) => {
                                level.flags_for(spectrum.id, m.line_ref, config.select_matched)
                            }
                            None => Default::default(),
                        };
                        TransitionPair {
                            transition: t,
                            line,
                            selected: flags.selected && !flags.disabled,
                            disabled: flags.disabled,
                            hidden: flags.hidden,
                        }
                    })
                    .collect();
                SpectrumPairs {
                    spectrum: spectrum.id,
                    pairs,
                }
            })
            .collect();

        let pairing = LevelPairing {
            transitions,
            columns,
        };
        pairing.assert_aligned();
        pairing
    }

    /// Number of rows (surviving transitions).
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn column(&self, spectrum: SpectrumId) -> Option<&SpectrumPairs> {
        self.columns.iter().find(|c| c.spectrum == spectrum)
    }

    /// Row holding the given transition index.
    pub fn row_of(&self, transition: usize) -> Option<usize> {
        self.transitions.iter().position(|&t| t == transition)
    }

    pub fn pair(&self, spectrum: SpectrumId, transition: usize) -> Option<&TransitionPair> {
        let row = self.row_of(transition)?;
        self.column(spectrum)?.pairs.get(row)
    }

    /// Drop one spectrum's column. Other columns keep their rows untouched.
    pub fn remove_spectrum(&mut self, spectrum: SpectrumId) {
        self.columns.retain(|c| c.spectrum != spectrum);
        self.assert_aligned();
    }

    /// Columns with the reference first, the rest in project order.
    pub fn ordered_columns(&self, reference: SpectrumId) -> Vec<&SpectrumPairs> {
        let mut ordered: Vec<&SpectrumPairs> =
            self.columns.iter().filter(|c| c.spectrum == reference).collect();
        ordered.extend(self.columns.iter().filter(|c| c.spectrum != reference));
        ordered
    }

    fn assert_aligned(&self) {
        for column in &self.columns {
            debug_assert_eq!(
                column.pairs.len(),
                self.transitions.len(),
                "pair list of spectrum {} is misaligned",
                column.spectrum
            );
            debug_assert!(
                column
                    .pairs
                    .iter()
                    .zip(&self.transitions)
                    .all(|(p, &t)| p.transition == t),
                "pair order of spectrum {} differs from the transition rows",
                column.spectrum
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Whole-project matrix
// ---------------------------------------------------------------------------

/// Level × spectrum × transition pairing for every upper level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairingMatrix {
    pub levels: Vec<LevelPairing>,
}

impl PairingMatrix {
    pub fn build(levels: &[UpperLevel], spectra: &[Spectrum], config: &AnalysisConfig) -> Self {
        let levels: Vec<LevelPairing> = levels
            .iter()
            .map(|level| LevelPairing::build(level, spectra, config))
            .collect();
        log::debug!(
            "Paired {} levels against {} spectra ({} transition rows)",
            levels.len(),
            spectra.len(),
            levels.iter().map(LevelPairing::len).sum::<usize>()
        );
        PairingMatrix { levels }
    }

    pub fn level(&self, level: usize) -> Option<&LevelPairing> {
        self.levels.get(level)
    }

    pub fn pair(
        &self,
        level: usize,
        spectrum: SpectrumId,
        transition: usize,
    ) -> Option<&TransitionPair> {
        self.level(level)?.pair(spectrum, transition)
    }

    pub fn remove_spectrum(&mut self, spectrum: SpectrumId) {
        for level in &mut self.levels {
            level.remove_spectrum(spectrum);
        }
    }
}
