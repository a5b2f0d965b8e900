//! Intensity transfer between spectra.
//!
//! Each comparison of two spectra gives a factor `ratio = I_a / I_b` with a
//! relative uncertainty. Factors form a small undirected graph over the
//! spectra; the factor between any two spectra is the product of ratios along
//! the path of lowest combined uncertainty.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::data::model::{FittedLine, Spectrum, SpectrumId};
use crate::errors::ScalingError;
use crate::pairing::{LevelPairing, SpectrumPairs};

// ---------------------------------------------------------------------------
// ScalingFactor
// ---------------------------------------------------------------------------

/// Multiplier taking intensities of spectrum `to` onto the scale of `from`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScalingFactor {
    pub from: SpectrumId,
    pub to: SpectrumId,
    pub ratio: f64,
    /// Relative uncertainty of `ratio`.
    pub error: f64,
}

impl ScalingFactor {
    pub fn identity(spectrum: SpectrumId) -> Self {
        ScalingFactor {
            from: spectrum,
            to: spectrum,
            ratio: 1.0,
            error: 0.0,
        }
    }

    /// The same link read the other way round.
    pub fn inverted(&self) -> Self {
        ScalingFactor {
            from: self.to,
            to: self.from,
            ratio: 1.0 / self.ratio,
            error: self.error,
        }
    }
}

/// Declaration that two spectra were recorded simultaneously under identical
/// conditions, so every line they share is a valid comparison line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectrumLink {
    pub a: SpectrumId,
    pub b: SpectrumId,
}

impl SpectrumLink {
    pub fn joins(&self, x: SpectrumId, y: SpectrumId) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }

    pub fn touches(&self, spectrum: SpectrumId) -> bool {
        self.a == spectrum || self.b == spectrum
    }
}

// ---------------------------------------------------------------------------
// Comparing two spectra
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RatioSource {
    /// All lines common to two linked spectra.
    Linked,
    /// Lines of the current upper level only.
    Level,
}

/// Intensity ratio of one line seen in both spectra.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineRatio {
    pub wavenumber: f64,
    pub ratio: f64,
    pub error: f64,
}

/// Outcome of comparing two spectra: the combined factor and the lines it
/// was derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub factor: ScalingFactor,
    pub source: RatioSource,
    pub lines: Vec<LineRatio>,
}

fn line_ratio(
    wavenumber: f64,
    a: f64,
    b: f64,
    la: &FittedLine,
    lb: &FittedLine,
    correct_snr: bool,
) -> Option<LineRatio> {
    let error = (la.effective_snr(correct_snr).powi(-2)
        + lb.effective_snr(correct_snr).powi(-2))
    .sqrt();
    let ratio = a / b;
    (ratio.is_finite() && error.is_finite() && error > 0.0).then_some(LineRatio {
        wavenumber,
        ratio,
        error,
    })
}

/// Inverse-variance weighted mean ratio.
fn weighted_ratio(lines: &[LineRatio]) -> f64 {
    let (num, den) = lines.iter().fold((0.0, 0.0), |(num, den), l| {
        let w = l.error.powi(-2);
        (num + l.ratio * w, den + w)
    });
    num / den
}

/// Response corrected intensity of `line`. `None` outside the calibration.
fn corrected_intensity(spectrum: &Spectrum, line: &FittedLine) -> Option<f64> {
    let response = spectrum.response(line.wavenumber);
    let intensity = line.eq_width / response;
    (response > 0.0 && intensity.is_finite()).then_some(intensity)
}

/// Compare two linked spectra using every line they have in common, not only
/// the lines of one level. Both spectra share one response, so raw integrated
/// intensities are compared.
pub fn compare_linked(
    a: &Spectrum,
    b: &Spectrum,
    config: &AnalysisConfig,
) -> Result<Comparison, ScalingError> {
    let mut lines = Vec::new();
    for (_, la) in a.lines().filter(|(_, l)| !l.is_fake()) {
        for (_, lb) in b.lines().filter(|(_, l)| !l.is_fake()) {
            if (la.wavenumber - lb.wavenumber).abs() < config.level_precision {
                lines.extend(line_ratio(
                    la.wavenumber,
                    la.eq_width,
                    lb.eq_width,
                    la,
                    lb,
                    config.correct_snr,
                ));
            }
        }
    }
    if lines.is_empty() {
        return Err(ScalingError::NoComparisonLines { a: a.id, b: b.id });
    }

    let ratio = weighted_ratio(&lines);
    let error = lines.iter().map(|l| l.error.powi(2)).sum::<f64>().sqrt() / lines.len() as f64;
    Ok(Comparison {
        factor: ScalingFactor {
            from: a.id,
            to: b.id,
            ratio,
            error,
        },
        source: RatioSource::Linked,
        lines,
    })
}

/// Compare two spectra through the lines of the current level that are
/// matched and enabled in both. Intensities are response corrected first;
/// a line outside either calibration takes no part.
pub fn compare_level(
    a: &Spectrum,
    a_pairs: &SpectrumPairs,
    b: &Spectrum,
    b_pairs: &SpectrumPairs,
    config: &AnalysisConfig,
) -> Result<Comparison, ScalingError> {
    debug_assert_eq!(a_pairs.pairs.len(), b_pairs.pairs.len());
    let lines: Vec<LineRatio> = a_pairs
        .pairs
        .iter()
        .zip(&b_pairs.pairs)
        .filter_map(|(pa, pb)| {
            let (la, lb) = (pa.usable_line()?, pb.usable_line()?);
            let (ia, ib) = (corrected_intensity(a, la)?, corrected_intensity(b, lb)?);
            line_ratio(la.wavenumber, ia, ib, la, lb, config.correct_snr)
        })
        .collect();
    if lines.is_empty() {
        return Err(ScalingError::NoComparisonLines { a: a.id, b: b.id });
    }

    let ratio = weighted_ratio(&lines);
    let (inv, inv_sq) = lines
        .iter()
        .fold((0.0, 0.0), |(s1, s2), l| (s1 + 1.0 / l.error, s2 + l.error.powi(-2)));
    Ok(Comparison {
        factor: ScalingFactor {
            from: a.id,
            to: b.id,
            ratio,
            error: inv / inv_sq,
        },
        source: RatioSource::Level,
        lines,
    })
}

// ---------------------------------------------------------------------------
// ScalingTable – known factors and transitive resolution
// ---------------------------------------------------------------------------

/// Search frontier entry, ordered so the heap pops the lowest variance.
struct Frontier {
    variance: f64,
    ratio: f64,
    node: SpectrumId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .variance
            .total_cmp(&self.variance)
            .then_with(|| other.node.cmp(&self.node))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalingTable {
    factors: Vec<ScalingFactor>,
}

impl ScalingTable {
    /// A table holding only the reference spectrum's identity factor.
    pub fn seeded(reference: SpectrumId) -> Self {
        ScalingTable {
            factors: vec![ScalingFactor::identity(reference)],
        }
    }

    pub fn insert(&mut self, factor: ScalingFactor) {
        self.factors.push(factor);
    }

    pub fn factors(&self) -> &[ScalingFactor] {
        &self.factors
    }

    /// A factor stored exactly as (a → b).
    pub fn direct(&self, a: SpectrumId, b: SpectrumId) -> Option<ScalingFactor> {
        self.factors.iter().find(|f| f.from == a && f.to == b).copied()
    }

    /// Forget every factor that involves `spectrum`.
    pub fn remove_spectrum(&mut self, spectrum: SpectrumId) {
        self.factors.retain(|f| f.from != spectrum && f.to != spectrum);
    }

    /// Factor taking intensities of `end` onto the scale of `start`.
    ///
    /// A stored factor is used directly, in either direction. Otherwise the
    /// factors are searched as a graph whose edge weight is the squared
    /// relative error: ratios multiply along the path, errors add in
    /// quadrature and the lowest-uncertainty path wins.
    pub fn resolve(
        &self,
        start: SpectrumId,
        end: SpectrumId,
    ) -> Result<ScalingFactor, ScalingError> {
        if start == end {
            return Ok(ScalingFactor::identity(start));
        }
        if let Some(f) = self.direct(start, end) {
            return Ok(f);
        }
        if let Some(f) = self.direct(end, start) {
            return Ok(f.inverted());
        }
        self.best_path(start, end)
            .ok_or(ScalingError::NoScalingRatio { from: start, to: end })
    }

    /// Like [`resolve`](Self::resolve) but falls back to the identity. The
    /// flag is false when no path exists and the spectra stay unlinked.
    pub fn resolve_or_identity(&self, start: SpectrumId, end: SpectrumId) -> (ScalingFactor, bool) {
        match self.resolve(start, end) {
            Ok(factor) => (factor, true),
            Err(e) => {
                log::debug!("{e}; using a unit factor");
                (
                    ScalingFactor {
                        from: start,
                        to: end,
                        ratio: 1.0,
                        error: 0.0,
                    },
                    false,
                )
            }
        }
    }

    fn best_path(&self, start: SpectrumId, end: SpectrumId) -> Option<ScalingFactor> {
        let mut settled: BTreeSet<SpectrumId> = BTreeSet::new();
        let mut frontier = BinaryHeap::new();
        frontier.push(Frontier {
            variance: 0.0,
            ratio: 1.0,
            node: start,
        });

        // Every node settles once, so the search ends on cyclic factor sets.
        while let Some(Frontier { variance, ratio, node }) = frontier.pop() {
            if !settled.insert(node) {
                continue;
            }
            if node == end {
                return Some(ScalingFactor {
                    from: start,
                    to: end,
                    ratio,
                    error: variance.sqrt(),
                });
            }
            for f in &self.factors {
                let (next, step) = if f.from == node && f.to != node {
                    (f.to, f.ratio)
                } else if f.to == node && f.from != node {
                    (f.from, 1.0 / f.ratio)
                } else {
                    continue;
                };
                if !settled.contains(&next) {
                    frontier.push(Frontier {
                        variance: variance + f.error.powi(2),
                        ratio: ratio * step,
                        node: next,
                    });
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Per-level refresh
// ---------------------------------------------------------------------------

/// Scaling factors available while one upper level is being reduced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelScaling {
    pub table: ScalingTable,
    pub comparisons: Vec<Comparison>,
}

/// Compare every pair of spectra (reference first) and collect the factors.
///
/// Linked spectra are compared through all their common lines; when a link
/// yields no common line, or the spectra are not linked, the level's own
/// matched lines are used.
pub fn build_level_scaling(
    pairing: &LevelPairing,
    spectra: &[Spectrum],
    reference: SpectrumId,
    links: &[SpectrumLink],
    config: &AnalysisConfig,
) -> LevelScaling {
    let mut scaling = LevelScaling {
        table: ScalingTable::seeded(reference),
        comparisons: Vec::new(),
    };
    let columns: Vec<(&Spectrum, &SpectrumPairs)> = pairing
        .ordered_columns(reference)
        .into_iter()
        .filter_map(|c| spectra.iter().find(|s| s.id == c.spectrum).map(|s| (s, c)))
        .collect();
    debug_assert_eq!(columns.len(), pairing.columns.len(), "pairing refers to a removed spectrum");

    for (k, &(a, a_pairs)) in columns.iter().enumerate() {
        for &(b, b_pairs) in &columns[k + 1..] {
            let linked = links.iter().any(|l| l.joins(a.id, b.id));
            let result = if linked {
                compare_linked(a, b, config).or_else(|e| {
                    log::warn!("{e}; falling back to the level's lines");
                    compare_level(a, a_pairs, b, b_pairs, config)
                })
            } else {
                compare_level(a, a_pairs, b, b_pairs, config)
            };
            match result {
                Ok(comparison) => {
                    log::debug!(
                        "Spectra {} / {}: ratio {:.4} ± {:.4} from {} lines",
                        a.label,
                        b.label,
                        comparison.factor.ratio,
                        comparison.factor.error,
                        comparison.lines.len()
                    );
                    scaling.table.insert(comparison.factor);
                    scaling.comparisons.push(comparison);
                }
                Err(e) => log::debug!("{e}"),
            }
        }
    }
    scaling
}
