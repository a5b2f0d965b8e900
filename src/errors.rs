use thiserror::Error;

use crate::data::model::SpectrumId;

// ---------------------------------------------------------------------------
// Fitted line validation
// ---------------------------------------------------------------------------

/// Rejected fitted-line parameters. Raised at ingestion; the offending line is
/// dropped from its list rather than aborting the load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    #[error("line {line}: negative wavenumber {value}")]
    NegativeWavenumber { line: i64, value: f64 },
    #[error("line {line}: negative peak {value}")]
    NegativePeak { line: i64, value: f64 },
    #[error("line {line}: negative width {value}")]
    NegativeWidth { line: i64, value: f64 },
    #[error("line {line}: negative integrated intensity {value}")]
    NegativeIntensity { line: i64, value: f64 },
    #[error("line {line}: negative wavelength {value}")]
    NegativeWavelength { line: i64, value: f64 },
    #[error("line {line}: signal-to-noise ratio {value} is not positive")]
    NonPositiveSnr { line: i64, value: f64 },
    #[error("line {line}: noise {value} is not positive")]
    NonPositiveNoise { line: i64, value: f64 },
    #[error("line {line}: {field} is not a finite number")]
    NotFinite { line: i64, field: &'static str },
    #[error("line {line}: damping {value} outside 0..=1")]
    InvalidDamping { line: i64, value: f64 },
}

// ---------------------------------------------------------------------------
// Intensity transfer between spectra
// ---------------------------------------------------------------------------

/// Expected outcomes of comparing uncalibrated or disjoint spectra. Callers
/// convert both into a fallback instead of failing the calculation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScalingError {
    #[error("no comparison lines found between spectra {a} and {b}")]
    NoComparisonLines { a: SpectrumId, b: SpectrumId },
    #[error("no scaling ratio found from spectrum {from} to spectrum {to}")]
    NoScalingRatio { from: SpectrumId, to: SpectrumId },
}

// ---------------------------------------------------------------------------
// Project mutations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectError {
    #[error("unknown spectrum {0}")]
    UnknownSpectrum(SpectrumId),
    #[error("spectrum {spectrum} has no line list {list}")]
    UnknownLineList { spectrum: SpectrumId, list: usize },
    #[error("unknown upper level {0}")]
    UnknownLevel(usize),
    #[error("upper level {level} has no paired transition {transition}")]
    UnknownTransition { level: usize, transition: usize },
    #[error("transition {transition} of level {level} is not matched in spectrum {spectrum}")]
    UnmatchedPair {
        level: usize,
        spectrum: SpectrumId,
        transition: usize,
    },
    #[error("a spectrum cannot be linked to itself ({0})")]
    SelfLink(SpectrumId),
    #[error("the level lifetime must be positive, got {0} s")]
    InvalidLifetime(f64),
    #[error("the lifetime uncertainty must not be negative, got {0} s")]
    InvalidLifetimeError(f64),
    #[error("the level precision must be positive, got {0}")]
    InvalidPrecision(f64),
    #[error("sample axes differ in length: {x} x values, {y} y values")]
    SampleLengthMismatch { x: usize, y: usize },
    #[error(transparent)]
    Line(#[from] LineError),
}

pub type ProjectResult<T> = Result<T, ProjectError>;
