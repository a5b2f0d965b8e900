use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::response::Calibration;
use crate::errors::{LineError, ProjectError, ProjectResult};

/// Tag that marks a synthetic line added to a list only to help a profile fit.
pub const FAKE_LINE_TAG: &str = "*Fake Line*";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable spectrum identifier. Ids are handed out by the project and never
/// reused, so removing a spectrum cannot re-target anything keyed by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpectrumId(pub u32);

impl fmt::Display for SpectrumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a line list within its spectrum.
pub type LineListId = usize;

/// Address of one fitted line inside a spectrum's flattened line pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRef {
    pub list: LineListId,
    pub index: usize,
}

// ---------------------------------------------------------------------------
// Samples – evenly spaced (x, y) data
// ---------------------------------------------------------------------------

/// Ordered samples on an ascending x axis (wavenumber for spectra and lamp
/// spectra, wavelength in nm for radiance curves).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Samples {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Samples {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> ProjectResult<Self> {
        if x.len() != y.len() {
            return Err(ProjectError::SampleLengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        Ok(Samples { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// First and last x value.
    pub fn range(&self) -> Option<(f64, f64)> {
        Some((*self.x.first()?, *self.x.last()?))
    }

    /// Samples bracketing `x` and the fractional position between them.
    fn bracket(&self, x: f64) -> Option<(usize, usize, f64)> {
        if self.y.len() != self.x.len() {
            return None;
        }
        let (first, last) = self.range()?;
        if x < first || x > last {
            return None;
        }
        if self.len() == 1 {
            return Some((0, 0, 0.0));
        }
        // Index of the first sample strictly above x, clamped so that
        // [hi - 1, hi] is always a valid bracket.
        let hi = self.x.partition_point(|&v| v <= x).clamp(1, self.len() - 1);
        let lo = hi - 1;
        let (x0, x1) = (self.x[lo], self.x[hi]);
        if x1 == x0 {
            return Some((lo, lo, 0.0));
        }
        Some((lo, hi, (x - x0) / (x1 - x0)))
    }

    /// Linear interpolation at `x`. `None` outside the sampled range.
    pub fn interpolate(&self, x: f64) -> Option<f64> {
        let (lo, hi, t) = self.bracket(x)?;
        Some(t * (self.y[hi] - self.y[lo]) + self.y[lo])
    }

    /// Interpolation linear in ln(y), for strictly positive curves such as
    /// lamp radiances. `None` outside the range or where a bracketing sample
    /// is not positive.
    pub fn interpolate_log(&self, x: f64) -> Option<f64> {
        let (lo, hi, t) = self.bracket(x)?;
        let (y0, y1) = (self.y[lo], self.y[hi]);
        if y0 <= 0.0 || y1 <= 0.0 {
            return None;
        }
        Some((t * (y1.ln() - y0.ln()) + y0.ln()).exp())
    }
}

// ---------------------------------------------------------------------------
// FittedLine – one observed, already fitted emission line
// ---------------------------------------------------------------------------

fn default_noise() -> f64 {
    1.0
}

/// Parameters of one line fitted upstream (peak, width in mK, Lorentzian
/// damping fraction, integrated intensity and fit residual metrics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedLine {
    pub line: i64,
    pub wavenumber: f64,
    pub peak: f64,
    pub width: f64,
    pub damping: f64,
    pub eq_width: f64,
    #[serde(default)]
    pub eps_tot: f64,
    #[serde(default)]
    pub eps_evn: f64,
    #[serde(default)]
    pub eps_odd: f64,
    #[serde(default)]
    pub eps_ran: f64,
    pub snr: f64,
    /// Residual RMS of the fit. Only used when S/N correction is enabled.
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Air wavelength in nm, when the line list carries one.
    #[serde(default)]
    pub wavelength: Option<f64>,
    #[serde(default)]
    pub tag: String,
}

impl FittedLine {
    /// Check the physical constraints on the fit parameters.
    pub fn validate(self) -> Result<Self, LineError> {
        let line = self.line;
        let wavelength = self.wavelength.unwrap_or(0.0);
        let fields = [
            ("wavenumber", self.wavenumber),
            ("peak", self.peak),
            ("width", self.width),
            ("damping", self.damping),
            ("eq_width", self.eq_width),
            ("snr", self.snr),
            ("noise", self.noise),
            ("wavelength", wavelength),
        ];
        if let Some(&(field, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(LineError::NotFinite { line, field });
        }

        let negative = [
            (self.wavenumber, LineError::NegativeWavenumber { line, value: self.wavenumber }),
            (self.peak, LineError::NegativePeak { line, value: self.peak }),
            (self.width, LineError::NegativeWidth { line, value: self.width }),
            (self.eq_width, LineError::NegativeIntensity { line, value: self.eq_width }),
            (wavelength, LineError::NegativeWavelength { line, value: wavelength }),
        ];
        if let Some((_, err)) = negative.into_iter().find(|(v, _)| *v < 0.0) {
            return Err(err);
        }
        if self.snr <= 0.0 {
            return Err(LineError::NonPositiveSnr { line, value: self.snr });
        }
        if self.noise <= 0.0 {
            return Err(LineError::NonPositiveNoise { line, value: self.noise });
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(LineError::InvalidDamping { line, value: self.damping });
        }
        Ok(self)
    }

    pub fn is_fake(&self) -> bool {
        self.tag.trim() == FAKE_LINE_TAG
    }

    /// S/N used for error estimates: divided by the residual noise when the
    /// correction is enabled.
    pub fn effective_snr(&self, correct_snr: bool) -> f64 {
        if correct_snr {
            self.snr / self.noise
        } else {
            self.snr
        }
    }
}

// ---------------------------------------------------------------------------
// Spectrum and its line lists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LineList {
    pub id: LineListId,
    pub name: String,
    pub lines: Vec<FittedLine>,
}

/// One measured spectrum with the line lists fitted from it.
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub id: SpectrumId,
    /// Short label used in tables ("A", "B", ...).
    pub label: String,
    pub name: String,
    pub samples: Samples,
    pub line_lists: Vec<LineList>,
    pub calibration: Option<Calibration>,
    pub is_reference: bool,
    next_list_id: LineListId,
}

impl Spectrum {
    /// A spectrum without id. The project assigns the id when it is added.
    pub fn new(label: impl Into<String>, name: impl Into<String>, samples: Samples) -> Self {
        Spectrum {
            id: SpectrumId(0),
            label: label.into(),
            name: name.into(),
            samples,
            line_lists: Vec::new(),
            calibration: None,
            is_reference: false,
            next_list_id: 0,
        }
    }

    /// Attach a fitted line list and return its id.
    pub fn attach_lines(&mut self, name: impl Into<String>, lines: Vec<FittedLine>) -> LineListId {
        let id = self.next_list_id;
        self.next_list_id += 1;
        self.line_lists.push(LineList {
            id,
            name: name.into(),
            lines,
        });
        id
    }

    pub fn detach_lines(&mut self, list: LineListId) -> ProjectResult<LineList> {
        let pos = self
            .line_lists
            .iter()
            .position(|l| l.id == list)
            .ok_or(ProjectError::UnknownLineList {
                spectrum: self.id,
                list,
            })?;
        Ok(self.line_lists.remove(pos))
    }

    /// All fitted lines of every attached list, in list order.
    pub fn lines(&self) -> impl Iterator<Item = (LineRef, &FittedLine)> + '_ {
        self.line_lists.iter().flat_map(|list| {
            list.lines.iter().enumerate().map(move |(index, line)| {
                (
                    LineRef {
                        list: list.id,
                        index,
                    },
                    line,
                )
            })
        })
    }

    pub fn line(&self, line_ref: LineRef) -> Option<&FittedLine> {
        self.line_lists
            .iter()
            .find(|l| l.id == line_ref.list)?
            .lines
            .get(line_ref.index)
    }

    /// Multiplicative response at `wavenumber`; 1.0 when uncalibrated.
    pub fn response(&self, wavenumber: f64) -> f64 {
        self.calibration
            .as_ref()
            .map_or(1.0, |c| c.response(wavenumber))
    }

    /// Calibration uncertainty in percent; 0.0 when uncalibrated.
    pub fn response_error(&self, wavenumber: f64) -> f64 {
        self.calibration
            .as_ref()
            .map_or(0.0, |c| c.response_error(wavenumber))
    }

    pub fn wavenumber_range(&self) -> Option<(f64, f64)> {
        self.samples.range()
    }
}

// ---------------------------------------------------------------------------
// Reference database: predicted transitions grouped by upper level
// ---------------------------------------------------------------------------

/// A predicted transition from the reference line database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTransition {
    pub wavenumber: f64,
    /// Wavelength in nm.
    pub wavelength: f64,
    pub log_gf: f64,
    pub e_lower: f64,
    pub j_lower: f64,
    #[serde(default)]
    pub config_lower: String,
    pub e_upper: f64,
    pub j_upper: f64,
    #[serde(default)]
    pub config_upper: String,
    /// Theoretical transition probability, set when levels are grouped.
    #[serde(default)]
    pub tr_prob: f64,
    /// Theoretical branching fraction, set when levels are grouped.
    #[serde(default)]
    pub br_frac: f64,
}

impl TargetTransition {
    /// Records are not guaranteed to list the upper level in the "upper"
    /// columns; the level with the larger tabulated energy is the upper one.
    fn upper_is_upper(&self) -> bool {
        self.e_upper > self.e_lower
    }

    pub fn upper_energy(&self) -> f64 {
        if self.upper_is_upper() {
            self.e_upper
        } else {
            self.e_lower
        }
    }

    pub fn lower_energy(&self) -> f64 {
        if self.upper_is_upper() {
            self.e_lower
        } else {
            self.e_upper
        }
    }

    pub fn upper_j(&self) -> f64 {
        if self.upper_is_upper() {
            self.j_upper
        } else {
            self.j_lower
        }
    }

    pub fn upper_config(&self) -> &str {
        if self.upper_is_upper() {
            &self.config_upper
        } else {
            &self.config_lower
        }
    }

    pub fn lower_j(&self) -> f64 {
        if self.upper_is_upper() {
            self.j_lower
        } else {
            self.j_upper
        }
    }

    pub fn lower_config(&self) -> &str {
        if self.upper_is_upper() {
            &self.config_lower
        } else {
            &self.config_upper
        }
    }
}

/// Measured radiative lifetime of an upper level, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lifetime {
    pub value: f64,
    pub error: f64,
}

impl Lifetime {
    pub fn new(value: f64, error: f64) -> ProjectResult<Self> {
        if !(value > 0.0) {
            return Err(ProjectError::InvalidLifetime(value));
        }
        if !(error >= 0.0) {
            return Err(ProjectError::InvalidLifetimeError(error));
        }
        Ok(Lifetime { value, error })
    }

    /// Lifetimes are entered in ns.
    pub fn from_ns(value_ns: f64, error_ns: f64) -> ProjectResult<Self> {
        Self::new(value_ns * 1e-9, error_ns * 1e-9)
    }

    /// Relative uncertainty in percent.
    pub fn relative_error(&self) -> f64 {
        100.0 * self.error / self.value
    }
}

/// User-controlled state of one observed line within a level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairFlags {
    pub selected: bool,
    pub disabled: bool,
    pub hidden: bool,
}

impl PairFlags {
    pub fn with_selection(selected: bool) -> Self {
        PairFlags {
            selected,
            disabled: false,
            hidden: false,
        }
    }
}

/// Transitions sharing one upper level, with the lifetime entered for it and
/// the selection state of the observed lines paired to it.
#[derive(Debug, Clone, PartialEq)]
pub struct UpperLevel {
    pub transitions: Vec<TargetTransition>,
    pub lifetime: Option<Lifetime>,
    /// Keyed by the observed line, so a flag survives a pairing rebuild.
    pub flags: BTreeMap<(SpectrumId, LineRef), PairFlags>,
}

impl UpperLevel {
    pub fn new(transitions: Vec<TargetTransition>) -> Self {
        debug_assert!(!transitions.is_empty(), "an upper level needs a transition");
        UpperLevel {
            transitions,
            lifetime: None,
            flags: BTreeMap::new(),
        }
    }

    pub fn energy(&self) -> f64 {
        self.transitions[0].upper_energy()
    }

    pub fn j(&self) -> f64 {
        self.transitions[0].upper_j()
    }

    pub fn config(&self) -> &str {
        self.transitions[0].upper_config()
    }

    pub fn name(&self) -> String {
        format!("{} J={} ({:.3})", self.config(), self.j(), self.energy())
    }

    /// Stored flags for a line, or the default for never-touched lines.
    pub fn flags_for(
        &self,
        spectrum: SpectrumId,
        line: LineRef,
        default_selected: bool,
    ) -> PairFlags {
        self.flags
            .get(&(spectrum, line))
            .copied()
            .unwrap_or_else(|| PairFlags::with_selection(default_selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(wavenumber: f64) -> FittedLine {
        FittedLine {
            line: 1,
            wavenumber,
            peak: 10.0,
            width: 120.0,
            damping: 0.2,
            eq_width: 5.0,
            eps_tot: 0.0,
            eps_evn: 0.0,
            eps_odd: 0.0,
            eps_ran: 0.0,
            snr: 50.0,
            noise: 1.0,
            wavelength: None,
            tag: String::new(),
        }
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        assert!(line(25000.0).validate().is_ok());
        assert!(matches!(
            line(-1.0).validate(),
            Err(LineError::NegativeWavenumber { .. })
        ));
        let mut damped = line(25000.0);
        damped.damping = 1.5;
        assert!(matches!(damped.validate(), Err(LineError::InvalidDamping { .. })));
        let mut noisy = line(25000.0);
        noisy.snr = -3.0;
        assert!(matches!(noisy.validate(), Err(LineError::NonPositiveSnr { .. })));
    }

    #[test]
    fn validation_rejects_zero_snr_and_non_finite_values() {
        let mut silent = line(25000.0);
        silent.snr = 0.0;
        assert!(matches!(silent.validate(), Err(LineError::NonPositiveSnr { .. })));
        let mut flat = line(25000.0);
        flat.noise = 0.0;
        assert!(matches!(flat.validate(), Err(LineError::NonPositiveNoise { .. })));
        let mut broken = line(25000.0);
        broken.eq_width = f64::NAN;
        assert_eq!(
            broken.validate(),
            Err(LineError::NotFinite { line: 1, field: "eq_width" })
        );
        let mut far = line(25000.0);
        far.wavelength = Some(f64::INFINITY);
        assert!(matches!(far.validate(), Err(LineError::NotFinite { field: "wavelength", .. })));
    }

    #[test]
    fn fake_tag_is_matched_after_trimming() {
        let mut fake = line(25000.0);
        fake.tag = "*Fake Line*                     ".to_string();
        assert!(fake.is_fake());
        assert!(!line(25000.0).is_fake());
    }

    #[test]
    fn interpolation_is_linear_and_bounded() {
        let s = Samples::new(vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 30.0]).unwrap();
        assert_eq!(s.interpolate(0.5), Some(5.0));
        assert_eq!(s.interpolate(1.5), Some(20.0));
        assert_eq!(s.interpolate(2.0), Some(30.0));
        assert_eq!(s.interpolate(0.0), Some(0.0));
        assert_eq!(s.interpolate(2.5), None);
    }

    #[test]
    fn log_interpolation_follows_exponentials() {
        let y = vec![(-2.0f64).exp(), (-5.5f64).exp()];
        let s = Samples::new(vec![400.0, 1100.0], y).unwrap();
        let exact = (-800.0f64 / 200.0).exp();
        assert!((s.interpolate_log(800.0).unwrap() - exact).abs() < 1e-12);
        assert!(s.interpolate(800.0).unwrap() > exact);
        let flat = Samples::new(vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        assert_eq!(flat.interpolate_log(0.5), None);
    }

    #[test]
    fn mismatched_axes_are_rejected() {
        assert_eq!(
            Samples::new(vec![0.0, 1.0], vec![1.0]),
            Err(ProjectError::SampleLengthMismatch { x: 2, y: 1 })
        );
        let raw = Samples {
            x: vec![0.0, 1.0],
            y: vec![1.0],
        };
        assert_eq!(raw.interpolate(0.5), None);
    }

    #[test]
    fn swapped_records_report_the_higher_level_as_upper() {
        let t = TargetTransition {
            wavenumber: 20000.0,
            wavelength: 500.0,
            log_gf: -1.0,
            e_lower: 40000.0,
            j_lower: 2.5,
            config_lower: "3d6 4p".into(),
            e_upper: 20000.0,
            j_upper: 1.5,
            config_upper: "3d7".into(),
            tr_prob: 0.0,
            br_frac: 0.0,
        };
        assert_eq!(t.upper_energy(), 40000.0);
        assert_eq!(t.lower_energy(), 20000.0);
        assert_eq!(t.upper_j(), 2.5);
        assert_eq!(t.upper_config(), "3d6 4p");
    }

    #[test]
    fn lifetime_must_be_positive() {
        assert!(Lifetime::from_ns(10.0, 1.0).is_ok());
        assert_eq!(Lifetime::from_ns(0.0, 1.0), Err(ProjectError::InvalidLifetime(0.0)));
        let lt = Lifetime::from_ns(10.0, 1.0).unwrap();
        assert!((lt.relative_error() - 10.0).abs() < 1e-12);
    }
}
