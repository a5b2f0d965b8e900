use serde::{Deserialize, Serialize};

use super::model::Samples;

// ---------------------------------------------------------------------------
// Radiance uncertainties
// ---------------------------------------------------------------------------

/// Certified radiance uncertainty `err` (percent) between wavelengths `min`
/// and `max` (nm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorRange {
    pub min: f64,
    pub max: f64,
    pub err: f64,
}

// ---------------------------------------------------------------------------
// Calibration – spectrometer response function
// ---------------------------------------------------------------------------

/// Intensity calibration of one spectrum.
///
/// The response function maps wavenumber to a relative sensitivity normalised
/// to 1 at its maximum. It is either supplied directly or derived from a
/// standard lamp spectrum recorded with the same spectrometer together with
/// the lamp's certified spectral radiance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calibration {
    response: Samples,
    pub standard_lamp: Option<Samples>,
    pub radiance: Option<Samples>,
    pub radiance_errors: Vec<ErrorRange>,
}

impl Calibration {
    /// Use a precomputed response curve (wavenumber, response).
    pub fn from_response(response: Samples) -> Self {
        Calibration {
            response,
            ..Default::default()
        }
    }

    /// Derive the response from a standard lamp spectrum (wavenumber, counts)
    /// and the lamp radiance (wavelength in nm, radiance).
    pub fn from_standard_lamp(
        standard_lamp: Samples,
        radiance: Samples,
        radiance_errors: Vec<ErrorRange>,
    ) -> Self {
        let response = photon_response(&standard_lamp, &radiance);
        log::debug!(
            "Derived response function from {} lamp points ({} inside radiance range)",
            standard_lamp.len(),
            response.y.iter().filter(|&&v| v > 0.0).count()
        );
        Calibration {
            response,
            standard_lamp: Some(standard_lamp),
            radiance: Some(radiance),
            radiance_errors,
        }
    }

    pub fn response_curve(&self) -> &Samples {
        &self.response
    }

    /// Response at `wavenumber`: 1.0 without a curve, linear interpolation
    /// inside the curve and 0.0 outside it.
    pub fn response(&self, wavenumber: f64) -> f64 {
        if self.response.is_empty() {
            return 1.0;
        }
        self.response.interpolate(wavenumber).unwrap_or(0.0)
    }

    /// Calibration uncertainty in percent: the lamp spectrum's S/N term and
    /// the radiance certificate term, added in quadrature.
    pub fn response_error(&self, wavenumber: f64) -> f64 {
        let lamp_error = self
            .standard_lamp
            .as_ref()
            .and_then(|lamp| lamp.interpolate(wavenumber))
            .filter(|&v| v != 0.0)
            .map_or(0.0, |snr| 100.0 / snr);
        let radiance_error = self.radiance_error(1.0e7 / wavenumber);
        lamp_error.hypot(radiance_error)
    }

    /// Radiance uncertainty (percent) at a wavelength in nm.
    pub fn radiance_error(&self, wavelength: f64) -> f64 {
        self.radiance_errors
            .iter()
            .find(|r| wavelength >= r.min && wavelength <= r.max)
            .map_or(0.0, |r| r.err)
    }
}

/// Photon-counting response σ³·S(σ)/L(λ), normalised to its maximum. The
/// radiance is interpolated in ln(L). Points outside the radiance range get a
/// response of 0.
fn photon_response(lamp: &Samples, radiance: &Samples) -> Samples {
    let y: Vec<f64> = lamp
        .x
        .iter()
        .zip(&lamp.y)
        .map(|(&sigma, &counts)| match radiance.interpolate_log(1.0e7 / sigma) {
            Some(l) if l > 0.0 => sigma.powi(3) * counts / l,
            _ => 0.0,
        })
        .collect();
    let max = y.iter().copied().fold(0.0_f64, f64::max);
    Samples {
        x: lamp.x.clone(),
        y: if max > 0.0 { y.iter().map(|v| v / max).collect() } else { y },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncalibrated_response_is_unity() {
        let cal = Calibration::default();
        assert_eq!(cal.response(20000.0), 1.0);
        assert_eq!(cal.response_error(20000.0), 0.0);
    }

    #[test]
    fn response_outside_curve_is_zero() {
        let cal = Calibration::from_response(
            Samples::new(vec![10000.0, 20000.0], vec![0.5, 1.0]).unwrap(),
        );
        assert!((cal.response(15000.0) - 0.75).abs() < 1e-12);
        assert_eq!(cal.response(25000.0), 0.0);
    }

    #[test]
    fn lamp_response_is_normalised() {
        // Flat radiance: the response follows sigma^3 * counts.
        let lamp = Samples::new(vec![10000.0, 20000.0], vec![8.0, 1.0]).unwrap();
        let radiance = Samples::new(vec![400.0, 1100.0], vec![2.0, 2.0]).unwrap();
        let cal = Calibration::from_standard_lamp(lamp, radiance, Vec::new());
        // 1e12 * 8 vs 8e12 * 1: equal after normalisation.
        assert!((cal.response(10000.0) - 1.0).abs() < 1e-12);
        assert!((cal.response(20000.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn radiance_is_interpolated_in_log_space() {
        // L(λ) = exp(-λ / 200), tabulated only at the ends of the range.
        let radiance_at = |lambda: f64| (-lambda / 200.0).exp();
        let tabulated = vec![radiance_at(400.0), radiance_at(1100.0)];
        let radiance = Samples::new(vec![400.0, 1100.0], tabulated).unwrap();
        // Lamp counts chosen so that σ³·S/L is the same everywhere.
        let sigmas = vec![10000.0, 12500.0, 15000.0, 20000.0];
        let counts = sigmas
            .iter()
            .map(|&sigma: &f64| radiance_at(1.0e7 / sigma) / sigma.powi(3))
            .collect();
        let cal = Calibration::from_standard_lamp(
            Samples::new(sigmas.clone(), counts).unwrap(),
            radiance,
            Vec::new(),
        );
        for sigma in sigmas {
            assert!((cal.response(sigma) - 1.0).abs() < 1e-9, "response at {sigma}");
        }
    }

    #[test]
    fn response_error_combines_lamp_and_radiance_terms() {
        let lamp = Samples::new(vec![10000.0, 20000.0], vec![25.0, 25.0]).unwrap();
        let radiance = Samples::new(vec![400.0, 1100.0], vec![1.0, 1.0]).unwrap();
        let errors = vec![ErrorRange {
            min: 600.0,
            max: 700.0,
            err: 3.0,
        }];
        let cal = Calibration::from_standard_lamp(lamp, radiance, errors);
        // 15384.6 cm-1 is 650 nm: lamp term 4 %, radiance term 3 %.
        let sigma = 1.0e7 / 650.0;
        assert!((cal.response_error(sigma) - 5.0).abs() < 1e-9);
        // 12000 cm-1 is 833 nm: no certificate entry.
        assert!((cal.response_error(12000.0) - 4.0).abs() < 1e-9);
    }
}
