//! Parameter vectors, their bounds, and the fixed catchment description.
use crate::errors::TankError;
use serde::{Deserialize, Serialize};

/// A model parameter set that the calibrator can flatten into a vector and rebuild.
pub trait ParamVector: Sized + Clone + Send + Sync {
    /// Parameter names, in vector order.
    const NAMES: &'static [&'static str];

    /// Flatten into a vector ordered as [NAMES](#associatedconstant.NAMES).
    fn to_vec(&self) -> Vec<f64>;

    /// Rebuild from a vector ordered as [NAMES](#associatedconstant.NAMES).
    fn from_slice(values: &[f64]) -> Result<Self, TankError>;

    /// Starting point of a calibration run.
    fn initial() -> Self;

    /// Search box of a calibration run.
    fn bounds() -> Bounds;
}

/// Checks the length of a parameter slice before it is unpacked.
pub(crate) fn check_len(values: &[f64], expected: usize) -> Result<(), TankError> {
    if values.len() != expected {
        return Err(TankError::ParamCount {
            expected,
            found: values.len(),
        });
    }
    Ok(())
}

/// Coefficients and thresholds of the two-tank cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Upper tank upper discharge coefficient.
    pub k1: f64,
    /// Upper tank lower discharge coefficient.
    pub k2: f64,
    /// Percolation to lower tank coefficient.
    pub k3: f64,
    /// Lower tank discharge coefficient.
    pub k4: f64,
    /// Upper tank upper discharge position [mm].
    pub d1: f64,
    /// Upper tank lower discharge position [mm].
    pub d2: f64,
    /// Rainfall correction factor.
    pub rfcf: f64,
    /// Evaporation correction factor.
    pub ecorr: f64,
}

impl Parameters {
    /// Names in vector order.
    pub const NAMES: [&'static str; 8] = ["k1", "k2", "k3", "k4", "d1", "d2", "rfcf", "ecorr"];

    /// Convert to an 8-element array.
    pub fn to_array(&self) -> [f64; 8] {
        [
            self.k1, self.k2, self.k3, self.k4, self.d1, self.d2, self.rfcf, self.ecorr,
        ]
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            k1: 0.5,
            k2: 0.2,
            k3: 0.01,
            k4: 0.1,
            d1: 10.0,
            d2: 20.0,
            rfcf: 1.0,
            ecorr: 1.0,
        }
    }
}

impl ParamVector for Parameters {
    const NAMES: &'static [&'static str] = &Parameters::NAMES;

    fn to_vec(&self) -> Vec<f64> {
        self.to_array().to_vec()
    }

    fn from_slice(values: &[f64]) -> Result<Self, TankError> {
        check_len(values, Self::NAMES.len())?;
        Ok(Parameters {
            k1: values[0],
            k2: values[1],
            k3: values[2],
            k4: values[3],
            d1: values[4],
            d2: values[5],
            rfcf: values[6],
            ecorr: values[7],
        })
    }

    fn initial() -> Self {
        Parameters::default()
    }

    fn bounds() -> Bounds {
        Bounds::fixed(&[
            (0.0, 1.1),  // k1
            (0.0, 1.1),  // k2
            (0.0, 1.5),  // k3
            (0.0, 1.1),  // k4
            (1.0, 15.0), // d1
            (0.1, 1.0),  // d2
            (0.8, 1.2),  // rfcf
            (0.8, 1.2),  // ecorr
        ])
    }
}

/// Box constraints, one `(lower, upper)` pair per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pairs: Vec<(f64, f64)>,
}

impl Bounds {
    /// Validated bounds.  Fails if any pair is non-finite or has `lower > upper`.
    pub fn new(pairs: &[(f64, f64)]) -> Result<Self, TankError> {
        for (index, &(lower, upper)) in pairs.iter().enumerate() {
            if !lower.is_finite() || !upper.is_finite() || lower > upper {
                return Err(TankError::InvalidBounds {
                    index,
                    lower,
                    upper,
                });
            }
        }
        Ok(Bounds {
            pairs: pairs.to_vec(),
        })
    }

    /// Known-good constant bounds, not validated.
    pub(crate) fn fixed(pairs: &[(f64, f64)]) -> Self {
        Bounds {
            pairs: pairs.to_vec(),
        }
    }

    /// Number of bounded parameters.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if no parameters are bounded.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The `(lower, upper)` pairs.
    pub fn pairs(&self) -> &[(f64, f64)] {
        &self.pairs
    }

    /// Clamp `x` into the box.
    pub fn project(&self, x: &mut [f64]) {
        for (xi, &(lower, upper)) in x.iter_mut().zip(&self.pairs) {
            *xi = xi.max(lower).min(upper);
        }
    }
}

/// Fixed physical description of the catchment, never calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Catchment {
    /// Catchment area [km²].
    pub area: f64,
    /// Number of hours in the time step.
    pub dt: f64,
}

impl Catchment {
    /// Validated catchment, area in km² and time step in hours.
    pub fn new(area: f64, dt: f64) -> Result<Self, TankError> {
        if !area.is_finite() || area <= 0.0 {
            return Err(TankError::InvalidCatchment(format!(
                "area must be positive, got {}",
                area
            )));
        }
        if !dt.is_finite() || dt <= 0.0 {
            return Err(TankError::InvalidCatchment(format!(
                "time step must be positive, got {}",
                dt
            )));
        }
        Ok(Catchment { area, dt })
    }

    /// Converts a depth in mm per time step over the catchment into m³/s.
    pub fn to_discharge(&self, depth: f64) -> f64 {
        depth * self.area / (3.6 * self.dt)
    }
}

impl Default for Catchment {
    /// 145 km² at an hourly step.
    fn default() -> Self {
        Catchment {
            area: 145.0,
            dt: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_guess_matches_names() {
        let p = Parameters::default();
        assert_eq!(p.to_vec().len(), Parameters::NAMES.len());
        assert_eq!(p.d2, 20.0);
    }

    #[test]
    fn from_slice_roundtrip() {
        let p = Parameters {
            k1: 0.1819,
            k2: 0.0412,
            k3: 0.3348,
            k4: 0.0448,
            d1: 3.2259,
            d2: 0.38,
            rfcf: 1.0,
            ecorr: 1.0,
        };
        assert_eq!(Parameters::from_slice(&p.to_vec()).unwrap(), p);
    }

    #[test]
    fn from_slice_wrong_length() {
        assert!(matches!(
            Parameters::from_slice(&[1.0, 2.0]),
            Err(TankError::ParamCount {
                expected: 8,
                found: 2
            })
        ));
    }

    #[test]
    fn bounds_reject_inverted_pair() {
        let err = Bounds::new(&[(0.0, 1.0), (2.0, 1.0)]).unwrap_err();
        assert!(matches!(err, TankError::InvalidBounds { index: 1, .. }));
    }

    #[test]
    fn bounds_project_clamps() {
        let b = Parameters::bounds();
        let mut x = Parameters::default().to_vec();
        b.project(&mut x);
        // d2 = 20 sits above its box
        assert_eq!(x[5], 1.0);
        assert_eq!(x[0], 0.5);
    }

    #[test]
    fn discharge_conversion() {
        let c = Catchment::new(100.0, 24.0).unwrap();
        assert_relative_eq!(c.to_discharge(8.64), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn catchment_rejects_zero_area() {
        assert!(Catchment::new(0.0, 24.0).is_err());
        assert!(Catchment::new(10.0, f64::NAN).is_err());
    }
}
