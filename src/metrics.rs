//! Goodness-of-fit scores for simulated against observed flow.
//!
//! Degenerate inputs (zero observed variance, zero observed volume) are reported as errors
//! instead of leaking `inf` or `NaN` into comparisons.
use crate::errors::TankError;
use crate::utils;

fn check_pair(simulated: &[f64], observed: &[f64]) -> Result<(), TankError> {
    if observed.is_empty() {
        return Err(TankError::EmptySeries("observed"));
    }
    if simulated.len() != observed.len() {
        return Err(TankError::LengthMismatch {
            what: "simulated flow",
            expected: observed.len(),
            found: simulated.len(),
        });
    }
    Ok(())
}

fn finite(score: f64) -> Result<f64, TankError> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(TankError::NonFinite("score"))
    }
}

/// Nash-Sutcliffe Efficiency with squared errors.  Range (-inf, 1], 1 is a perfect match
/// and 0 is no better than the observed mean.
pub fn nse(simulated: &[f64], observed: &[f64]) -> Result<f64, TankError> {
    nse_with_exponent(simulated, observed, 2.0)
}

/// Nash-Sutcliffe Efficiency with errors raised to `j`:
/// `1 - sum(|sim - obs|^j) / sum(|obs - mean(obs)|^j)`.
///
/// Larger `j` weighs peaks more heavily.
///
/// # Examples
///
/// ```rust
/// let obs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
/// let score = tanks::metrics::nse_with_exponent(&obs, &obs, 1.0).unwrap();
/// assert_eq!(1.0, score);
/// ```
pub fn nse_with_exponent(simulated: &[f64], observed: &[f64], j: f64) -> Result<f64, TankError> {
    check_pair(simulated, observed)?;
    let mean = utils::mean(observed);
    let error: f64 = simulated
        .iter()
        .zip(observed)
        .map(|(s, o)| (s - o).abs().powf(j))
        .sum();
    let spread: f64 = observed.iter().map(|o| (o - mean).abs().powf(j)).sum();
    if spread == 0.0 {
        return Err(TankError::ZeroVariance);
    }
    finite(1.0 - error / spread)
}

/// Root mean square error [m³/s].  Range [0, inf), 0 is a perfect match.
pub fn rmse(simulated: &[f64], observed: &[f64]) -> Result<f64, TankError> {
    check_pair(simulated, observed)?;
    let mse = simulated
        .iter()
        .zip(observed)
        .map(|(s, o)| (s - o).powi(2))
        .sum::<f64>()
        / observed.len() as f64;
    finite(mse.sqrt())
}

/// Percent bias of simulated volume.  0 is unbiased, positive is overestimation.
pub fn pbias(simulated: &[f64], observed: &[f64]) -> Result<f64, TankError> {
    check_pair(simulated, observed)?;
    let total: f64 = observed.iter().sum();
    if total == 0.0 {
        return Err(TankError::ZeroObservedSum);
    }
    let diff: f64 = simulated.iter().zip(observed).map(|(s, o)| s - o).sum();
    finite(100.0 * diff / total)
}
