/// Custom error type for the tanks crate.
///
/// Configuration errors are raised before any simulation step runs and are always fatal.
/// Numeric degeneracies come out of scoring a single trial; the calibrator treats those as
/// continuable (see [is_degenerate](#method.is_degenerate)).
#[derive(Debug, thiserror::Error)]
pub enum TankError {
    /// Two series that must line up step for step do not.
    #[error("{what}: expected length {expected}, found {found}")]
    LengthMismatch {
        /// Name of the offending series.
        what: &'static str,
        /// Length required by the other inputs.
        expected: usize,
        /// Length actually provided.
        found: usize,
    },
    /// A forcing or observed series holds no values.
    #[error("{0} series is empty")]
    EmptySeries(&'static str),
    /// NaN or infinite value in an input series.
    #[error("{series} holds a non-finite value at step {index}")]
    NonFiniteInput {
        /// Name of the offending series.
        series: &'static str,
        /// Position of the first bad value.
        index: usize,
    },
    /// Precipitation below zero.
    #[error("precipitation is negative at step {0}")]
    NegativePrecipitation(usize),
    /// Lower bound above upper bound, or a non-finite bound.
    #[error("invalid bounds for parameter {index}: [{lower}, {upper}]")]
    InvalidBounds {
        /// Position of the parameter in the vector.
        index: usize,
        /// Lower bound provided.
        lower: f64,
        /// Upper bound provided.
        upper: f64,
    },
    /// Parameter vector of the wrong size for the model.
    #[error("expected {expected} parameters, found {found}")]
    ParamCount {
        /// Number of parameters the model takes.
        expected: usize,
        /// Number of values provided.
        found: usize,
    },
    /// Initial state with the wrong number of reservoirs for the topology.
    #[error("topology has {expected} tanks but the initial state has {found}")]
    StateSize {
        /// Tanks in the topology.
        expected: usize,
        /// Levels in the initial state.
        found: usize,
    },
    /// A simulated year has no impervious-area projection.
    #[error("no impervious area fraction for year {0}")]
    MissingImperviousYear(i32),
    /// Impervious fraction outside of [0, 100] percent.
    #[error("impervious area fraction {fraction} for year {year} is outside [0, 100]")]
    InvalidImperviousFraction {
        /// Year of the projection.
        year: i32,
        /// Percentage provided.
        fraction: f64,
    },
    /// Non-positive or non-finite catchment area or time step.
    #[error("invalid catchment: {0}")]
    InvalidCatchment(String),
    /// Optimizer settings out of range.
    #[error("invalid optimizer config: {0}")]
    InvalidConfig(&'static str),
    /// Observed series has zero variance, the NSE denominator vanishes.
    #[error("observed series has zero variance")]
    ZeroVariance,
    /// Observed series sums to zero, percent bias is undefined.
    #[error("observed series sums to zero")]
    ZeroObservedSum,
    /// A score or simulated flow came out NaN or infinite.
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    /// Error type from csv crate.
    #[error("could not serialize/deserialize csv file: {0}")]
    Csv(#[from] csv::Error),
    /// Error type from std::io.
    #[error("could not access file: {0}")]
    Io(#[from] std::io::Error),
}

impl TankError {
    /// True when the error belongs to a single degenerate trial rather than to the setup.
    ///
    /// A calibration run scores such trials with a penalty and keeps searching.
    pub fn is_degenerate(&self) -> bool {
        matches!(
            self,
            TankError::ZeroVariance | TankError::ZeroObservedSum | TankError::NonFinite(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_errors_are_degenerate() {
        assert!(TankError::ZeroVariance.is_degenerate());
        assert!(TankError::NonFinite("flow").is_degenerate());
        assert!(!TankError::ParamCount {
            expected: 8,
            found: 3
        }
        .is_degenerate());
        assert!(!TankError::MissingImperviousYear(1990).is_degenerate());
    }

    #[test]
    fn messages_name_the_problem() {
        let err = TankError::LengthMismatch {
            what: "evapotranspiration",
            expected: 4,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "evapotranspiration: expected length 4, found 3"
        );
    }
}
