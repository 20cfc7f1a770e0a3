//! Meteorological forcing and land-use projections.
use crate::errors::TankError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;

/// Precipitation and evapotranspiration, both in mm per time step.
///
/// Construction validates that both series are non-empty, equally long and finite,
/// and that precipitation is non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    precip: Vec<f64>,
    evap: Vec<f64>,
}

/// One row of a forcing table.
#[derive(Debug, Deserialize)]
struct ForcingRow {
    precipitation: f64,
    evapotranspiration: f64,
    #[serde(default, rename = "Qrec", alias = "observed")]
    observed: Option<f64>,
}

impl Series {
    /// Validated forcing series.
    pub fn new(precip: Vec<f64>, evap: Vec<f64>) -> Result<Self, TankError> {
        if precip.is_empty() {
            return Err(TankError::EmptySeries("precipitation"));
        }
        if precip.len() != evap.len() {
            return Err(TankError::LengthMismatch {
                what: "evapotranspiration",
                expected: precip.len(),
                found: evap.len(),
            });
        }
        if let Some(index) = precip.iter().position(|x| !x.is_finite()) {
            return Err(TankError::NonFiniteInput {
                series: "precipitation",
                index,
            });
        }
        if let Some(index) = evap.iter().position(|x| !x.is_finite()) {
            return Err(TankError::NonFiniteInput {
                series: "evapotranspiration",
                index,
            });
        }
        if let Some(index) = precip.iter().position(|x| *x < 0.0) {
            return Err(TankError::NegativePrecipitation(index));
        }
        Ok(Series { precip, evap })
    }

    /// Read forcing from a csv file with columns `precipitation` and `evapotranspiration`.
    /// An optional `Qrec` (or `observed`) column is returned as the observed flow record
    /// when every row carries a value.
    pub fn read(path: &str) -> Result<(Series, Option<Vec<f64>>), TankError> {
        let mut precip = Vec::new();
        let mut evap = Vec::new();
        let mut observed = Vec::new();
        let var = File::open(path)?;
        let mut rdr = csv::Reader::from_reader(var);
        let headers = rdr.headers()?.clone();
        for result in rdr.records() {
            let row = result?;
            let row: ForcingRow = row.deserialize(Some(&headers))?;
            precip.push(row.precipitation);
            evap.push(row.evapotranspiration);
            observed.push(row.observed);
        }
        let observed: Option<Vec<f64>> = observed.into_iter().collect();
        Ok((Series::new(precip, evap)?, observed))
    }

    /// Precipitation [mm].
    pub fn precip(&self) -> &[f64] {
        &self.precip
    }

    /// Evapotranspiration [mm].
    pub fn evap(&self) -> &[f64] {
        &self.evap
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.precip.len()
    }

    /// Always `false`, an empty series cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.precip.is_empty()
    }

    /// The first `n` steps, or the whole series if it is shorter.  Fails for `n == 0`.
    pub fn head(&self, n: usize) -> Result<Series, TankError> {
        if n == 0 {
            return Err(TankError::EmptySeries("precipitation"));
        }
        let n = n.min(self.len());
        Ok(Series {
            precip: self.precip[..n].to_vec(),
            evap: self.evap[..n].to_vec(),
        })
    }
}

/// Projected impervious area, in percent of the catchment, by calendar year.
///
/// Built with a builder pattern: start from the year table with [new](#method.new),
/// then adjust [start_year](#method.start_year), [exponent](#method.exponent) and
/// [steps_per_year](#method.steps_per_year).
///
/// ```
/// use std::collections::BTreeMap;
/// use tanks::prelude::*;
///
/// let table: BTreeMap<i32, f64> = (1989..1992).map(|y| (y, 10.0)).collect();
/// let schedule = ImperviousSchedule::new(table).exponent(2);
/// assert_eq!(schedule.year(400), 1990);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImperviousSchedule {
    fractions: BTreeMap<i32, f64>,
    start_year: Option<i32>,
    exponent: i32,
    steps_per_year: usize,
}

/// One row of an impervious area projection table.
#[derive(Debug, Deserialize)]
struct ImperviousRow {
    year: i32,
    #[serde(rename = "Predicted_impervious_area")]
    fraction: f64,
}

impl ImperviousSchedule {
    /// Schedule starting in the first year of the table, linear response, daily steps.
    pub fn new(fractions: BTreeMap<i32, f64>) -> Self {
        ImperviousSchedule {
            fractions,
            start_year: None,
            exponent: 1,
            steps_per_year: 365,
        }
    }

    /// Read a projection table with columns `year` and `Predicted_impervious_area`.
    pub fn read(path: &str) -> Result<Self, TankError> {
        let mut fractions = BTreeMap::new();
        let var = File::open(path)?;
        let mut rdr = csv::Reader::from_reader(var);
        let headers = rdr.headers()?.clone();
        for result in rdr.records() {
            let row = result?;
            let row: ImperviousRow = row.deserialize(Some(&headers))?;
            fractions.insert(row.year, row.fraction);
        }
        Ok(ImperviousSchedule::new(fractions))
    }

    /// Calendar year of the first forcing step.
    pub fn start_year(mut self, year: i32) -> Self {
        self.start_year = Some(year);
        self
    }

    /// Power applied to the growth correction, 1 for linear and 2 for squared.
    pub fn exponent(mut self, exponent: i32) -> Self {
        self.exponent = exponent;
        self
    }

    /// Number of forcing steps that make up one year.
    pub fn steps_per_year(mut self, steps: usize) -> Self {
        self.steps_per_year = steps;
        self
    }

    /// Year that forcing step `step` falls in.
    pub fn year(&self, step: usize) -> i32 {
        let start = self
            .start_year
            .or_else(|| self.fractions.keys().next().copied())
            .unwrap_or(0);
        start + (step / self.steps_per_year.max(1)) as i32
    }

    /// Multiplier on infiltration-type coefficients at step `step`:
    /// `1 / (1 + fraction / 100)^exponent`.
    pub fn factor(&self, step: usize) -> Result<f64, TankError> {
        let year = self.year(step);
        let fraction = self
            .fractions
            .get(&year)
            .ok_or(TankError::MissingImperviousYear(year))?;
        Ok((1.0 + fraction / 100.0).powi(self.exponent).recip())
    }

    fn validate(&self) -> Result<(), TankError> {
        if self.steps_per_year == 0 {
            return Err(TankError::InvalidConfig("steps_per_year must be positive"));
        }
        for (&year, &fraction) in &self.fractions {
            if !fraction.is_finite() || !(0.0..=100.0).contains(&fraction) {
                return Err(TankError::InvalidImperviousFraction { year, fraction });
            }
        }
        Ok(())
    }
}

/// Meteorological series paired with one impervious-area correction per step.
///
/// Only built by [Forcing::impervious], so the factors always cover every step.
#[derive(Debug, Clone, PartialEq)]
pub struct LandUse {
    series: Series,
    factors: Vec<f64>,
}

impl LandUse {
    /// Meteorological series.
    pub fn series(&self) -> &Series {
        &self.series
    }

    /// Per-step correction derived from the schedule.
    pub fn factors(&self) -> &[f64] {
        &self.factors
    }
}

/// Forcing handed to a simulation, with or without land-use change.
#[derive(Debug, Clone, PartialEq)]
pub enum Forcing {
    /// Fixed land use.
    Static(Series),
    /// Growing impervious area; the factor at step `t` scales infiltration-type coefficients.
    Impervious(LandUse),
}

impl Forcing {
    /// Forcing with fixed land use.
    pub fn new(series: Series) -> Self {
        Forcing::Static(series)
    }

    /// Forcing with time-varying impervious area.  Every year the series reaches must be
    /// present in the schedule.
    pub fn impervious(series: Series, schedule: &ImperviousSchedule) -> Result<Self, TankError> {
        schedule.validate()?;
        let factors = (0..series.len())
            .map(|t| schedule.factor(t))
            .collect::<Result<Vec<f64>, TankError>>()?;
        Ok(Forcing::Impervious(LandUse { series, factors }))
    }

    /// Meteorological series.
    pub fn series(&self) -> &Series {
        match self {
            Forcing::Static(series) => series,
            Forcing::Impervious(land) => &land.series,
        }
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.series().len()
    }

    /// Always `false`, an empty series cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.series().is_empty()
    }

    /// Coefficient correction at step `t`, 1 for fixed land use and past the last step.
    pub fn factor(&self, t: usize) -> f64 {
        match self {
            Forcing::Static(_) => 1.0,
            Forcing::Impervious(land) => land.factors.get(t).copied().unwrap_or(1.0),
        }
    }

    /// The first `n` steps.  Fails for `n == 0`.
    pub fn head(&self, n: usize) -> Result<Forcing, TankError> {
        match self {
            Forcing::Static(series) => Ok(Forcing::Static(series.head(n)?)),
            Forcing::Impervious(land) => {
                let series = land.series.head(n)?;
                let factors = land.factors[..series.len()].to_vec();
                Ok(Forcing::Impervious(LandUse { series, factors }))
            }
        }
    }
}

impl From<Series> for Forcing {
    fn from(series: Series) -> Self {
        Forcing::Static(series)
    }
}
