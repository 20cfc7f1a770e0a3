//! Fit model parameters to an observed flow record.
use crate::errors::TankError;
use crate::forcing::Forcing;
use crate::metrics;
use crate::model::RunoffModel;
use crate::optimize::{self, Config, Status};
use crate::params::{Bounds, ParamVector};
use log::{debug, info, warn};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Search settings for a [Calibrator].
#[derive(Debug, Clone)]
pub struct CalibrationConfig<P: ParamVector> {
    /// Starting point, projected into `bounds` before the search.
    pub initial: P,
    /// Box constraints in [ParamVector::NAMES] order.
    pub bounds: Bounds,
    /// Error exponent of the NSE score.
    pub nse_exponent: f64,
    /// Objective returned for a degenerate trial.  Finite, so a trial with an NSE below
    /// `-penalty` still scores worse than a degenerate one; raise it for records where such
    /// scores are reachable.
    pub penalty: f64,
    /// Optimizer budget and tolerances.
    pub optimizer: Config,
}

impl<P: ParamVector> Default for CalibrationConfig<P> {
    fn default() -> Self {
        CalibrationConfig {
            initial: P::initial(),
            bounds: P::bounds(),
            nse_exponent: 2.0,
            penalty: 9999.0,
            optimizer: Config::default(),
        }
    }
}

impl<P: ParamVector> CalibrationConfig<P> {
    /// Replace the starting point.
    pub fn initial(mut self, initial: P) -> Self {
        self.initial = initial;
        self
    }

    /// Replace the search box.
    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Replace the optimizer settings.
    pub fn optimizer(mut self, optimizer: Config) -> Self {
        self.optimizer = optimizer;
        self
    }
}

/// Outcome of a calibration run.
#[derive(Debug, Clone)]
pub struct Calibration<P> {
    /// Best parameter set found.
    pub params: P,
    /// Objective at `params`, the negated NSE.
    pub objective: f64,
    /// NSE at `params`, scored again after the search.  Equals `-objective`.
    pub nse: f64,
    /// Optimizer stopping reason.
    pub status: Status,
    /// Optimizer iterations.
    pub iterations: usize,
    /// Model runs spent.
    pub evaluations: usize,
}

/// Binds a model, its forcing and an observed flow record for calibration.
#[derive(Debug)]
pub struct Calibrator<'a, M: RunoffModel> {
    model: &'a M,
    forcing: &'a Forcing,
    observed: &'a [f64],
    config: CalibrationConfig<M::Params>,
}

impl<'a, M: RunoffModel> Calibrator<'a, M> {
    /// Checks the whole setup before any trial runs.
    ///
    /// Fails if the bounds do not cover every parameter, the observed record is empty,
    /// non-finite or does not line up with the simulated trajectory, or the model rejects
    /// the forcing.
    pub fn new(
        model: &'a M,
        forcing: &'a Forcing,
        observed: &'a [f64],
        config: CalibrationConfig<M::Params>,
    ) -> Result<Self, TankError> {
        let names = <M::Params as ParamVector>::NAMES;
        if config.bounds.len() != names.len() {
            return Err(TankError::ParamCount {
                expected: names.len(),
                found: config.bounds.len(),
            });
        }
        Bounds::new(config.bounds.pairs())?;
        if observed.is_empty() {
            return Err(TankError::EmptySeries("observed"));
        }
        let expected = model.output_len(forcing.len());
        if observed.len() != expected {
            return Err(TankError::LengthMismatch {
                what: "observed flow",
                expected,
                found: observed.len(),
            });
        }
        if let Some(index) = observed.iter().position(|q| !q.is_finite()) {
            return Err(TankError::NonFiniteInput {
                series: "observed",
                index,
            });
        }
        if !config.nse_exponent.is_finite() || config.nse_exponent <= 0.0 {
            return Err(TankError::InvalidConfig("nse exponent must be positive"));
        }
        model.validate(forcing)?;
        Ok(Calibrator {
            model,
            forcing,
            observed,
            config,
        })
    }

    /// NSE of the model run with `params`.
    pub fn score(&self, params: &M::Params) -> Result<f64, TankError> {
        let traj = self.model.simulate(self.forcing, params)?;
        metrics::nse_with_exponent(&traj.flow, self.observed, self.config.nse_exponent)
    }

    /// Negated NSE at parameter vector `x`.  Degenerate trials score the configured penalty;
    /// any other failure is returned.
    pub fn objective(&self, x: &[f64]) -> Result<f64, TankError> {
        let params = M::Params::from_slice(x)?;
        match self.score(&params) {
            Ok(nse) => Ok(-nse),
            Err(e) if e.is_degenerate() => {
                debug!("penalising trial {:?}: {}", x, e);
                Ok(self.config.penalty)
            }
            Err(e) => Err(e),
        }
    }

    /// Local search from the configured initial guess.
    ///
    /// Fails with the degenerate error itself if even the best point found cannot be
    /// scored, e.g. against an observed record with zero variance.
    pub fn calibrate(&self) -> Result<Calibration<M::Params>, TankError> {
        info!(
            "calibrating {} parameters against {} observations",
            self.config.bounds.len(),
            self.observed.len()
        );
        let calibration = self.search(&self.config.initial.to_vec())?;
        info!(
            "calibration finished: nse {:.4} after {} evaluations",
            calibration.nse, calibration.evaluations
        );
        Ok(calibration)
    }

    /// Local searches from `starts` points in parallel, keeping the best.  The first point
    /// is the configured guess, the rest are drawn uniformly inside the bounds from an RNG
    /// seeded with `seed`.
    pub fn calibrate_multistart(
        &self,
        starts: usize,
        seed: u64,
    ) -> Result<Calibration<M::Params>, TankError> {
        if starts == 0 {
            return Err(TankError::InvalidConfig("at least one start is required"));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let draws: Vec<Uniform<f64>> = self
            .config
            .bounds
            .pairs()
            .iter()
            .map(|&(lower, upper)| Uniform::new_inclusive(lower, upper))
            .collect();
        let mut points = vec![self.config.initial.to_vec()];
        for _ in 1..starts {
            points.push(draws.iter().map(|d| d.sample(&mut rng)).collect());
        }
        info!("calibrating from {} starting points", starts);

        let results: Vec<Calibration<M::Params>> = points
            .par_iter()
            .map(|x0| self.search(x0))
            .collect::<Result<_, _>>()?;
        results
            .into_iter()
            .min_by(|a, b| {
                a.objective
                    .partial_cmp(&b.objective)
                    .unwrap_or(Ordering::Equal)
            })
            .ok_or(TankError::InvalidConfig("at least one start is required"))
    }

    fn search(&self, x0: &[f64]) -> Result<Calibration<M::Params>, TankError> {
        let solution = optimize::minimize(
            |x: &[f64]| self.objective(x),
            x0,
            &self.config.bounds,
            &self.config.optimizer,
        )?;
        match solution.status {
            Status::Converged => {}
            Status::MaxIters | Status::MaxEvals => warn!(
                "optimizer did not converge ({:?}), returning best point found",
                solution.status
            ),
            Status::Stalled => warn!("line search stalled, returning best point found"),
        }
        let params = M::Params::from_slice(&solution.x)?;
        // a penalised best point has no NSE to report
        let nse = self.score(&params)?;
        Ok(Calibration {
            params,
            objective: solution.objective,
            nse,
            status: solution.status,
            iterations: solution.iters,
            evaluations: solution.evals,
        })
    }
}
