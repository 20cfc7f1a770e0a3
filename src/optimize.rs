//! Bounded quasi-Newton minimization with finite-difference gradients.
//!
//! # Algorithm
//!
//! A projected limited-memory BFGS.  Each iteration:
//!
//! - estimates the gradient by forward differences, one objective call per coordinate,
//!   evaluated in parallel (backward differences at an upper bound)
//! - fixes coordinates pinned at a bound by a gradient pushing outward
//! - builds a direction over the free coordinates with the two-loop recursion, falling back
//!   to steepest descent when the curvature history does not give a descent direction
//! - backtracks along the direction, projecting every trial point into the box, until the
//!   Armijo condition holds
//!
//! The search stops when the projected gradient or the relative change in the objective
//! falls below the configured tolerances, or when the iteration or evaluation budget runs out.
use crate::errors::TankError;
use crate::params::Bounds;
use log::{debug, trace};
use rayon::prelude::*;
use std::collections::VecDeque;

/// Sufficient decrease constant of the line search.
const ARMIJO: f64 = 1e-4;
/// Halvings tried before a line search gives up.
const MAX_BACKTRACKS: usize = 30;

/// Configuration for the bounded quasi-Newton search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    max_iters: usize,
    max_evals: usize,
    pg_tol: f64,
    f_tol: f64,
    memory: usize,
    fd_step: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_iters: 15_000,
            max_evals: 15_000,
            pg_tol: 1e-5,
            f_tol: 1e7 * f64::EPSILON,
            memory: 10,
            fd_step: 1e-8,
        }
    }
}

impl Config {
    /// Creates a new config with validated tolerances.
    ///
    /// # Errors
    ///
    /// Returns [TankError::InvalidConfig] if a budget is zero or a tolerance is negative or
    /// non-finite.
    pub fn new(
        max_iters: usize,
        max_evals: usize,
        pg_tol: f64,
        f_tol: f64,
    ) -> Result<Self, TankError> {
        if max_iters == 0 {
            return Err(TankError::InvalidConfig("max_iters must be positive"));
        }
        if max_evals == 0 {
            return Err(TankError::InvalidConfig("max_evals must be positive"));
        }
        if !pg_tol.is_finite() || pg_tol < 0.0 {
            return Err(TankError::InvalidConfig("pg_tol must be finite and non-negative"));
        }
        if !f_tol.is_finite() || f_tol < 0.0 {
            return Err(TankError::InvalidConfig("f_tol must be finite and non-negative"));
        }
        Ok(Config {
            max_iters,
            max_evals,
            pg_tol,
            f_tol,
            ..Config::default()
        })
    }

    /// Number of curvature pairs kept by the quasi-Newton update.
    pub fn memory(mut self, memory: usize) -> Result<Self, TankError> {
        if memory == 0 {
            return Err(TankError::InvalidConfig("memory must be positive"));
        }
        self.memory = memory;
        Ok(self)
    }

    /// Relative step of the finite-difference gradient.
    pub fn fd_step(mut self, step: f64) -> Result<Self, TankError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(TankError::InvalidConfig("fd_step must be finite and positive"));
        }
        self.fd_step = step;
        Ok(self)
    }

    /// Returns the iteration limit.
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    /// Returns the objective evaluation limit.
    pub fn max_evals(&self) -> usize {
        self.max_evals
    }

    /// Returns the projected gradient tolerance.
    pub fn pg_tol(&self) -> f64 {
        self.pg_tol
    }

    /// Returns the relative objective change tolerance.
    pub fn f_tol(&self) -> f64 {
        self.f_tol
    }
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Converged according to the configured tolerances.
    Converged,
    /// Reached the iteration limit without converging.
    MaxIters,
    /// Reached the evaluation limit without converging.
    MaxEvals,
    /// The line search found no decrease along any direction.
    Stalled,
}

impl Status {
    /// Returns `true` for [Status::Converged].
    pub fn converged(&self) -> bool {
        matches!(self, Status::Converged)
    }
}

/// The result of a bounded search.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Best point found, inside the bounds.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub objective: f64,
    /// Final solver status.
    pub status: Status,
    /// Iterations completed.
    pub iters: usize,
    /// Objective evaluations spent.
    pub evals: usize,
}

/// Finds a minimum of `f` inside `bounds`, starting from `x0` projected into the box.
///
/// # Errors
///
/// Returns [TankError::LengthMismatch] if `x0` and `bounds` differ in length, and any
/// error returned by `f`.
pub fn minimize<F>(
    f: F,
    x0: &[f64],
    bounds: &Bounds,
    config: &Config,
) -> Result<Solution, TankError>
where
    F: Fn(&[f64]) -> Result<f64, TankError> + Sync,
{
    if x0.len() != bounds.len() {
        return Err(TankError::LengthMismatch {
            what: "initial guess",
            expected: bounds.len(),
            found: x0.len(),
        });
    }
    let mut x = x0.to_vec();
    bounds.project(&mut x);
    let mut fx = f(&x)?;
    let mut evals = 1;
    let mut g = gradient(&f, &x, fx, bounds, config.fd_step)?;
    evals += x.len();
    let mut history: VecDeque<Pair> = VecDeque::with_capacity(config.memory);

    let finish = |x: Vec<f64>, objective: f64, status: Status, iters: usize, evals: usize| {
        debug!(
            "search stopped: {:?} after {} iterations, {} evaluations, objective {}",
            status, iters, evals, objective
        );
        Solution {
            x,
            objective,
            status,
            iters,
            evals,
        }
    };

    for iter in 0..config.max_iters {
        if projected_gradient_norm(&x, &g, bounds) <= config.pg_tol {
            return Ok(finish(x, fx, Status::Converged, iter, evals));
        }
        if evals >= config.max_evals {
            return Ok(finish(x, fx, Status::MaxEvals, iter, evals));
        }

        let free = free_set(&x, &g, bounds);
        let mut d = direction(&g, &free, &history);
        if dot(&d, &g) >= 0.0 {
            history.clear();
            d = direction(&g, &free, &history);
        }
        if d.iter().all(|di| *di == 0.0) {
            return Ok(finish(x, fx, Status::Converged, iter, evals));
        }

        // without curvature information, keep the first trial step near unit length
        let mut alpha = if history.is_empty() {
            1.0f64.min(1.0 / norm_inf(&d))
        } else {
            1.0
        };
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let mut trial: Vec<f64> = x.iter().zip(&d).map(|(xi, di)| xi + alpha * di).collect();
            bounds.project(&mut trial);
            let f_trial = f(&trial)?;
            evals += 1;
            let decrease: f64 = g
                .iter()
                .zip(trial.iter().zip(&x))
                .map(|(gi, (ti, xi))| gi * (ti - xi))
                .sum();
            if f_trial < fx && f_trial <= fx + ARMIJO * decrease {
                accepted = Some((trial, f_trial));
                break;
            }
            if evals >= config.max_evals {
                break;
            }
            alpha *= 0.5;
        }

        let (x_new, f_new) = match accepted {
            Some(found) => found,
            None if evals >= config.max_evals => {
                return Ok(finish(x, fx, Status::MaxEvals, iter, evals));
            }
            None if !history.is_empty() => {
                trace!("line search failed at iteration {}, resetting memory", iter);
                history.clear();
                continue;
            }
            None => return Ok(finish(x, fx, Status::Stalled, iter, evals)),
        };

        let g_new = gradient(&f, &x_new, f_new, bounds, config.fd_step)?;
        evals += x_new.len();

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > f64::EPSILON * dot(&y, &y) {
            if history.len() == config.memory {
                history.pop_front();
            }
            history.push_back(Pair { rho: 1.0 / sy, s, y });
        }

        let change = (fx - f_new).abs();
        let scale = fx.abs().max(f_new.abs()).max(1.0);
        trace!("iteration {}: objective {} -> {}", iter, fx, f_new);
        x = x_new;
        fx = f_new;
        g = g_new;
        if change <= config.f_tol * scale {
            return Ok(finish(x, fx, Status::Converged, iter + 1, evals));
        }
    }
    Ok(finish(x, fx, Status::MaxIters, config.max_iters, evals))
}

/// One curvature pair of the limited-memory update.
#[derive(Debug)]
struct Pair {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm_inf(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

fn masked(v: &[f64], free: &[bool]) -> Vec<f64> {
    v.iter()
        .zip(free)
        .map(|(x, keep)| if *keep { *x } else { 0.0 })
        .collect()
}

/// Finite-difference gradient, one coordinate per rayon task.
fn gradient<F>(
    f: &F,
    x: &[f64],
    fx: f64,
    bounds: &Bounds,
    step: f64,
) -> Result<Vec<f64>, TankError>
where
    F: Fn(&[f64]) -> Result<f64, TankError> + Sync,
{
    bounds
        .pairs()
        .par_iter()
        .enumerate()
        .map(|(i, &(lower, upper))| {
            if lower == upper {
                return Ok(0.0);
            }
            let h = step * x[i].abs().max(1.0);
            let mut probe = x.to_vec();
            if x[i] + h <= upper {
                probe[i] += h;
                Ok((f(&probe)? - fx) / h)
            } else {
                probe[i] -= h;
                Ok((fx - f(&probe)?) / h)
            }
        })
        .collect()
}

/// Coordinates not held at a bound by the gradient.
fn free_set(x: &[f64], g: &[f64], bounds: &Bounds) -> Vec<bool> {
    x.iter()
        .zip(g)
        .zip(bounds.pairs())
        .map(|((xi, gi), &(lower, upper))| {
            let pinned_low = *xi <= lower && *gi > 0.0;
            let pinned_high = *xi >= upper && *gi < 0.0;
            lower < upper && !pinned_low && !pinned_high
        })
        .collect()
}

/// Largest component of the step from `x` to the projection of `x - g`.
fn projected_gradient_norm(x: &[f64], g: &[f64], bounds: &Bounds) -> f64 {
    x.iter()
        .zip(g)
        .zip(bounds.pairs())
        .map(|((xi, gi), &(lower, upper))| ((xi - gi).max(lower).min(upper) - xi).abs())
        .fold(0.0, f64::max)
}

/// Two-loop recursion over the free coordinates.  With no history this is steepest descent.
fn direction(g: &[f64], free: &[bool], history: &VecDeque<Pair>) -> Vec<f64> {
    let mut q = masked(g, free);
    let mut alphas = Vec::with_capacity(history.len());
    for pair in history.iter().rev() {
        let s = masked(&pair.s, free);
        let y = masked(&pair.y, free);
        let a = pair.rho * dot(&s, &q);
        q.iter_mut().zip(&y).for_each(|(qi, yi)| *qi -= a * yi);
        alphas.push(a);
    }
    if let Some(last) = history.back() {
        let yy = dot(&last.y, &last.y);
        if yy > 0.0 {
            let gamma = dot(&last.s, &last.y) / yy;
            q.iter_mut().for_each(|qi| *qi *= gamma);
        }
    }
    for (pair, a) in history.iter().zip(alphas.iter().rev()) {
        let s = masked(&pair.s, free);
        let y = masked(&pair.y, free);
        let b = pair.rho * dot(&y, &q);
        q.iter_mut().zip(&s).for_each(|(qi, si)| *qi += si * (a - b));
    }
    masked(&q, free).iter().map(|qi| -qi).collect()
}
