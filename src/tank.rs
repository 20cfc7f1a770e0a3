//! Tanks, their outlets, and the single time-step transition of a cascade.
//!
//! A [Topology] is an ordered list of [Tank]s.  Each tank empties through stages of
//! threshold-gated linear [Outlet]s: the outlets of one stage all read the same water level,
//! and if together they would draw more than the tank holds they are scaled back
//! proportionally so the tank empties exactly.  Stages run one after the other on whatever
//! level the previous stage left.  Percolation from one tank feeds the next.
use crate::params::Catchment;
use crate::state::StateVector;

/// Where the water released by an outlet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Straight to the stream.
    Runoff,
    /// Into the next tank down.  From the bottom tank this is lost to deep groundwater.
    Percolation,
}

/// A threshold-gated linear outlet: releases `coef * (level - threshold)` once the level
/// exceeds `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outlet {
    /// Discharge coefficient per time step.
    pub coef: f64,
    /// Height of the outlet above the tank floor [mm].
    pub threshold: f64,
    /// Destination of the released water.
    pub route: Route,
    /// Whether impervious-area growth scales the coefficient.
    pub impervious: bool,
}

impl Outlet {
    /// Side outlet to the stream at height `threshold`.
    pub fn side(coef: f64, threshold: f64) -> Self {
        Outlet {
            coef,
            threshold,
            route: Route::Runoff,
            impervious: false,
        }
    }

    /// Bottom outlet to the stream.
    pub fn bottom(coef: f64) -> Self {
        Outlet::side(coef, 0.0)
    }

    /// Bottom outlet into the next tank.
    pub fn percolation(coef: f64) -> Self {
        Outlet {
            route: Route::Percolation,
            ..Outlet::bottom(coef)
        }
    }

    /// Mark the coefficient as sensitive to impervious-area growth.
    pub fn impervious(mut self) -> Self {
        self.impervious = true;
        self
    }

    /// Water released at `level`, before any availability correction.
    pub fn release(&self, level: f64, factor: f64) -> f64 {
        let coef = if self.impervious {
            self.coef * factor
        } else {
            self.coef
        };
        gate(coef, level, self.threshold)
    }
}

/// `coef * (level - threshold)` above the threshold, zero below.  Never negative.
pub fn gate(coef: f64, level: f64, threshold: f64) -> f64 {
    if level > threshold {
        (coef * (level - threshold)).max(0.0)
    } else {
        0.0
    }
}

/// Water released by one tank in one step, and what it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Drain {
    /// Released to the stream [mm].
    pub runoff: f64,
    /// Released to the next tank [mm].
    pub percolation: f64,
    /// Level left in the tank [mm].
    pub level: f64,
}

/// One reservoir of the cascade.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tank {
    stages: Vec<Vec<Outlet>>,
    recharge: f64,
}

impl Tank {
    /// Tank without outlets.  Add them with [stage](#method.stage).
    pub fn new() -> Self {
        Tank::default()
    }

    /// Append a stage of outlets that draw simultaneously from the same level.
    pub fn stage(mut self, outlets: Vec<Outlet>) -> Self {
        self.stages.push(outlets);
        self
    }

    /// Constant inflow added every step, e.g. groundwater recharge [mm].
    pub fn recharge(mut self, inflow: f64) -> Self {
        self.recharge = inflow;
        self
    }

    /// Outlet stages in the order they run.
    pub fn stages(&self) -> &[Vec<Outlet>] {
        &self.stages
    }

    /// Empty the tank from `level` through its outlet stages.
    pub fn drain(&self, level: f64, factor: f64) -> Drain {
        let mut out = Drain {
            level: level.max(0.0),
            ..Drain::default()
        };
        for stage in &self.stages {
            let h = out.level;
            let total: f64 = stage.iter().map(|o| o.release(h, factor)).sum();
            // more water drawn than available: scale every outlet back so the tank empties exactly
            let scale = if total > h { h / total } else { 1.0 };
            for outlet in stage {
                let q = outlet.release(h, factor) * scale;
                match outlet.route {
                    Route::Runoff => out.runoff += q,
                    Route::Percolation => out.percolation += q,
                }
            }
            out.level = if total > h { 0.0 } else { (h - total).max(0.0) };
        }
        out
    }
}

/// Per-step fluxes of a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fluxes {
    /// Runoff from the upper tank [mm].
    pub surface: f64,
    /// Runoff from the deeper tanks [mm].
    pub baseflow: f64,
    /// Water passed from the upper tank to the one below [mm].
    pub percolation: f64,
    /// Total discharge at the catchment outlet [m³/s].
    pub flow: f64,
}

/// An ordered cascade of tanks plus the forcing corrections applied to the upper one.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    tanks: Vec<Tank>,
    rfcf: f64,
    ecorr: f64,
}

impl Topology {
    /// Cascade of `tanks`, top first, with uncorrected forcing.
    pub fn new(tanks: Vec<Tank>) -> Self {
        Topology {
            tanks,
            rfcf: 1.0,
            ecorr: 1.0,
        }
    }

    /// Rainfall and evaporation correction factors for the upper tank.
    pub fn corrections(mut self, rfcf: f64, ecorr: f64) -> Self {
        self.rfcf = rfcf;
        self.ecorr = ecorr;
        self
    }

    /// Number of tanks.
    pub fn len(&self) -> usize {
        self.tanks.len()
    }

    /// Returns `true` for a cascade without tanks.
    pub fn is_empty(&self) -> bool {
        self.tanks.is_empty()
    }

    /// Tanks, top first.
    pub fn tanks(&self) -> &[Tank] {
        &self.tanks
    }

    /// Advance the cascade by one time step.
    ///
    /// The upper tank takes `precip * rfcf - evap * ecorr` (never dropping below empty);
    /// every other tank takes the percolation from above plus its recharge.  `factor` is the
    /// impervious-area correction for this step, 1 for fixed land use.  Pure: the same
    /// inputs always produce the same result.
    pub fn step(
        &self,
        state: &StateVector,
        precip: f64,
        evap: f64,
        factor: f64,
        catchment: &Catchment,
    ) -> (StateVector, Fluxes) {
        let mut levels = Vec::with_capacity(self.tanks.len());
        let mut fluxes = Fluxes::default();
        let mut inflow = 0.0;
        for (i, tank) in self.tanks.iter().enumerate() {
            let h = if i == 0 {
                state.level(0) + precip * self.rfcf - evap * self.ecorr
            } else {
                state.level(i) + inflow + tank.recharge
            };
            let drain = tank.drain(h.max(0.0), factor);
            if i == 0 {
                fluxes.surface = drain.runoff;
                fluxes.percolation = drain.percolation;
            } else {
                fluxes.baseflow += drain.runoff;
            }
            inflow = drain.percolation;
            levels.push(drain.level);
        }
        let q = fluxes.surface + fluxes.baseflow;
        fluxes.flow = if q >= 0.0 {
            catchment.to_discharge(q)
        } else {
            0.0
        };
        (StateVector::from_levels(levels), fluxes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_tank(k: [f64; 4], d: [f64; 2]) -> Topology {
        Topology::new(vec![
            Tank::new().stage(vec![
                Outlet::side(k[0], d[0]),
                Outlet::side(k[1], d[1]),
                Outlet::percolation(k[2]),
            ]),
            Tank::new().stage(vec![Outlet::bottom(k[3])]),
        ])
    }

    fn daily() -> Catchment {
        Catchment::new(100.0, 24.0).unwrap()
    }

    #[test]
    fn gate_opens_above_threshold() {
        assert_eq!(gate(0.5, 1.0, 2.0), 0.0);
        assert_eq!(gate(0.5, 2.0, 2.0), 0.0);
        assert_relative_eq!(gate(0.5, 9.0, 2.0), 3.5);
        assert_eq!(gate(-0.5, 9.0, 2.0), 0.0);
    }

    #[test]
    fn single_step_by_hand() {
        let topo = two_tank([0.5, 0.2, 0.1, 0.3], [2.0, 5.0]);
        let (state, fluxes) = topo.step(&StateVector::new(0.0, 0.0), 10.0, 1.0, 1.0, &daily());
        // H1 = 9: q1 = 3.5, q2 = 0.8, q3 = 0.9
        assert_relative_eq!(fluxes.surface, 4.3, epsilon = 1e-12);
        assert_relative_eq!(fluxes.percolation, 0.9, epsilon = 1e-12);
        assert_relative_eq!(state.s1(), 3.8, epsilon = 1e-12);
        assert_relative_eq!(fluxes.baseflow, 0.27, epsilon = 1e-12);
        assert_relative_eq!(state.s2(), 0.63, epsilon = 1e-12);
        assert_relative_eq!(fluxes.flow, 4.57 / 0.864, epsilon = 1e-9);
    }

    #[test]
    fn dry_upper_tank_releases_nothing() {
        let topo = two_tank([0.5, 0.2, 0.1, 0.3], [2.0, 5.0]);
        let (state, fluxes) = topo.step(&StateVector::new(0.5, 4.0), 0.0, 3.0, 1.0, &daily());
        assert_eq!(state.s1(), 0.0);
        assert_eq!(fluxes.surface, 0.0);
        assert_eq!(fluxes.percolation, 0.0);
        assert_relative_eq!(fluxes.baseflow, 1.2, epsilon = 1e-12);
    }

    #[test]
    fn over_draw_rescales_to_available_water() {
        let topo = two_tank([1.1, 1.1, 1.5, 0.5], [1.0, 0.5]);
        let (state, fluxes) = topo.step(&StateVector::new(0.0, 0.0), 20.0, 0.0, 1.0, &daily());
        assert_relative_eq!(fluxes.surface + fluxes.percolation, 20.0, epsilon = 1e-9);
        assert_eq!(state.s1(), 0.0);
        // proportions survive the rescale: q3 / (q1 + q2) = 30 / 42.35
        assert_relative_eq!(
            fluxes.percolation / fluxes.surface,
            30.0 / 42.35,
            epsilon = 1e-9
        );
    }

    #[test]
    fn lower_tank_never_over_drains() {
        let topo = two_tank([0.0, 0.0, 1.0, 1.1], [1.0, 1.0]);
        let (state, fluxes) = topo.step(&StateVector::new(0.0, 2.0), 3.0, 0.0, 1.0, &daily());
        // H2 = 2 + 3, k4 * H2 = 5.5 > 5
        assert_relative_eq!(fluxes.baseflow, 5.0, epsilon = 1e-12);
        assert_eq!(state.s2(), 0.0);
    }

    #[test]
    fn sequential_stages_read_remaining_level() {
        let topo = Topology::new(vec![
            Tank::new()
                .stage(vec![Outlet::bottom(0.5)])
                .stage(vec![Outlet::percolation(0.5)]),
            Tank::new().stage(vec![Outlet::bottom(0.0)]),
        ]);
        let (state, fluxes) = topo.step(&StateVector::new(0.0, 0.0), 8.0, 0.0, 1.0, &daily());
        assert_relative_eq!(fluxes.surface, 4.0);
        assert_relative_eq!(fluxes.percolation, 2.0);
        assert_relative_eq!(state.s1(), 2.0);
        assert_relative_eq!(state.s2(), 2.0);
    }

    #[test]
    fn impervious_factor_scales_marked_outlets_only() {
        let tank = Tank::new().stage(vec![
            Outlet::bottom(0.4).impervious(),
            Outlet::percolation(0.2),
        ]);
        let d = tank.drain(10.0, 0.5);
        assert_relative_eq!(d.runoff, 2.0);
        assert_relative_eq!(d.percolation, 2.0);
        assert_relative_eq!(d.level, 6.0);
    }

    #[test]
    fn recharge_feeds_lower_tank() {
        let topo = Topology::new(vec![
            Tank::new().stage(vec![Outlet::percolation(0.0)]),
            Tank::new().stage(vec![Outlet::bottom(0.5)]).recharge(2.0),
        ]);
        let (state, fluxes) = topo.step(&StateVector::new(0.0, 2.0), 0.0, 0.0, 1.0, &daily());
        assert_relative_eq!(fluxes.baseflow, 2.0);
        assert_relative_eq!(state.s2(), 2.0);
    }

    #[test]
    fn water_balance_closes() {
        let topo = two_tank([0.3, 0.1, 0.2, 0.05], [4.0, 1.0]);
        let mut state = StateVector::new(5.0, 5.0);
        let rain = [0.0, 12.0, 30.0, 0.0, 1.0, 0.0, 7.0];
        for &p in &rain {
            let before = state.total();
            let (next, fluxes) = topo.step(&state, p, 0.5, 1.0, &daily());
            let evap = (before - next.total() + p - fluxes.surface - fluxes.baseflow).abs();
            // whatever is unaccounted went to evaporation, at most the demand
            assert!(evap <= 0.5 + 1e-9);
            state = next;
        }
    }

    #[test]
    fn three_tank_cascade_passes_water_down() {
        let topo = Topology::new(vec![
            Tank::new().stage(vec![Outlet::side(0.3, 5.0), Outlet::percolation(0.2)]),
            Tank::new().stage(vec![Outlet::side(0.1, 2.0), Outlet::percolation(0.1)]),
            Tank::new().stage(vec![Outlet::bottom(0.05)]),
        ]);
        let mut state = StateVector::from_levels(vec![0.0, 0.0, 0.0]);
        for _ in 0..20 {
            state = topo.step(&state, 10.0, 1.0, 1.0, &daily()).0;
        }
        assert_eq!(state.len(), 3);
        assert!(state.levels().iter().all(|l| *l > 0.0));
    }
}
