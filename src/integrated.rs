//! Integrated infiltration model: surface runoff from rainfall excess over an upper soil zone
//! that percolates into a groundwater zone feeding baseflow.
use crate::errors::TankError;
use crate::forcing::Forcing;
use crate::model::{RunoffModel, Trajectory};
use crate::params::{check_len, Bounds, Catchment, ParamVector};
use crate::state::StateVector;
use crate::tank::{gate, Fluxes};
use serde::{Deserialize, Serialize};

/// Rates and starting storages of the [IntegratedModel].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InfiltrationParams {
    /// Share of the upper zone storage that rainfall can infiltrate into per step.
    pub infiltration_rate: f64,
    /// Share of the upper zone passed to the lower zone per step.
    pub percolation_rate: f64,
    /// Share of the lower zone released as baseflow per step.
    pub baseflow_rate: f64,
    /// Upper zone storage at the start of the run [mm].
    pub upper_zone_storage: f64,
    /// Lower zone storage at the start of the run [mm].
    pub lower_zone_storage: f64,
}

impl Default for InfiltrationParams {
    fn default() -> Self {
        InfiltrationParams {
            infiltration_rate: 0.5,
            percolation_rate: 0.1,
            baseflow_rate: 0.05,
            upper_zone_storage: 50.0,
            lower_zone_storage: 50.0,
        }
    }
}

impl ParamVector for InfiltrationParams {
    const NAMES: &'static [&'static str] = &[
        "infiltration_rate",
        "percolation_rate",
        "baseflow_rate",
        "upper_zone_storage",
        "lower_zone_storage",
    ];

    fn to_vec(&self) -> Vec<f64> {
        vec![
            self.infiltration_rate,
            self.percolation_rate,
            self.baseflow_rate,
            self.upper_zone_storage,
            self.lower_zone_storage,
        ]
    }

    fn from_slice(values: &[f64]) -> Result<Self, TankError> {
        check_len(values, Self::NAMES.len())?;
        Ok(InfiltrationParams {
            infiltration_rate: values[0],
            percolation_rate: values[1],
            baseflow_rate: values[2],
            upper_zone_storage: values[3],
            lower_zone_storage: values[4],
        })
    }

    fn initial() -> Self {
        InfiltrationParams::default()
    }

    fn bounds() -> Bounds {
        Bounds::fixed(&[
            (0.0, 1.0),
            (0.0, 1.0),
            (0.0, 1.0),
            (0.0, 200.0),
            (0.0, 500.0),
        ])
    }
}

/// Upper soil zone over a groundwater zone, with the storages as calibrated parameters.
///
/// By default baseflow does not deplete the lower zone: the groundwater store is treated
/// as externally sustained, as in heavily irrigated or industrial catchments.  Use
/// [drain_lower_zone](#method.drain_lower_zone) for a closed water balance.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedModel {
    catchment: Catchment,
    drain_lower_zone: bool,
}

impl IntegratedModel {
    /// Model over the default catchment.
    pub fn new() -> Self {
        IntegratedModel {
            catchment: Catchment::default(),
            drain_lower_zone: false,
        }
    }

    /// Catchment area and time step.
    pub fn catchment(mut self, catchment: Catchment) -> Self {
        self.catchment = catchment;
        self
    }

    /// Whether baseflow is taken out of the lower zone.
    pub fn drain_lower_zone(mut self, drain: bool) -> Self {
        self.drain_lower_zone = drain;
        self
    }

    /// Advance both zones by one step.  `factor` scales the infiltration rate for
    /// impervious-area growth.
    pub fn step(
        &self,
        state: &StateVector,
        precip: f64,
        evap: f64,
        factor: f64,
        p: &InfiltrationParams,
    ) -> (StateVector, Fluxes) {
        let mut upper = state.s1();
        let mut lower = state.s2();

        let infiltration = gate(p.infiltration_rate * factor, upper, 0.0).min(precip);
        let surface = (precip - infiltration - evap).max(0.0);
        upper += infiltration;

        let percolation = gate(p.percolation_rate, upper, 0.0).min(upper);
        upper -= percolation;
        lower += percolation;

        let baseflow = gate(p.baseflow_rate, lower, 0.0).min(lower);
        if self.drain_lower_zone {
            lower -= baseflow;
        }

        let fluxes = Fluxes {
            surface,
            baseflow,
            percolation,
            flow: self.catchment.to_discharge(surface + baseflow),
        };
        (StateVector::new(upper, lower), fluxes)
    }
}

impl Default for IntegratedModel {
    fn default() -> Self {
        IntegratedModel::new()
    }
}

impl RunoffModel for IntegratedModel {
    type Params = InfiltrationParams;

    fn output_len(&self, steps: usize) -> usize {
        steps
    }

    fn validate(&self, _forcing: &Forcing) -> Result<(), TankError> {
        Ok(())
    }

    fn simulate(
        &self,
        forcing: &Forcing,
        params: &InfiltrationParams,
    ) -> Result<Trajectory, TankError> {
        let series = forcing.series();
        let mut traj = Trajectory::with_capacity(series.len());
        let mut state = StateVector::new(params.upper_zone_storage, params.lower_zone_storage);
        for (t, (&p, &e)) in series.precip().iter().zip(series.evap()).enumerate() {
            let (next, fluxes) = self.step(&state, p, e, forcing.factor(t), params);
            if !fluxes.flow.is_finite() {
                return Err(TankError::NonFinite("simulated flow"));
            }
            traj.push(
                fluxes.flow,
                self.catchment.to_discharge(fluxes.surface),
                self.catchment.to_discharge(fluxes.baseflow),
                next.clone(),
            );
            state = next;
        }
        Ok(traj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forcing::{ImperviousSchedule, Series};
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn params() -> InfiltrationParams {
        InfiltrationParams {
            infiltration_rate: 0.2,
            percolation_rate: 0.1,
            baseflow_rate: 0.05,
            upper_zone_storage: 20.0,
            lower_zone_storage: 40.0,
        }
    }

    fn model() -> IntegratedModel {
        IntegratedModel::new().catchment(Catchment::new(86.4, 24.0).unwrap())
    }

    #[test]
    fn step_by_hand() {
        let p = params();
        let (state, f) = model().step(&StateVector::new(20.0, 40.0), 10.0, 1.0, 1.0, &p);
        // infiltration = min(10, 0.2 * 20) = 4, surface = 10 - 4 - 1 = 5
        assert_relative_eq!(f.surface, 5.0);
        // upper = 24, percolation = 2.4
        assert_relative_eq!(f.percolation, 2.4, epsilon = 1e-12);
        assert_relative_eq!(state.s1(), 21.6, epsilon = 1e-12);
        // lower = 42.4, baseflow = 2.12, not drained
        assert_relative_eq!(f.baseflow, 2.12, epsilon = 1e-12);
        assert_relative_eq!(state.s2(), 42.4, epsilon = 1e-12);
        // 86.4 km² over a day: 1 mm is 1 m³/s
        assert_relative_eq!(f.flow, 7.12, epsilon = 1e-12);
    }

    #[test]
    fn evaporation_swallows_small_excess() {
        let (_, f) = model().step(&StateVector::new(20.0, 0.0), 5.0, 3.0, 1.0, &params());
        assert_eq!(f.surface, 0.0);
    }

    #[test]
    fn drained_lower_zone_loses_baseflow() {
        let m = model().drain_lower_zone(true);
        let (state, f) = m.step(&StateVector::new(0.0, 40.0), 0.0, 0.0, 1.0, &params());
        assert_relative_eq!(f.baseflow, 2.0);
        assert_relative_eq!(state.s2(), 38.0);
    }

    #[test]
    fn impervious_factor_cuts_infiltration() {
        let (_, open) = model().step(&StateVector::new(20.0, 0.0), 10.0, 0.0, 1.0, &params());
        let (_, paved) = model().step(&StateVector::new(20.0, 0.0), 10.0, 0.0, 0.5, &params());
        assert_relative_eq!(open.surface, 6.0);
        assert_relative_eq!(paved.surface, 8.0);
    }

    #[test]
    fn simulate_starts_from_parameter_storages() {
        let series = Series::new(vec![10.0; 400], vec![1.0; 400]).unwrap();
        let table: BTreeMap<i32, f64> = vec![(2010, 0.0), (2011, 20.0)].into_iter().collect();
        let forcing = Forcing::impervious(series, &ImperviousSchedule::new(table)).unwrap();
        let traj = model().simulate(&forcing, &params()).unwrap();
        assert_eq!(traj.len(), 400);
        assert_eq!(model().output_len(400), 400);
        assert!(traj.states.iter().flat_map(|s| s.levels()).all(|l| *l >= 0.0));
        assert!(traj.flow.iter().all(|q| *q >= 0.0));
    }

    #[test]
    fn params_roundtrip() {
        let p = params();
        assert_eq!(InfiltrationParams::from_slice(&p.to_vec()).unwrap(), p);
        assert_eq!(InfiltrationParams::bounds().len(), InfiltrationParams::NAMES.len());
    }
}
