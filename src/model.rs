//! Simulation drivers: run a cascade over a forcing series and collect the trajectory.
use crate::errors::TankError;
use crate::forcing::Forcing;
use crate::params::{Catchment, ParamVector, Parameters};
use crate::state::StateVector;
use crate::tank::{Outlet, Tank, Topology};
use std::fs::File;

/// A rainfall-runoff model the calibrator can drive.
pub trait RunoffModel: Sync {
    /// Calibrated parameter set.
    type Params: ParamVector;

    /// Length of the trajectory produced from `steps` forcing steps.
    fn output_len(&self, steps: usize) -> usize;

    /// Check the fixed configuration against `forcing` before any step runs.
    fn validate(&self, forcing: &Forcing) -> Result<(), TankError>;

    /// Run the model over `forcing`.
    fn simulate(&self, forcing: &Forcing, params: &Self::Params) -> Result<Trajectory, TankError>;
}

/// Shape of the two-tank cascade built from a [Parameters] set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Variant {
    /// Upper tank with two side outlets (k1 at d1, k2 at d2) and percolation k3 drawing at
    /// once; lower tank drains through k4.
    Sugawara,
    /// Sugawara with a constant groundwater inflow `gw` [mm] into the lower tank.
    Groundwater {
        /// Lower tank recharge per step [mm].
        gw: f64,
    },
    /// Side outlets first, then percolation k3 from what is left.  With `d1 = 0` and
    /// `k2 = 0` this is a linear two-tank cascade.
    Staged,
}

impl Variant {
    /// Cascade for parameter set `p`.  The k1 outlet responds to impervious-area growth.
    pub fn topology(&self, p: &Parameters) -> Topology {
        let direct = Outlet::side(p.k1, p.d1).impervious();
        let fast = Outlet::side(p.k2, p.d2);
        let percolation = Outlet::percolation(p.k3);
        let upper = match self {
            Variant::Sugawara | Variant::Groundwater { .. } => {
                Tank::new().stage(vec![direct, fast, percolation])
            }
            Variant::Staged => Tank::new()
                .stage(vec![direct, fast])
                .stage(vec![percolation]),
        };
        let mut lower = Tank::new().stage(vec![Outlet::bottom(p.k4)]);
        if let Variant::Groundwater { gw } = self {
            lower = lower.recharge(*gw);
        }
        Topology::new(vec![upper, lower]).corrections(p.rfcf, p.ecorr)
    }
}

/// Whether the trajectory opens with the initial condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Layout {
    /// `n + 1` records, the first holding the initial state and a reported initial flow.
    IncludeInitial {
        /// Discharge reported for the initial record [m³/s].
        flow: f64,
    },
    /// One record per forcing step.
    StepsOnly,
}

impl Layout {
    /// Records produced from `steps` forcing steps.
    pub fn output_len(&self, steps: usize) -> usize {
        match self {
            Layout::IncludeInitial { .. } => steps + 1,
            Layout::StepsOnly => steps,
        }
    }
}

/// Simulated flow and storage, one record per step.
///
/// Flows are in m³/s and `surface + baseflow` equals `flow` up to rounding.  In an
/// [IncludeInitial](enum.Layout.html#variant.IncludeInitial) trajectory the reported
/// initial flow is booked as baseflow.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    /// Total discharge [m³/s].
    pub flow: Vec<f64>,
    /// Runoff from the upper tank [m³/s].
    pub surface: Vec<f64>,
    /// Runoff from the deeper tanks [m³/s].
    pub baseflow: Vec<f64>,
    /// Tank levels at the end of each step [mm].
    pub states: Vec<StateVector>,
}

impl Trajectory {
    /// Empty trajectory with room for `n` records.
    pub fn with_capacity(n: usize) -> Self {
        Trajectory {
            flow: Vec::with_capacity(n),
            surface: Vec::with_capacity(n),
            baseflow: Vec::with_capacity(n),
            states: Vec::with_capacity(n),
        }
    }

    /// Append one record.
    pub fn push(&mut self, flow: f64, surface: f64, baseflow: f64, state: StateVector) {
        self.flow.push(flow);
        self.surface.push(surface);
        self.baseflow.push(baseflow);
        self.states.push(state);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.flow.len()
    }

    /// Returns `true` if there are no records.
    pub fn is_empty(&self) -> bool {
        self.flow.is_empty()
    }

    /// Level of tank `i` over time.
    pub fn levels(&self, i: usize) -> Vec<f64> {
        self.states.iter().map(|s| s.level(i)).collect()
    }

    /// Upper tank level over time.
    pub fn s1(&self) -> Vec<f64> {
        self.levels(0)
    }

    /// Lower tank level over time.
    pub fn s2(&self) -> Vec<f64> {
        self.levels(1)
    }

    /// Write the trajectory to csv, one row per record with a column per tank.
    pub fn write(&self, path: &str) -> Result<(), TankError> {
        let tanks = self.states.first().map(|s| s.len()).unwrap_or(0);
        let mut wtr = csv::Writer::from_writer(File::create(path)?);
        let mut header = vec![
            "step".to_string(),
            "flow".to_string(),
            "surface".to_string(),
            "baseflow".to_string(),
        ];
        header.extend((1..=tanks).map(|i| format!("s{}", i)));
        wtr.write_record(&header)?;
        for (i, state) in self.states.iter().enumerate() {
            let mut row = vec![
                i.to_string(),
                self.flow[i].to_string(),
                self.surface[i].to_string(),
                self.baseflow[i].to_string(),
            ];
            row.extend((0..tanks).map(|t| state.level(t).to_string()));
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Run `topology` over `forcing` from `initial`, strictly step after step.
///
/// The only failures are a state that does not match the topology (before any step runs)
/// and a non-finite flow, which only arises from non-finite parameters.  Fluxes are never
/// negative, so the flow of each record is the converted sum of its components.
pub fn simulate(
    topology: &Topology,
    forcing: &Forcing,
    initial: &StateVector,
    catchment: &Catchment,
    layout: Layout,
) -> Result<Trajectory, TankError> {
    if initial.len() != topology.len() {
        return Err(TankError::StateSize {
            expected: topology.len(),
            found: initial.len(),
        });
    }
    let series = forcing.series();
    let mut traj = Trajectory::with_capacity(layout.output_len(series.len()));
    if let Layout::IncludeInitial { flow } = layout {
        traj.push(flow, 0.0, flow, initial.clone());
    }
    let mut state = initial.clone();
    for (t, (&p, &e)) in series.precip().iter().zip(series.evap()).enumerate() {
        let (next, fluxes) = topology.step(&state, p, e, forcing.factor(t), catchment);
        if !(fluxes.surface + fluxes.baseflow).is_finite() {
            return Err(TankError::NonFinite("simulated flow"));
        }
        traj.push(
            fluxes.flow,
            catchment.to_discharge(fluxes.surface),
            catchment.to_discharge(fluxes.baseflow),
            next.clone(),
        );
        state = next;
    }
    Ok(traj)
}

/// Two-tank model: a [Variant] plus catchment, initial state and output layout.
///
/// Built with a builder pattern.  The defaults are the Sugawara cascade over 145 km² at an
/// hourly step, both tanks starting at 10 mm, and an initial flow of 1 m³/s reported ahead
/// of the simulated steps.
///
/// ```
/// use tanks::prelude::*;
///
/// let model = TankModel::new()
///     .catchment(Catchment::new(100.0, 24.0)?)
///     .initial(StateVector::new(0.0, 0.0))
///     .layout(Layout::StepsOnly);
/// let forcing = Forcing::new(Series::new(vec![0.0, 10.0, 0.0, 5.0], vec![1.0; 4])?);
/// let traj = model.simulate(&forcing, &Parameters::default())?;
/// assert_eq!(traj.len(), 4);
/// # Ok::<(), TankError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TankModel {
    variant: Variant,
    catchment: Catchment,
    initial: StateVector,
    layout: Layout,
}

impl TankModel {
    /// Model with the default configuration.
    pub fn new() -> Self {
        TankModel {
            variant: Variant::Sugawara,
            catchment: Catchment::default(),
            initial: StateVector::default(),
            layout: Layout::IncludeInitial { flow: 1.0 },
        }
    }

    /// Cascade shape.
    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    /// Catchment area and time step.
    pub fn catchment(mut self, catchment: Catchment) -> Self {
        self.catchment = catchment;
        self
    }

    /// Tank levels at the start of the run.
    pub fn initial(mut self, state: StateVector) -> Self {
        self.initial = state;
        self
    }

    /// Whether the trajectory opens with the initial condition.
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Cascade for parameter set `params`.
    pub fn topology(&self, params: &Parameters) -> Topology {
        self.variant.topology(params)
    }
}

impl Default for TankModel {
    fn default() -> Self {
        TankModel::new()
    }
}

impl RunoffModel for TankModel {
    type Params = Parameters;

    fn output_len(&self, steps: usize) -> usize {
        self.layout.output_len(steps)
    }

    fn validate(&self, _forcing: &Forcing) -> Result<(), TankError> {
        if self.initial.len() != 2 {
            return Err(TankError::StateSize {
                expected: 2,
                found: self.initial.len(),
            });
        }
        Ok(())
    }

    fn simulate(&self, forcing: &Forcing, params: &Parameters) -> Result<Trajectory, TankError> {
        simulate(
            &self.topology(params),
            forcing,
            &self.initial,
            &self.catchment,
            self.layout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forcing::{ImperviousSchedule, Series};
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn params() -> Parameters {
        Parameters {
            k1: 0.5,
            k2: 0.2,
            k3: 0.1,
            k4: 0.3,
            d1: 2.0,
            d2: 5.0,
            rfcf: 1.0,
            ecorr: 1.0,
        }
    }

    fn forcing(precip: Vec<f64>) -> Forcing {
        let n = precip.len();
        Forcing::new(Series::new(precip, vec![1.0; n]).unwrap())
    }

    fn daily() -> TankModel {
        TankModel::new()
            .catchment(Catchment::new(100.0, 24.0).unwrap())
            .initial(StateVector::new(0.0, 0.0))
            .layout(Layout::StepsOnly)
    }

    #[test]
    fn default_layout_includes_initial_condition() {
        let f = forcing(vec![0.0, 3.0, 1.0]);
        let traj = TankModel::new().simulate(&f, &params()).unwrap();
        assert_eq!(traj.len(), 4);
        assert_eq!(traj.flow[0], 1.0);
        assert_eq!(traj.states[0], StateVector::new(10.0, 10.0));
    }

    #[test]
    fn steps_only_layout_matches_forcing() {
        let f = forcing(vec![0.0, 3.0, 1.0]);
        let traj = daily().simulate(&f, &params()).unwrap();
        assert_eq!(traj.len(), 3);
        assert_eq!(daily().output_len(3), 3);
    }

    #[test]
    fn components_sum_to_flow() {
        let f = forcing(vec![0.0, 10.0, 0.0, 5.0, 20.0, 0.0]);
        let traj = daily().simulate(&f, &params()).unwrap();
        for i in 0..traj.len() {
            assert_relative_eq!(traj.surface[i] + traj.baseflow[i], traj.flow[i]);
        }
    }

    #[test]
    fn groundwater_adds_baseflow() {
        let f = forcing(vec![0.0; 10]);
        let dry = daily().simulate(&f, &params()).unwrap();
        let fed = daily()
            .variant(Variant::Groundwater { gw: 1.0 })
            .simulate(&f, &params())
            .unwrap();
        assert_eq!(dry.flow.iter().sum::<f64>(), 0.0);
        assert!(fed.baseflow.iter().all(|q| *q > 0.0));
    }

    #[test]
    fn staged_variant_differs_from_simultaneous() {
        let f = forcing(vec![0.0, 10.0, 0.0, 5.0]);
        let a = daily().simulate(&f, &params()).unwrap();
        let b = daily().variant(Variant::Staged).simulate(&f, &params()).unwrap();
        // percolation reads a lower level once the side outlets have drained
        assert!(b.s2()[1] < a.s2()[1]);
        assert_relative_eq!(a.surface[1], b.surface[1]);
    }

    #[test]
    fn impervious_growth_reduces_direct_runoff() {
        let series = Series::new(vec![10.0; 730], vec![1.0; 730]).unwrap();
        let mut table = BTreeMap::new();
        table.insert(1989, 0.0);
        table.insert(1990, 50.0);
        let urban = Forcing::impervious(series.clone(), &ImperviousSchedule::new(table)).unwrap();
        let fixed = Forcing::new(series);
        let a = daily().simulate(&fixed, &params()).unwrap();
        let b = daily().simulate(&urban, &params()).unwrap();
        assert_eq!(a.flow[..365], b.flow[..365]);
        assert!(b.surface[700] < a.surface[700]);
    }

    #[test]
    fn truncated_land_use_forcing_simulates_every_step() {
        let series = Series::new(vec![10.0; 730], vec![1.0; 730]).unwrap();
        let mut table = BTreeMap::new();
        table.insert(1989, 0.0);
        table.insert(1990, 50.0);
        let urban = Forcing::impervious(series, &ImperviousSchedule::new(table)).unwrap();
        for n in &[1, 2, 366, 730] {
            let short = urban.head(*n).unwrap();
            let traj = daily().simulate(&short, &params()).unwrap();
            assert_eq!(traj.len(), *n);
        }
    }

    #[test]
    fn rejects_mismatched_initial_state() {
        let f = forcing(vec![1.0]);
        let model = daily().initial(StateVector::from_levels(vec![1.0, 1.0, 1.0]));
        assert!(matches!(
            model.validate(&f),
            Err(TankError::StateSize { expected: 2, found: 3 })
        ));
        assert!(model.simulate(&f, &params()).is_err());
    }

    #[test]
    fn non_finite_parameters_are_reported() {
        let f = forcing(vec![5.0, 5.0]);
        let mut p = params();
        p.k1 = f64::INFINITY;
        assert!(matches!(
            daily().simulate(&f, &p),
            Err(TankError::NonFinite(_))
        ));
    }

    #[test]
    fn writes_csv() {
        let f = forcing(vec![0.0, 10.0, 0.0]);
        let traj = daily().simulate(&f, &params()).unwrap();
        let path = std::env::temp_dir().join("tanks_trajectory.csv");
        let path = path.to_str().unwrap();
        traj.write(path).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("step,flow,surface,baseflow,s1,s2"));
        assert_eq!(text.lines().count(), 4);
    }
}
