/*!
* # Tanks - A library for conceptual tank rainfall-runoff models.
* A tank model routes rainfall through a cascade of reservoirs.  Each tank holds a depth of
* water and releases it through side outlets above a threshold height, a bottom outlet, and a
* percolation outlet into the tank below.  Upper tanks produce the quick surface response of a
* catchment, lower tanks the slow baseflow.  The functions in this crate simulate such cascades
* over a forcing record of precipitation and evapotranspiration, score the simulated flow
* against an observed record with the Nash-Sutcliffe Efficiency, and calibrate the outlet
* coefficients and thresholds with a bounded quasi-Newton search.
*
* Urbanization can be folded in through a yearly projection of impervious area.  The direct
* runoff coefficient is divided by `(1 + fraction / 100)^exponent`, so that outlet slows as
* the catchment is paved over.
*
*  ## Quick Start
*
* To use tanks, add it to your `Cargo.toml`
* ```toml
* [dependencies]
* tanks = "^0.1.0"
* ```
*
*  - Load the crate prelude in the preamble of your `main.rs`.
*  - Build a model, simulate, and calibrate against an observed record:
* ```rust
* use tanks::prelude::*;
*
* fn main() -> Result<(), TankError> {
*     // daily forcing over a 100 km² catchment
*     let forcing = Forcing::new(utils::synthetic_forcing(120, 7)?);
*     let model = TankModel::new()
*         .catchment(Catchment::new(100.0, 24.0)?)
*         .initial(StateVector::new(5.0, 20.0))
*         .layout(Layout::StepsOnly);
*
*     // stand-in for a gauged record
*     let truth = Parameters { k1: 0.3, d2: 0.5, ..Parameters::default() };
*     let observed = model.simulate(&forcing, &truth)?.flow;
*
*     let calibrator = Calibrator::new(&model, &forcing, &observed, CalibrationConfig::default())?;
*     let fit = calibrator.calibrate()?;
*     assert!(fit.nse > 0.9);
*     Ok(())
* }
* ```
*
* Create models and land-use schedules using a builder pattern.  First make a default model
* using [new](model/struct.TankModel.html#method.new), then adjust it with the
* [variant](model/struct.TankModel.html#method.variant),
* [catchment](model/struct.TankModel.html#method.catchment),
* [initial](model/struct.TankModel.html#method.initial) and
* [layout](model/struct.TankModel.html#method.layout) methods.
*
* ```rust
* use tanks::prelude::*;
* use std::collections::BTreeMap;
*
* let table: BTreeMap<i32, f64> = vec![(2000, 10.0), (2001, 12.5)].into_iter().collect();
* let schedule = ImperviousSchedule::new(table).exponent(2);
* let series = Series::new(vec![5.0; 400], vec![1.0; 400])?;
* let forcing = Forcing::impervious(series, &schedule)?;
*
* let model = TankModel::new().variant(Variant::Groundwater { gw: 0.1 });
* let traj = model.simulate(&forcing, &Parameters::default())?;
* // the initial condition leads the record
* assert_eq!(traj.len(), 401);
* # Ok::<(), TankError>(())
* ```
*/

#![warn(missing_docs)]
pub mod calibrate;
pub mod errors;
pub mod forcing;
pub mod integrated;
pub mod metrics;
pub mod model;
pub mod optimize;
pub mod params;
pub mod plot;
pub mod state;
pub mod tank;
pub mod utils;

/// Common imports.
pub mod prelude {
    pub use crate::calibrate::{Calibration, CalibrationConfig, Calibrator};
    pub use crate::errors::TankError;
    pub use crate::forcing::{Forcing, ImperviousSchedule, LandUse, Series};
    pub use crate::integrated::{InfiltrationParams, IntegratedModel};
    pub use crate::metrics;
    pub use crate::model::{Layout, RunoffModel, TankModel, Trajectory, Variant};
    pub use crate::optimize::{Config, Status};
    pub use crate::params::{Bounds, Catchment, ParamVector, Parameters};
    pub use crate::plot;
    pub use crate::state::StateVector;
    pub use crate::tank::{Outlet, Route, Tank, Topology};
    pub use crate::utils;
}
