//! Hydrograph plots.
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;

/// Draw simulated (blue) against observed (black) flow to a PNG at `path`.
///
/// Only the two lines are drawn, no labels, so no font backend is required.  Both series
/// share the time axis; the shorter one simply ends early.
pub fn hydrograph(
    simulated: &[f64],
    observed: &[f64],
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let steps = simulated.len().max(observed.len()).max(2);
    let ymax = simulated
        .iter()
        .chain(observed)
        .cloned()
        .filter(|q| q.is_finite())
        .fold(0.0, f64::max);
    let ymax = if ymax > 0.0 { ymax * 1.05 } else { 1.0 };

    let root = BitMapBackend::new(path, (1024, 480)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.margin(10, 10, 10, 10);
    let mut chart = ChartBuilder::on(&root).build_cartesian_2d(0.0..(steps - 1) as f64, 0.0..ymax)?;

    chart.draw_series(LineSeries::new(
        observed.iter().enumerate().map(|(t, q)| (t as f64, *q)),
        &BLACK,
    ))?;
    chart.draw_series(LineSeries::new(
        simulated.iter().enumerate().map(|(t, q)| (t as f64, *q)),
        &BLUE,
    ))?;
    root.present()?;
    Ok(())
}
