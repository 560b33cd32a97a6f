//! Least-squares trend extrapolation, the in-repo default price forecaster.

use crate::domain::series::{DailySeries, SeriesPoint};
use crate::time::us_market;

/// Fits an ordinary-least-squares line to the close series (index against
/// price) and extends it `horizon_days` trading days past the last
/// historical date. Degenerate inputs produce a flat line.
pub fn linear_forecast(history: &DailySeries, horizon_days: usize) -> anyhow::Result<DailySeries> {
    anyhow::ensure!(horizon_days >= 1, "horizon must be >= 1 (got {horizon_days})");
    let last = history
        .last()
        .ok_or_else(|| anyhow::anyhow!("history must be non-empty"))?;

    let values: Vec<f64> = history.values().collect();
    let (intercept, slope) = fit_line(&values);

    let n = values.len() as f64;
    let points = us_market::next_business_days(last.date, horizon_days)
        .into_iter()
        .enumerate()
        .map(|(i, date)| SeriesPoint {
            date,
            value: intercept + slope * (n + i as f64),
        })
        .collect();

    DailySeries::from_points(points)
}

/// OLS fit of y over indices 0..n, returning (intercept, slope).
fn fit_line(y: &[f64]) -> (f64, f64) {
    let n = y.len() as f64;
    if y.len() < 2 {
        return (y.first().copied().unwrap_or(0.0), 0.0);
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean: f64 = y.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &yi) in y.iter().enumerate() {
        let xi = i as f64;
        num += (xi - x_mean) * (yi - y_mean);
        den += (xi - x_mean) * (xi - x_mean);
    }
    if den.abs() < 1e-12 {
        return (y_mean, 0.0);
    }
    let slope = num / den;
    (y_mean - slope * x_mean, slope)
}
