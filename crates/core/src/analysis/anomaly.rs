//! Trading-volume spike detection against a trailing rolling baseline.

use crate::domain::series::{DailySeries, SeriesPoint};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct AnomalyParams {
    /// Trailing window length, in observations, ending at the evaluated day.
    pub window: usize,
    /// A day is anomalous when its volume exceeds mean + factor * std over the window.
    pub std_dev_factor: f64,
}

impl Default for AnomalyParams {
    fn default() -> Self {
        Self {
            window: 30,
            std_dev_factor: 2.5,
        }
    }
}

impl AnomalyParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.window >= 1, "window must be >= 1 (got {})", self.window);
        anyhow::ensure!(
            self.std_dev_factor > 0.0,
            "std_dev_factor must be > 0 (got {})",
            self.std_dev_factor
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeFlag {
    pub date: NaiveDate,
    pub volume: f64,
    pub anomaly: bool,
    /// Empty unless the day is flagged.
    pub reason: String,
}

/// Flags days whose volume significantly exceeds the trailing rolling baseline.
///
/// Days whose window statistics are undefined (fewer than `window` observations,
/// a window too short for a sample deviation, or zero variance) are never
/// flagged. Pure function of its inputs.
pub fn detect_volume_anomalies(
    volumes: &DailySeries,
    params: AnomalyParams,
) -> anyhow::Result<Vec<VolumeFlag>> {
    params.validate()?;

    let points = volumes.points();
    let mut out = Vec::with_capacity(points.len());

    for (i, point) in points.iter().enumerate() {
        let mut anomaly = false;
        let mut reason = String::new();

        if i + 1 >= params.window {
            let window = &points[i + 1 - params.window..=i];
            if let Some((mean, std)) = rolling_stats(window) {
                if std > 0.0 && point.value > mean + params.std_dev_factor * std {
                    anomaly = true;
                    reason = format!(
                        "Volume of {} was {:.1}x higher than the {}-day average.",
                        format_count(point.value),
                        point.value / mean,
                        params.window
                    );
                }
            }
        }

        out.push(VolumeFlag {
            date: point.date,
            volume: point.value,
            anomaly,
            reason,
        });
    }

    Ok(out)
}

/// Mean and sample standard deviation, or None when the sample deviation is
/// undefined (fewer than two observations).
fn rolling_stats(window: &[SeriesPoint]) -> Option<(f64, f64)> {
    let n = window.len();
    if n < 2 {
        return None;
    }
    let mean = window.iter().map(|p| p.value).sum::<f64>() / n as f64;
    let sq_diff: f64 = window.iter().map(|p| (p.value - mean).powi(2)).sum();
    let std = (sq_diff / (n as f64 - 1.0)).sqrt();
    Some((mean, std))
}

/// Renders a volume with thousands separators, e.g. 1234567 -> "1,234,567".
fn format_count(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn volume_series(values: &[f64]) -> DailySeries {
        DailySeries::from_values(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), values)
    }

    #[test]
    fn no_flags_before_window_fills() {
        let mut values = vec![100.0; 40];
        // Spikes inside the warm-up stretch must stay unflagged.
        values[5] = 10_000.0;
        values[28] = 10_000.0;
        let flags =
            detect_volume_anomalies(&volume_series(&values), AnomalyParams::default()).unwrap();
        for flag in flags.iter().take(29) {
            assert!(!flag.anomaly);
            assert!(flag.reason.is_empty());
        }
    }

    #[test]
    fn constant_series_never_flags() {
        let flags = detect_volume_anomalies(&volume_series(&[250.0; 120]), AnomalyParams::default())
            .unwrap();
        assert!(flags.iter().all(|f| !f.anomaly));
    }

    #[test]
    fn spike_after_constant_baseline_is_flagged() {
        let mut values = vec![100.0; 100];
        values[30] = 500.0;
        let flags =
            detect_volume_anomalies(&volume_series(&values), AnomalyParams::default()).unwrap();

        assert!(flags[30].anomaly);
        // Trailing mean at day 31 includes the spike: 3400/30, so 500 is 4.4x it.
        assert!(flags[30].reason.contains("500"));
        assert!(flags[30].reason.contains("4.4x higher"));
        assert!(flags[30].reason.contains("30-day average"));

        let flagged: Vec<usize> = flags
            .iter()
            .enumerate()
            .filter(|(_, f)| f.anomaly)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(flagged, vec![30]);
    }

    #[test]
    fn raising_std_dev_factor_only_unflags() {
        let values: Vec<f64> = (0..200)
            .map(|i| 100.0 + ((i * 37) % 23) as f64 + if i % 41 == 0 { 400.0 } else { 0.0 })
            .collect();
        let series = volume_series(&values);

        let loose = detect_volume_anomalies(
            &series,
            AnomalyParams { window: 30, std_dev_factor: 1.0 },
        )
        .unwrap();
        let strict = detect_volume_anomalies(
            &series,
            AnomalyParams { window: 30, std_dev_factor: 3.0 },
        )
        .unwrap();

        for (l, s) in loose.iter().zip(&strict) {
            if s.anomaly {
                assert!(l.anomaly, "day {} flagged at 3.0 but not at 1.0", s.date);
            }
        }
    }

    #[test]
    fn empty_series_yields_empty_output() {
        let flags =
            detect_volume_anomalies(&DailySeries::new(), AnomalyParams::default()).unwrap();
        assert!(flags.is_empty());
    }

    #[test]
    fn series_shorter_than_window_has_no_flags() {
        let flags =
            detect_volume_anomalies(&volume_series(&[100.0, 9_000.0]), AnomalyParams::default())
                .unwrap();
        assert_eq!(flags.len(), 2);
        assert!(flags.iter().all(|f| !f.anomaly));
    }

    #[test]
    fn window_of_one_never_flags() {
        // A single-observation window has no sample deviation.
        let flags = detect_volume_anomalies(
            &volume_series(&[100.0, 100.0, 5_000.0]),
            AnomalyParams { window: 1, std_dev_factor: 2.5 },
        )
        .unwrap();
        assert!(flags.iter().all(|f| !f.anomaly));
    }

    #[test]
    fn rejects_invalid_params() {
        let series = volume_series(&[1.0, 2.0]);
        assert!(detect_volume_anomalies(
            &series,
            AnomalyParams { window: 0, std_dev_factor: 2.5 }
        )
        .is_err());
        assert!(detect_volume_anomalies(
            &series,
            AnomalyParams { window: 30, std_dev_factor: 0.0 }
        )
        .is_err());
    }

    #[test]
    fn repeated_calls_are_identical() {
        let mut values = vec![100.0; 80];
        values[50] = 700.0;
        let series = volume_series(&values);

        let first = detect_volume_anomalies(&series, AnomalyParams::default()).unwrap();
        let second = detect_volume_anomalies(&series, AnomalyParams::default()).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn format_count_groups_thousands() {
        assert_eq!(format_count(500.0), "500");
        assert_eq!(format_count(1_234_567.0), "1,234,567");
        assert_eq!(format_count(1_000.0), "1,000");
    }
}
