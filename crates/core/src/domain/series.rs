use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Daily observations (closing price or trading volume) ordered by date.
/// Dates are strictly increasing; the series is immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    points: Vec<SeriesPoint>,
}

impl DailySeries {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_points(points: Vec<SeriesPoint>) -> anyhow::Result<Self> {
        for pair in points.windows(2) {
            anyhow::ensure!(
                pair[0].date < pair[1].date,
                "series dates must be strictly increasing: {} then {}",
                pair[0].date,
                pair[1].date
            );
        }
        Ok(Self { points })
    }

    /// Builds a series on consecutive calendar days starting at `start`.
    pub fn from_values(start: NaiveDate, values: &[f64]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &value)| SeriesPoint {
                date: start + chrono::Duration::days(i as i64),
                value,
            })
            .collect();
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn first(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }
}
