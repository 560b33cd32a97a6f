use crate::domain::series::{DailySeries, SeriesPoint};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyCandle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleHistoryResponse {
    pub ticker: String,
    pub candles: Vec<DailyCandle>,
}

impl CandleHistoryResponse {
    pub fn close_series(&self) -> anyhow::Result<DailySeries> {
        DailySeries::from_points(
            self.candles
                .iter()
                .map(|c| SeriesPoint { date: c.date, value: c.close })
                .collect(),
        )
    }

    pub fn volume_series(&self) -> anyhow::Result<DailySeries> {
        DailySeries::from_points(
            self.candles
                .iter()
                .map(|c| SeriesPoint { date: c.date, value: c.volume })
                .collect(),
        )
    }
}
