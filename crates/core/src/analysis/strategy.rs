//! Rule-based trading signal derived from a price forecast.

use crate::domain::series::DailySeries;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "Strong Buy")]
    StrongBuy,
    Buy,
    Hold,
    Sell,
    #[serde(rename = "Strong Sell")]
    StrongSell,
    Error,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::StrongBuy => "Strong Buy",
            Action::Buy => "Buy",
            Action::Hold => "Hold",
            Action::Sell => "Sell",
            Action::StrongSell => "Strong Sell",
            Action::Error => "Error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub action: Action,
    pub reason: String,
    /// Display metrics. Prices and percentages are pre-formatted strings; the
    /// forecast horizon stays an integer.
    pub metrics: BTreeMap<String, Value>,
}

impl Recommendation {
    fn error(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Error,
            reason: reason.into(),
            metrics: BTreeMap::new(),
        }
    }
}

/// Classifies the projected trend into a discrete trading signal.
///
/// The forecast is assumed to immediately follow the historical series in
/// time. Empty inputs and non-positive last prices are reported through
/// `Action::Error` rather than failing.
pub fn recommend(historical: &DailySeries, forecast: &DailySeries) -> Recommendation {
    let (Some(last), Some(end)) = (historical.last(), forecast.last()) else {
        return Recommendation::error("Insufficient data for a recommendation.");
    };

    let last_price = last.value;
    let end_forecast_price = end.value;
    if last_price <= 0.0 {
        return Recommendation::error(format!(
            "Last historical price must be positive to project a change (got {last_price:.2})."
        ));
    }

    let horizon = forecast.len();
    let projected_change_pct = (end_forecast_price - last_price) / last_price * 100.0;

    let (action, reason) = if projected_change_pct > 5.0 {
        (
            Action::StrongBuy,
            format!(
                "The forecast predicts a significant price increase of {projected_change_pct:.2}% \
                 over the next {horizon} days. The model shows strong upward momentum, projecting \
                 a rise from ${last_price:.2} to ${end_forecast_price:.2}."
            ),
        )
    } else if projected_change_pct > 1.5 {
        (
            Action::Buy,
            format!(
                "A moderate upward trend is expected over the next {horizon} days, with a \
                 projected gain of {projected_change_pct:.2}%. This suggests a good entry point \
                 for a potential long position."
            ),
        )
    } else if projected_change_pct < -5.0 {
        (
            Action::StrongSell,
            format!(
                "The model forecasts a significant price drop of {projected_change_pct:.2}% over \
                 the next {horizon} days. This indicates strong bearish pressure, suggesting it \
                 may be time to exit positions."
            ),
        )
    } else if projected_change_pct < -1.5 {
        (
            Action::Sell,
            format!(
                "A moderate downward trend is predicted over the next {horizon} days, with a \
                 potential loss of {projected_change_pct:.2}%. Consider reducing exposure or \
                 exiting positions to mitigate risk."
            ),
        )
    } else {
        (
            Action::Hold,
            format!(
                "The forecast shows low volatility with a projected change of only \
                 {projected_change_pct:.2}%. The current trend is not strong enough to signal a \
                 clear buy or sell action. It is advisable to hold and monitor the asset."
            ),
        )
    };

    let mut metrics = BTreeMap::new();
    metrics.insert(
        "Current Price".to_string(),
        Value::from(format!("${last_price:.2}")),
    );
    metrics.insert(
        "Forecasted End Price".to_string(),
        Value::from(format!("${end_forecast_price:.2}")),
    );
    metrics.insert(
        "Projected Change".to_string(),
        Value::from(format!("{projected_change_pct:.2}%")),
    );
    metrics.insert(
        "Forecast Horizon (Days)".to_string(),
        Value::from(horizon as u64),
    );

    Recommendation {
        action,
        reason,
        metrics,
    }
}
