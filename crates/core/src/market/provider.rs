use crate::config::Settings;
use crate::market::types::{CandleHistoryResponse, DailyCandle};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/daily_candles";
const DEFAULT_RETRIES: u32 = 3;

#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CandleHistoryResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonMarketData {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonMarketData {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_market_data_base_url()?.to_string();
        let api_key = settings.market_data_api_key.clone();

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let path = std::env::var("MARKET_DATA_CANDLES_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CandleHistoryResponse> {
        let url = self.url();
        let headers = self.headers()?;

        let res = self
            .http
            .get(url)
            .headers(headers)
            .query(&[
                ("ticker", ticker.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
            ])
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        if !status.is_success() {
            anyhow::bail!("market data HTTP {status}: {text}");
        }

        serde_json::from_str::<CandleHistoryResponse>(&text)
            .with_context(|| format!("failed to parse market data response: {text}"))
    }

    fn validate(&self, resp: &CandleHistoryResponse, ticker: &str) -> Result<()> {
        anyhow::ensure!(
            resp.ticker == ticker,
            "market data ticker mismatch: expected {ticker}, got {}",
            resp.ticker
        );

        for pair in resp.candles.windows(2) {
            anyhow::ensure!(
                pair[0].date < pair[1].date,
                "market data candles out of order: {} then {}",
                pair[0].date,
                pair[1].date
            );
        }

        for candle in &resp.candles {
            validate_candle(candle)?;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl MarketDataClient for HttpJsonMarketData {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CandleHistoryResponse> {
        anyhow::ensure!(!ticker.trim().is_empty(), "ticker must be non-empty");
        anyhow::ensure!(start <= end, "start {start} must not be after end {end}");

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let res = self.fetch_once(ticker, start, end).await;
            match res {
                Ok(parsed) => {
                    self.validate(&parsed, ticker)?;
                    return Ok(parsed);
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn validate_candle(candle: &DailyCandle) -> Result<()> {
    anyhow::ensure!(
        candle.low <= candle.high,
        "candle low {} above high {} on {}",
        candle.low,
        candle.high,
        candle.date
    );
    anyhow::ensure!(
        candle.volume >= 0.0,
        "negative volume {} on {}",
        candle.volume,
        candle.date
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(candles: serde_json::Value) -> CandleHistoryResponse {
        serde_json::from_value(json!({"ticker": "AAPL", "candles": candles})).unwrap()
    }

    fn client() -> HttpJsonMarketData {
        HttpJsonMarketData {
            http: reqwest::Client::new(),
            base_url: "https://data.example.com/".to_string(),
            api_key: None,
            path: DEFAULT_PATH.to_string(),
            retries: DEFAULT_RETRIES,
        }
    }

    #[test]
    fn url_joins_base_and_path() {
        assert_eq!(
            client().url(),
            "https://data.example.com/v1/daily_candles"
        );
    }

    #[test]
    fn parses_expected_shape() {
        let resp = response(json!([
            {"date": "2026-01-05", "open": 100.0, "high": 103.0, "low": 99.0, "close": 102.0, "volume": 1000.0}
        ]));
        assert_eq!(resp.candles.len(), 1);
        assert_eq!(resp.candles[0].close, 102.0);
    }

    #[test]
    fn validate_rejects_ticker_mismatch() {
        let resp = response(json!([]));
        assert!(client().validate(&resp, "MSFT").is_err());
        assert!(client().validate(&resp, "AAPL").is_ok());
    }

    #[test]
    fn validate_rejects_out_of_order_dates() {
        let resp = response(json!([
            {"date": "2026-01-06", "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 1.0},
            {"date": "2026-01-05", "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 1.0}
        ]));
        assert!(client().validate(&resp, "AAPL").is_err());
    }

    #[test]
    fn validate_rejects_inverted_candle_and_negative_volume() {
        let inverted = response(json!([
            {"date": "2026-01-05", "open": 1.0, "high": 1.0, "low": 2.0, "close": 1.0, "volume": 1.0}
        ]));
        assert!(client().validate(&inverted, "AAPL").is_err());

        let negative = response(json!([
            {"date": "2026-01-05", "open": 1.0, "high": 2.0, "low": 1.0, "close": 1.0, "volume": -5.0}
        ]));
        assert!(client().validate(&negative, "AAPL").is_err());
    }
}
