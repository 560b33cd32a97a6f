use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use findoc_core::analysis::anomaly::{detect_volume_anomalies, AnomalyParams, VolumeFlag};
use findoc_core::analysis::forecast::linear_forecast;
use findoc_core::analysis::strategy::{recommend, Recommendation};
use findoc_core::domain::series::SeriesPoint;
use findoc_core::market::provider::{HttpJsonMarketData, MarketDataClient};
use findoc_core::qa::llm::AnthropicClient;
use findoc_core::qa::retrieval::HttpEmbeddingsClient;
use findoc_core::qa::{QaAnswer, QaPipeline};
use findoc_core::sentiment::{HttpSentimentClassifier, SentimentClassifier, SentimentScore};
use findoc_core::time::us_market;

const DEFAULT_LOOKBACK_DAYS: i64 = 365;
const DEFAULT_FORECAST_DAYS: usize = 30;
const MAX_FORECAST_DAYS: usize = 90;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = findoc_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let market: Option<Arc<HttpJsonMarketData>> = match HttpJsonMarketData::from_settings(&settings)
    {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "market data not configured; analyze/forecast disabled");
            None
        }
    };

    let qa = build_qa_pipeline(&settings);
    let sentiment: Option<Arc<HttpSentimentClassifier>> = match settings.sentiment_base_url {
        Some(_) => match HttpSentimentClassifier::from_settings(&settings) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "sentiment classifier not configured; endpoint disabled");
                None
            }
        },
        None => {
            tracing::info!("SENTIMENT_BASE_URL not set; sentiment endpoint disabled");
            None
        }
    };

    let state = AppState {
        market,
        qa,
        sentiment,
        pro_api_token: settings.pro_api_token.clone(),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/status", get(api_status))
        .route("/api/analyze/:ticker", get(analyze_ticker))
        .route("/api/forecast/:ticker", get(forecast_ticker))
        .route("/api/qa", post(ask_question))
        .route("/api/sentiment", post(classify_sentiment))
        .route("/api/tools", get(premium_tools))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_qa_pipeline(settings: &findoc_core::config::Settings) -> Option<Arc<QaPipeline>> {
    let corpus_path = match settings.require_corpus_path() {
        Ok(p) => std::path::PathBuf::from(p),
        Err(e) => {
            tracing::info!(error = %e, "corpus not configured; qa endpoint disabled");
            return None;
        }
    };

    let embeddings = match HttpEmbeddingsClient::from_settings(settings) {
        Ok(c) => c,
        Err(e) => {
            tracing::info!(error = %e, "embeddings not configured; qa endpoint disabled");
            return None;
        }
    };

    let answerer = match AnthropicClient::from_settings(settings) {
        Ok(c) => c,
        Err(e) => {
            tracing::info!(error = %e, "answer model not configured; qa endpoint disabled");
            return None;
        }
    };

    Some(Arc::new(QaPipeline::new(
        Arc::new(embeddings),
        Arc::new(answerer),
        corpus_path,
    )))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    market: Option<Arc<HttpJsonMarketData>>,
    qa: Option<Arc<QaPipeline>>,
    sentiment: Option<Arc<HttpSentimentClassifier>>,
    pro_api_token: Option<String>,
}

async fn api_status(State(state): State<AppState>) -> Json<Value> {
    let mut features = Vec::new();
    if state.market.is_some() {
        features.push("stock_analysis");
        features.push("forecasting");
    }
    if state.qa.is_some() {
        features.push("qa_system");
    }
    if state.sentiment.is_some() {
        features.push("sentiment_analysis");
    }

    Json(json!({
        "status": "connected",
        "message": "findoc API is running",
        "features": features,
    }))
}

#[derive(Debug, Deserialize)]
struct AnalyzeParams {
    lookback_days: Option<i64>,
    window: Option<usize>,
    std_dev_factor: Option<f64>,
    as_of_date: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    ticker: String,
    as_of_date: NaiveDate,
    current_price: f64,
    daily_change: f64,
    latest_volume: f64,
    anomalies: Vec<VolumeFlag>,
}

async fn analyze_ticker(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<AnalyzeParams>,
) -> Result<Json<AnalyzeResponse>, StatusCode> {
    let Some(market) = &state.market else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let as_of = us_market::resolve_as_of_date(params.as_of_date.as_deref(), Utc::now())
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let lookback = params.lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS);
    let (start, end) = us_market::history_range(as_of, lookback)
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let anomaly_params = AnomalyParams {
        window: params.window.unwrap_or_else(|| AnomalyParams::default().window),
        std_dev_factor: params
            .std_dev_factor
            .unwrap_or_else(|| AnomalyParams::default().std_dev_factor),
    };
    anomaly_params.validate().map_err(|_| StatusCode::BAD_REQUEST)?;

    let history = market
        .fetch_daily_history(&ticker, start, end)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::BAD_GATEWAY
        })?;

    let closes = history.close_series().map_err(internal_error)?;
    let volumes = history.volume_series().map_err(internal_error)?;
    let Some(last_close) = closes.last().copied() else {
        return Err(StatusCode::NOT_FOUND);
    };

    let daily_change = match closes.points() {
        [.., prev, last] => last.value - prev.value,
        _ => 0.0,
    };
    let latest_volume = volumes.last().map(|p| p.value).unwrap_or(0.0);

    let flags = detect_volume_anomalies(&volumes, anomaly_params).map_err(internal_error)?;
    let anomalies = flags.into_iter().filter(|f| f.anomaly).collect();

    Ok(Json(AnalyzeResponse {
        ticker,
        as_of_date: as_of,
        current_price: last_close.value,
        daily_change,
        latest_volume,
        anomalies,
    }))
}

#[derive(Debug, Deserialize)]
struct ForecastParams {
    days: Option<usize>,
    lookback_days: Option<i64>,
    as_of_date: Option<String>,
}

#[derive(Debug, Serialize)]
struct ForecastResponse {
    ticker: String,
    as_of_date: NaiveDate,
    forecast: Vec<SeriesPoint>,
    recommendation: Recommendation,
}

async fn forecast_ticker(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<ForecastParams>,
) -> Result<Json<ForecastResponse>, StatusCode> {
    let Some(market) = &state.market else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let days = params.days.unwrap_or(DEFAULT_FORECAST_DAYS);
    if days < 1 || days > MAX_FORECAST_DAYS {
        return Err(StatusCode::BAD_REQUEST);
    }

    let as_of = us_market::resolve_as_of_date(params.as_of_date.as_deref(), Utc::now())
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let lookback = params.lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS);
    let (start, end) = us_market::history_range(as_of, lookback)
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let history = market
        .fetch_daily_history(&ticker, start, end)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::BAD_GATEWAY
        })?;

    let closes = history.close_series().map_err(internal_error)?;
    if closes.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    let forecast = linear_forecast(&closes, days).map_err(internal_error)?;
    let recommendation = recommend(&closes, &forecast);

    Ok(Json(ForecastResponse {
        ticker,
        as_of_date: as_of,
        forecast: forecast.points().to_vec(),
        recommendation,
    }))
}

#[derive(Debug, Deserialize)]
struct QaRequest {
    question: String,
}

async fn ask_question(
    State(state): State<AppState>,
    Json(req): Json<QaRequest>,
) -> Result<Json<QaAnswer>, StatusCode> {
    let Some(qa) = &state.qa else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    if req.question.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let answer = qa.ask(&req.question).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(answer))
}

#[derive(Debug, Deserialize)]
struct SentimentRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct SentimentResponse {
    #[serde(flatten)]
    score: SentimentScore,
    numeric: f64,
}

async fn classify_sentiment(
    State(state): State<AppState>,
    Json(req): Json<SentimentRequest>,
) -> Result<Json<SentimentResponse>, StatusCode> {
    let Some(sentiment) = &state.sentiment else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    if req.text.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let score = sentiment.classify(&req.text).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::BAD_GATEWAY
    })?;

    Ok(Json(SentimentResponse {
        numeric: score.label.numeric(),
        score,
    }))
}

async fn premium_tools(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorize_pro(&state, &headers)?;

    Ok(Json(json!({
        "premium_tools": [
            {"name": "TradeX", "status": "active", "description": "Stock comparison tool"},
            {"name": "VisualX", "status": "active", "description": "Advanced charting platform"},
            {"name": "HFTX", "status": "active", "description": "High-frequency trading simulator"},
        ]
    })))
}

// Pro access is decided here, once, against the configured token.
fn authorize_pro(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected) = state.pro_api_token.as_deref() else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &findoc_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_token(token: Option<&str>) -> AppState {
        AppState {
            market: None,
            qa: None,
            sentiment: None,
            pro_api_token: token.map(|t| t.to_string()),
        }
    }

    #[test]
    fn pro_requires_configured_token() {
        let state = state_with_token(None);
        assert_eq!(
            authorize_pro(&state, &HeaderMap::new()),
            Err(StatusCode::SERVICE_UNAVAILABLE)
        );
    }

    #[test]
    fn pro_rejects_missing_or_wrong_bearer() {
        let state = state_with_token(Some("secret"));
        assert_eq!(
            authorize_pro(&state, &HeaderMap::new()),
            Err(StatusCode::UNAUTHORIZED)
        );

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert_eq!(
            authorize_pro(&state, &headers),
            Err(StatusCode::UNAUTHORIZED)
        );
    }

    #[test]
    fn pro_accepts_matching_bearer() {
        let state = state_with_token(Some("secret"));
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert_eq!(authorize_pro(&state, &headers), Ok(()));
    }
}
