use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use findoc_core::analysis::anomaly::{detect_volume_anomalies, AnomalyParams};
use findoc_core::analysis::forecast::linear_forecast;
use findoc_core::analysis::strategy::recommend;
use findoc_core::market::provider::{HttpJsonMarketData, MarketDataClient};
use findoc_core::qa::llm::AnthropicClient;
use findoc_core::qa::retrieval::HttpEmbeddingsClient;
use findoc_core::qa::QaPipeline;
use findoc_core::sentiment::{HttpSentimentClassifier, SentimentClassifier};
use findoc_core::time::us_market;

mod report;

#[derive(Debug, Parser)]
#[command(name = "findoc_cli")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch recent history for a ticker and flag volume anomalies.
    Analyze {
        ticker: String,

        /// Market as-of date (YYYY-MM-DD). Defaults to the latest completed
        /// trading date.
        #[arg(long)]
        as_of_date: Option<String>,

        #[arg(long, default_value_t = 365)]
        lookback_days: i64,

        #[arg(long, default_value_t = 30)]
        window: usize,

        #[arg(long, default_value_t = 2.5)]
        std_dev_factor: f64,
    },

    /// Forecast a ticker and print the trading recommendation.
    Forecast {
        ticker: String,

        #[arg(long)]
        as_of_date: Option<String>,

        #[arg(long, default_value_t = 365)]
        lookback_days: i64,

        #[arg(long, default_value_t = 30)]
        days: usize,
    },

    /// Classify the sentiment of a piece of financial text.
    Sentiment { text: String },

    /// Ask a question against the configured document corpus.
    Qa { question: String },
}

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

    let args = Args::parse();

    let result = run(&settings, args.command).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
    }
    result
}

async fn run(settings: &findoc_core::config::Settings, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Analyze {
            ticker,
            as_of_date,
            lookback_days,
            window,
            std_dev_factor,
        } => {
            let market = HttpJsonMarketData::from_settings(settings)?;
            let as_of = us_market::resolve_as_of_date(as_of_date.as_deref(), chrono::Utc::now())?;
            let (start, end) = us_market::history_range(as_of, lookback_days)?;

            let history = market.fetch_daily_history(&ticker, start, end).await?;
            let closes = history.close_series()?;
            let volumes = history.volume_series()?;

            let flags = detect_volume_anomalies(
                &volumes,
                AnomalyParams { window, std_dev_factor },
            )?;

            report::print_analysis(&ticker, as_of, &closes, &flags);
        }

        Command::Forecast {
            ticker,
            as_of_date,
            lookback_days,
            days,
        } => {
            let market = HttpJsonMarketData::from_settings(settings)?;
            let as_of = us_market::resolve_as_of_date(as_of_date.as_deref(), chrono::Utc::now())?;
            let (start, end) = us_market::history_range(as_of, lookback_days)?;

            let history = market.fetch_daily_history(&ticker, start, end).await?;
            let closes = history.close_series()?;
            anyhow::ensure!(!closes.is_empty(), "no price history for {ticker}");

            let forecast = linear_forecast(&closes, days)?;
            let recommendation = recommend(&closes, &forecast);

            report::print_forecast(&ticker, &forecast, &recommendation);
        }

        Command::Sentiment { text } => {
            let classifier = HttpSentimentClassifier::from_settings(settings)?;
            let score = classifier.classify(&text).await?;
            report::print_sentiment(&score);
        }

        Command::Qa { question } => {
            let corpus_path = settings.require_corpus_path()?.to_string();
            let embeddings = HttpEmbeddingsClient::from_settings(settings)?;
            let answerer = AnthropicClient::from_settings(settings)?;
            let pipeline = QaPipeline::new(
                Arc::new(embeddings),
                Arc::new(answerer),
                corpus_path.into(),
            );

            let answer = pipeline
                .ask(&question)
                .await
                .context("question answering failed")?;
            report::print_qa(&question, &answer);
        }
    }

    Ok(())
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
