pub mod analysis;
pub mod domain;
pub mod market;
pub mod qa;
pub mod sentiment;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub anthropic_api_key: Option<String>,
        pub openai_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub market_data_api_key: Option<String>,
        pub sentiment_base_url: Option<String>,
        pub corpus_path: Option<String>,
        pub pro_api_token: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL").ok(),
                market_data_api_key: std::env::var("MARKET_DATA_API_KEY").ok(),
                sentiment_base_url: std::env::var("SENTIMENT_BASE_URL").ok(),
                corpus_path: std::env::var("CORPUS_PATH").ok(),
                pro_api_token: std::env::var("PRO_API_TOKEN").ok(),
            })
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_openai_api_key(&self) -> anyhow::Result<&str> {
            self.openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required")
        }

        pub fn require_market_data_base_url(&self) -> anyhow::Result<&str> {
            self.market_data_base_url
                .as_deref()
                .context("MARKET_DATA_BASE_URL is required")
        }

        pub fn require_sentiment_base_url(&self) -> anyhow::Result<&str> {
            self.sentiment_base_url
                .as_deref()
                .context("SENTIMENT_BASE_URL is required")
        }

        pub fn require_corpus_path(&self) -> anyhow::Result<&str> {
            self.corpus_path.as_deref().context("CORPUS_PATH is required")
        }
    }
}
