use chrono::NaiveDate;
use findoc_core::analysis::anomaly::VolumeFlag;
use findoc_core::analysis::strategy::Recommendation;
use findoc_core::domain::series::DailySeries;
use findoc_core::qa::QaAnswer;
use findoc_core::sentiment::SentimentScore;

pub fn print_analysis(ticker: &str, as_of: NaiveDate, closes: &DailySeries, flags: &[VolumeFlag]) {
    println!("Analysis for {ticker} (as of {as_of})");

    if let Some(last) = closes.last() {
        println!("  Current price: ${:.2}", last.value);
    }
    if let [.., prev, last] = closes.points() {
        println!("  Daily change:  ${:+.2}", last.value - prev.value);
    }

    let anomalies: Vec<&VolumeFlag> = flags.iter().filter(|f| f.anomaly).collect();
    if anomalies.is_empty() {
        println!("  No significant volume anomalies detected.");
        return;
    }

    println!("  Volume anomalies ({}):", anomalies.len());
    for flag in anomalies {
        println!("    {}  {}", flag.date, flag.reason);
    }
}

pub fn print_forecast(ticker: &str, forecast: &DailySeries, recommendation: &Recommendation) {
    println!("Forecast for {ticker} ({} trading days)", forecast.len());
    if let (Some(first), Some(last)) = (forecast.first(), forecast.last()) {
        println!(
            "  {} ${:.2}  ->  {} ${:.2}",
            first.date, first.value, last.date, last.value
        );
    }

    println!("  Recommendation: {}", recommendation.action);
    println!("  {}", recommendation.reason);
    for (name, value) in &recommendation.metrics {
        match value {
            serde_json::Value::String(s) => println!("    {name}: {s}"),
            other => println!("    {name}: {other}"),
        }
    }
}

pub fn print_sentiment(score: &SentimentScore) {
    println!(
        "Sentiment: {:?} (score {:.4}, numeric {:+.0})",
        score.label,
        score.score,
        score.label.numeric()
    );
}

pub fn print_qa(question: &str, answer: &QaAnswer) {
    println!("Question: {question}");
    println!("Answer:   {}", answer.answer);
    println!(
        "  ({} excerpts, corpus {})",
        answer.context_chunks, answer.corpus_version
    );
}
