pub mod anomaly;
pub mod forecast;
pub mod strategy;
