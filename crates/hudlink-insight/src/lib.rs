pub mod classifier;
pub mod client;

pub use classifier::{
    ContextClassifier, InsightClient, InsightError, MIN_CLASSIFY_INTERVAL, UNKNOWN_CONTEXT,
};
pub use client::HttpInsightClient;
