use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use hudlink_foundation::SharedClock;
use hudlink_telemetry::SessionMetrics;
use hudlink_vision::EncodedFrame;

/// Sentinel label when the context cannot be determined.
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Classification never runs more often than this, regardless of tick rate.
pub const MIN_CLASSIFY_INTERVAL: Duration = Duration::from_secs(5);

/// Shown when the advisory lookup fails or returns nothing.
const FALLBACK_ADVISORIES: &[&str] = &[
    "Keep an eye on your minimap",
    "Track your resources before committing to a fight",
    "Play to your win condition",
];

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response: {0}")]
    Malformed(String),
}

/// Stateless classification/advisory endpoints.
#[async_trait]
pub trait InsightClient: Send + Sync + 'static {
    /// Short label for the application/game visible in the frame.
    async fn classify_frame(&self, jpeg: &[u8]) -> Result<String, InsightError>;

    /// Small list of advisory strings for the given context label.
    async fn advisories_for(&self, label: &str) -> Result<Vec<String>, InsightError>;
}

/// Clears the in-flight slot when the classification call settles, no
/// matter how it settles.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Periodic screen-context detection with a single-slot in-flight guard.
///
/// `observe` is called from the sampling tick with that tick's frame. At
/// most one classification call is outstanding at any time, enforced by an
/// atomic compare-and-set rather than tick-loop discipline.
pub struct ContextClassifier {
    client: Arc<dyn InsightClient>,
    clock: SharedClock,
    metrics: SessionMetrics,
    in_flight: Arc<AtomicBool>,
    last_issued: Mutex<Option<Instant>>,
}

impl ContextClassifier {
    pub fn new(client: Arc<dyn InsightClient>, clock: SharedClock, metrics: SessionMetrics) -> Self {
        Self {
            client,
            clock,
            metrics,
            in_flight: Arc::new(AtomicBool::new(false)),
            last_issued: Mutex::new(None),
        }
    }

    /// Offer this tick's frame. Issues a classification call only when the
    /// minimum interval has elapsed and no call is in flight; returns
    /// whether a call was issued.
    pub fn observe(&self, frame: &EncodedFrame) -> bool {
        let now = self.clock.now();
        {
            let last = self.last_issued.lock();
            if let Some(issued_at) = *last {
                if now.duration_since(issued_at) < MIN_CLASSIFY_INTERVAL {
                    return false;
                }
            }
        }

        // Claim the single slot before anything else; losing the race means
        // a call is already pending.
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        *self.last_issued.lock() = Some(now);

        let client = self.client.clone();
        let metrics = self.metrics.clone();
        let guard = InFlightGuard(self.in_flight.clone());
        let jpeg = frame.jpeg.clone();

        tokio::spawn(async move {
            let _guard = guard;

            let label = match client.classify_frame(&jpeg).await {
                Ok(label) => normalize_label(&label),
                Err(err) => {
                    tracing::warn!("Classification failed: {}", err);
                    UNKNOWN_CONTEXT.to_string()
                }
            };

            let previous = metrics.context_label();
            if label != previous && label != UNKNOWN_CONTEXT {
                tracing::info!("Context changed: {} -> {}", previous, label);
                let advisories = match client.advisories_for(&label).await {
                    Ok(list) if !list.is_empty() => list,
                    Ok(_) => fallback_advisories(),
                    Err(err) => {
                        tracing::warn!("Advisory lookup failed: {}", err);
                        fallback_advisories()
                    }
                };
                metrics.replace_advisories(advisories);
            }
            metrics.set_context_label(&label);
        });

        true
    }

    /// True exactly while a classification call is pending.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

fn normalize_label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNKNOWN_CONTEXT.to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn fallback_advisories() -> Vec<String> {
    FALLBACK_ADVISORIES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_padded_labels_normalize() {
        assert_eq!(normalize_label(""), UNKNOWN_CONTEXT);
        assert_eq!(normalize_label("   "), UNKNOWN_CONTEXT);
        assert_eq!(normalize_label("  Starfall Arena \n"), "Starfall Arena");
    }
}
