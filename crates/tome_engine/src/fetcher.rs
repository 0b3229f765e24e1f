use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tome_core::{Chapter, EndpointHealthTracker, FetchResult, DEFAULT_FAILURE_CEILING};
use tome_logging::{tome_debug, tome_info, tome_trace, tome_warn};

use crate::charset::decode_text;
use crate::decode::{decode, DecodedChapter};
use crate::{EndpointConfig, FetchOutput, Transport};

/// Retry and pacing policy for one chapter fetch.
///
/// Backoff after a failed attempt is `attempt * base_delay`, saturating at
/// `Duration::MAX`; every attempt is preceded by a random delay in `[jitter_min, jitter_max]`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries_per_endpoint: u32,
    pub base_delay: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub failure_ceiling: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries_per_endpoint: 3,
            base_delay: Duration::from_millis(400),
            jitter_min: Duration::from_millis(50),
            jitter_max: Duration::from_millis(150),
            failure_ceiling: DEFAULT_FAILURE_CEILING,
        }
    }
}

impl RetryPolicy {
    /// Pause before retrying after the `attempt`-th failure on an endpoint.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    fn jitter(&self) -> Duration {
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Health tracker shared by every worker of a run.
pub type SharedHealth = Arc<Mutex<EndpointHealthTracker>>;

enum Attempt {
    Content(DecodedChapter),
    /// Reachable but nothing usable: move on without retrying this endpoint.
    Soft(String),
    /// Transport failure: retry this endpoint after backoff.
    Transport(String),
}

/// Fetches one chapter through the configured endpoints with failover.
pub struct ChapterFetcher {
    transport: Arc<dyn Transport>,
    endpoints: Vec<EndpointConfig>,
    health: SharedHealth,
    policy: RetryPolicy,
}

impl ChapterFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: Vec<EndpointConfig>,
        health: SharedHealth,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            endpoints,
            health,
            policy,
        }
    }

    pub fn health(&self) -> &SharedHealth {
        &self.health
    }

    /// Never fails: exhaustion yields an unsuccessful [`FetchResult`], an
    /// interrupt a cancelled one.
    pub async fn fetch(&self, chapter: &Chapter, cancel: &CancellationToken) -> FetchResult {
        let ids: Vec<&str> = self.endpoints.iter().map(|e| e.id.as_str()).collect();
        let plan = self.lock_health().plan_attempt(&ids);

        for endpoint_id in plan {
            let Some(endpoint) = self.endpoints.iter().find(|e| e.id == endpoint_id) else {
                continue;
            };
            let url = match endpoint.url_for(&chapter.id) {
                Ok(url) => url,
                Err(err) => {
                    tome_warn!("Endpoint {} unusable: {}", endpoint.id, err);
                    self.lock_health().record_failure(&endpoint.id);
                    continue;
                }
            };

            for attempt in 1..=self.policy.max_retries_per_endpoint {
                if !self.pause(self.policy.jitter(), cancel).await {
                    return FetchResult::cancelled(chapter);
                }

                match self.attempt(endpoint, &url).await {
                    Attempt::Content(decoded) => {
                        self.lock_health().record_success(&endpoint.id);
                        tome_debug!(
                            "Chapter {} fetched from {} ({} lines)",
                            chapter.id,
                            endpoint.id,
                            decoded.paragraphs.len()
                        );
                        return FetchResult::succeeded(
                            chapter,
                            endpoint.id.clone(),
                            decoded.title,
                            decoded.paragraphs,
                        );
                    }
                    Attempt::Soft(reason) => {
                        tome_info!(
                            "Chapter {}: {} had no usable content ({})",
                            chapter.id,
                            endpoint.id,
                            reason
                        );
                        self.lock_health().record_failure(&endpoint.id);
                        break;
                    }
                    Attempt::Transport(reason) => {
                        tome_warn!(
                            "Chapter {}: {} attempt {}/{} failed: {}",
                            chapter.id,
                            endpoint.id,
                            attempt,
                            self.policy.max_retries_per_endpoint,
                            reason
                        );
                        self.lock_health().record_failure(&endpoint.id);
                        if attempt < self.policy.max_retries_per_endpoint {
                            let backoff = self.policy.backoff(attempt);
                            if !self.pause(backoff, cancel).await {
                                return FetchResult::cancelled(chapter);
                            }
                        }
                    }
                }
            }
        }

        tome_warn!("Chapter {} exhausted every endpoint", chapter.id);
        FetchResult::failed(chapter)
    }

    async fn attempt(&self, endpoint: &EndpointConfig, url: &str) -> Attempt {
        tome_trace!("GET {} via {}", url, endpoint.id);
        let output: FetchOutput = match self.transport.get(url).await {
            Ok(output) => output,
            Err(err) => return Attempt::Transport(err.to_string()),
        };
        let text = match decode_text(&output.bytes, output.metadata.content_type.as_deref()) {
            Ok(text) => text,
            Err(err) => return Attempt::Soft(err.to_string()),
        };
        match decode(&text, endpoint.format) {
            Ok(decoded) if !decoded.is_empty() => Attempt::Content(decoded),
            Ok(_) => Attempt::Soft("empty content".to_string()),
            Err(err) => Attempt::Soft(err.to_string()),
        }
    }

    /// Sleeps unless cancelled first; returns `false` on cancellation.
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn lock_health(&self) -> MutexGuard<'_, EndpointHealthTracker> {
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(400),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(1200));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(u64::MAX / 2),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(3), Duration::MAX);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter_min: Duration::from_millis(10),
            jitter_max: Duration::from_millis(20),
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let jitter = policy.jitter();
            assert!(jitter >= policy.jitter_min && jitter <= policy.jitter_max);
        }
    }
}
