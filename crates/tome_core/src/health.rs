use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use tome_logging::tome_debug;

/// Default number of consecutive failures after which an endpoint is
/// skipped for one fetch attempt.
pub const DEFAULT_FAILURE_CEILING: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStat {
    pub endpoint_id: String,
    pub consecutive_failures: u32,
    pub last_success: Option<Instant>,
}

impl EndpointStat {
    fn new(endpoint_id: &str) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            consecutive_failures: 0,
            last_success: None,
        }
    }
}

/// Per-run record of endpoint health.
///
/// Built once per run and shared between workers behind a lock; it is never
/// persisted. Unknown endpoints behave as healthy endpoints that have never
/// succeeded.
#[derive(Debug, Clone)]
pub struct EndpointHealthTracker {
    stats: HashMap<String, EndpointStat>,
    failure_ceiling: u32,
}

impl Default for EndpointHealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_CEILING)
    }
}

impl EndpointHealthTracker {
    pub fn new(failure_ceiling: u32) -> Self {
        Self {
            stats: HashMap::new(),
            failure_ceiling,
        }
    }

    pub fn failure_ceiling(&self) -> u32 {
        self.failure_ceiling
    }

    pub fn stat(&self, endpoint_id: &str) -> Option<&EndpointStat> {
        self.stats.get(endpoint_id)
    }

    pub fn consecutive_failures(&self, endpoint_id: &str) -> u32 {
        self.stats
            .get(endpoint_id)
            .map_or(0, |stat| stat.consecutive_failures)
    }

    /// Orders endpoints least-likely-to-fail first: fewest consecutive
    /// failures, then most recent success. Never-succeeded endpoints sort last
    /// among equal failure counts; full ties keep the input order.
    pub fn rank<S: AsRef<str>>(&self, endpoints: &[S]) -> Vec<String> {
        let mut ranked: Vec<(&str, u32, Option<Instant>)> = endpoints
            .iter()
            .map(|id| {
                let id = id.as_ref();
                let stat = self.stats.get(id);
                (
                    id,
                    stat.map_or(0, |s| s.consecutive_failures),
                    stat.and_then(|s| s.last_success),
                )
            })
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| newest_first(a.2, b.2)));
        ranked.into_iter().map(|(id, _, _)| id.to_string()).collect()
    }

    /// Ranks endpoints for one fetch attempt, leaving out those above the
    /// failure ceiling. Every skip decays the endpoint's counter by one so a
    /// degraded endpoint comes back on a later attempt. When every endpoint is
    /// degraded nothing is skipped.
    pub fn plan_attempt<S: AsRef<str>>(&mut self, endpoints: &[S]) -> Vec<String> {
        let ranked = self.rank(endpoints);
        let ceiling = self.failure_ceiling;
        let all_degraded = ranked
            .iter()
            .all(|id| self.consecutive_failures(id) > ceiling);
        if all_degraded {
            return ranked;
        }

        let mut admitted = Vec::with_capacity(ranked.len());
        for id in ranked {
            match self.stats.get_mut(&id) {
                Some(stat) if stat.consecutive_failures > ceiling => {
                    stat.consecutive_failures -= 1;
                    tome_debug!(
                        "Skipping degraded endpoint {} (failures now {})",
                        id,
                        stat.consecutive_failures
                    );
                }
                _ => admitted.push(id),
            }
        }
        admitted
    }

    pub fn record_success(&mut self, endpoint_id: &str) {
        self.record_success_at(endpoint_id, Instant::now());
    }

    pub fn record_success_at(&mut self, endpoint_id: &str, at: Instant) {
        let stat = self.entry(endpoint_id);
        stat.consecutive_failures = 0;
        stat.last_success = Some(at);
    }

    pub fn record_failure(&mut self, endpoint_id: &str) {
        let stat = self.entry(endpoint_id);
        stat.consecutive_failures = stat.consecutive_failures.saturating_add(1);
    }

    fn entry(&mut self, endpoint_id: &str) -> &mut EndpointStat {
        self.stats
            .entry(endpoint_id.to_string())
            .or_insert_with(|| EndpointStat::new(endpoint_id))
    }
}

fn newest_first(a: Option<Instant>, b: Option<Instant>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
