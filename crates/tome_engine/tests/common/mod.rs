#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tome_core::{ChapterEntry, EndpointHealthTracker, Work};
use tome_engine::{
    ChapterFetcher, EndpointConfig, FailureKind, FetchError, FetchMetadata, FetchOutput,
    PayloadFormat, ProgressSink, RetryPolicy, RunEvent, Transport,
};

pub const PRIMARY: &str = "http://primary.test/c/{id}";
pub const BACKUP: &str = "http://backup.test/c/{id}";

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Step {
    Body(String),
    Fail(FailureKind),
    Delayed(Duration, String),
    /// Never answers within a test's lifetime.
    Hang,
}

/// In-memory transport answering from per-URL scripts. The last step of a
/// script repeats forever; unknown URLs fail with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
    served: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: impl Into<String>, steps: Vec<Step>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.into(), steps.into_iter().collect());
        self
    }

    /// Serves `<p>Body of {id}</p>` for every id on `template`.
    pub fn chapters(mut self, template: &str, ids: &[&str]) -> Self {
        for id in ids {
            self = self.route(url(template, id), vec![Step::Body(body(id))]);
        }
        self
    }

    /// Cancels `token` once `count` successful responses have been served.
    pub fn cancel_after(self, count: usize, token: CancellationToken) -> Self {
        *self.cancel_after.lock().unwrap() = Some((count, token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|call| *call == url).count()
    }

    fn next_step(&self, url: &str) -> Option<Step> {
        let mut routes = self.routes.lock().unwrap();
        let steps = routes.get_mut(url)?;
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }

    fn served_one(&self) {
        let served = self.served.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((count, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if served >= *count {
                token.cancel();
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let body = match self.next_step(url) {
            Some(Step::Body(body)) => body,
            Some(Step::Delayed(delay, body)) => {
                tokio::time::sleep(delay).await;
                body
            }
            Some(Step::Fail(kind)) => return Err(FetchError::new(kind, "scripted failure")),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Err(FetchError::new(FailureKind::Timeout, "hung"));
            }
            None => return Err(FetchError::new(FailureKind::Network, "no route")),
        };
        self.served_one();
        Ok(FetchOutput {
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url: url.to_string(),
                content_type: Some("text/html; charset=utf-8".to_string()),
                byte_len: body.len() as u64,
            },
            bytes: body.into_bytes(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Chapter indexes in the order their results were applied.
    pub fn finished_order(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RunEvent::ChapterFinished {
                    index,
                    success: true,
                    ..
                } => Some(index),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: RunEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn url(template: &str, id: &str) -> String {
    template.replace("{id}", id)
}

pub fn body(id: &str) -> String {
    format!("<p>Body of {id}</p>")
}

pub fn markup_endpoint(name: &str, template: &str) -> EndpointConfig {
    EndpointConfig::new(name, template, PayloadFormat::Markup { cipher: None })
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries_per_endpoint: 3,
        base_delay: Duration::from_millis(1),
        jitter_min: Duration::ZERO,
        jitter_max: Duration::ZERO,
        failure_ceiling: 3,
    }
}

pub fn fetcher(transport: Arc<ScriptedTransport>, endpoints: Vec<EndpointConfig>) -> ChapterFetcher {
    ChapterFetcher::new(
        transport,
        endpoints,
        Arc::new(Mutex::new(EndpointHealthTracker::new(3))),
        fast_policy(),
    )
}

/// Work whose chapter `i` has id `c{i}` and title `Title {i}`.
pub fn work(chapters: usize) -> Work {
    let entries = (0..chapters)
        .map(|i| ChapterEntry::new(format!("c{i}"), format!("Title {i}")))
        .collect();
    Work::new("w1", "Test Work", "Test Author", "A short description", entries)
}

pub fn ids(work: &Work) -> Vec<String> {
    work.chapters().iter().map(|c| c.id.clone()).collect()
}
