use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tome_core::{
    parse_document, render, Chapter, ChapterId, ChapterLedger, ChapterText, FetchResult,
    ProgressSet, RunSummary, Work,
};
use tome_logging::{tome_debug, tome_info, tome_warn};

use crate::store::{ensure_output_dir, DocumentStore, ProgressStore, StoreError};
use crate::{ChapterFetcher, RunEvent};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on concurrent chapter fetches.
    pub max_concurrency: usize,
    /// How long in-flight fetches may keep running after an interrupt.
    pub grace_period: Duration,
    /// Pause before a pass that retries failed chapters.
    pub pass_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            grace_period: Duration::from_secs(10),
            pass_delay: Duration::ZERO,
        }
    }
}

/// Receives run progress; must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Sink that reports progress through the logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: RunEvent) {
        match event {
            RunEvent::PassStarted { pass, chapters } => {
                tome_info!("Pass {} started with {} chapters", pass, chapters);
            }
            RunEvent::ChapterFinished {
                chapter_id,
                success,
                completed,
                total,
                ..
            } => {
                if success {
                    tome_info!("Downloaded {}/{} (chapter {})", completed, total, chapter_id);
                } else {
                    tome_warn!("Chapter {} failed, will retry next pass", chapter_id);
                }
            }
            RunEvent::Checkpoint { completed } => {
                tome_debug!("Checkpoint written with {} chapters", completed);
            }
            RunEvent::PassFinished(report) => {
                tome_info!(
                    "Pass {} finished: {} completed, {} requeued, {} abandoned",
                    report.pass,
                    report.completed,
                    report.requeued,
                    report.abandoned
                );
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
}

/// Mutable state of one run, owned by the coordinator task.
struct RunState {
    ledger: ChapterLedger,
    chapters: BTreeMap<usize, ChapterText>,
    progress: ProgressSet,
    saved_progress: ProgressSet,
    unsaved: Vec<ChapterId>,
}

/// Drives passes of concurrent chapter fetches and checkpoints the output.
pub struct Coordinator {
    fetcher: Arc<ChapterFetcher>,
    progress_store: ProgressStore,
    document_store: DocumentStore,
    config: CoordinatorConfig,
    sink: Arc<dyn ProgressSink>,
    abort: CancellationToken,
}

impl Coordinator {
    pub fn new(
        fetcher: Arc<ChapterFetcher>,
        progress_store: ProgressStore,
        document_store: DocumentStore,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            fetcher,
            progress_store,
            document_store,
            config,
            sink: Arc::new(LogProgressSink),
            abort: CancellationToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Token that cuts the grace period short once an interrupt is pending.
    /// In-flight fetches are dropped and the checkpoint still runs.
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    /// Fetches every chapter of `work` not yet merged into the document.
    ///
    /// Only persistence failures are returned as errors; chapter failures end
    /// up in the summary.
    pub async fn run(
        &self,
        work: &Work,
        already_done: &ProgressSet,
        cancel: CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let mut state = self.restore(work, already_done)?;
        let total = work.chapters().len();

        while !state.ledger.is_finished() && !cancel.is_cancelled() {
            let batch = state.ledger.begin_pass();
            self.sink.emit(RunEvent::PassStarted {
                pass: state.ledger.pass(),
                chapters: batch.len(),
            });

            let queue: VecDeque<Chapter> = batch
                .iter()
                .filter_map(|index| work.chapter(*index).cloned())
                .collect();
            self.run_pass(queue, &cancel, |result| {
                self.absorb(work, &mut state, result, total);
            })
            .await;

            let report = state.ledger.end_pass();
            self.checkpoint(work, &mut state)?;
            self.sink.emit(RunEvent::PassFinished(report));

            if cancel.is_cancelled() {
                break;
            }
            if !report.made_progress() {
                tome_warn!(
                    "Pass {} made no progress; giving up on {} chapters",
                    report.pass,
                    state.ledger.pending().len()
                );
                break;
            }
            if !state.ledger.is_finished() && !self.config.pass_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.pass_delay) => {}
                }
            }
        }

        // Reconciliation with the document may have changed the set even when
        // nothing new was fetched.
        self.checkpoint(work, &mut state)?;

        let interrupted = cancel.is_cancelled() && !state.ledger.is_finished();
        Ok(state.ledger.summarize(interrupted))
    }

    /// Rebuilds run state from the existing document and the completed set.
    ///
    /// The document is authoritative: ids whose block cannot be recovered are
    /// fetched again, recovered blocks count as done even if the set missed
    /// them. The set only guides which chapter a block belongs to.
    fn restore(&self, work: &Work, already_done: &ProgressSet) -> Result<RunState, StoreError> {
        ensure_output_dir(self.document_store.dir())?;
        ensure_output_dir(self.progress_store.dir())?;
        let existing = self.document_store.read()?;
        let recovered = existing
            .as_deref()
            .map(|text| parse_document(work, text, already_done))
            .unwrap_or_default();
        if recovered.unmatched_blocks > 0 {
            tome_warn!(
                "{} blocks of {:?} match no chapter and will be dropped",
                recovered.unmatched_blocks,
                self.document_store.path()
            );
        }

        let mut progress: ProgressSet = already_done
            .iter()
            .filter(|id| !work.chapters().iter().any(|c| &c.id == *id))
            .cloned()
            .collect();
        for chapter in work.chapters() {
            let in_document = recovered.chapters.contains_key(&chapter.index);
            let in_set = already_done.contains(&chapter.id);
            match (in_document, in_set) {
                (true, _) => {
                    if !in_set {
                        tome_info!("Chapter {} found in document, marking done", chapter.id);
                    }
                    progress.insert(chapter.id.clone());
                }
                (false, true) => {
                    tome_warn!(
                        "Chapter {} marked done but missing from document, fetching again",
                        chapter.id
                    );
                }
                (false, false) => {}
            }
        }

        let chapters = recovered.chapters;
        let ledger = ChapterLedger::new(work, |c| chapters.contains_key(&c.index));

        if existing.is_none() {
            tome_info!("Creating {:?}", self.document_store.path());
            self.document_store.write(&render(work, &chapters))?;
        }

        Ok(RunState {
            ledger,
            chapters,
            progress,
            saved_progress: already_done.clone(),
            unsaved: Vec::new(),
        })
    }

    /// Runs one pass over `queue` with a bounded set of workers and feeds every
    /// result to `on_result` as it arrives.
    async fn run_pass(
        &self,
        queue: VecDeque<Chapter>,
        cancel: &CancellationToken,
        mut on_result: impl FnMut(FetchResult),
    ) {
        let worker_count = self.config.max_concurrency.max(1).min(queue.len());
        let queue = Arc::new(Mutex::new(queue));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for worker in 0..worker_count {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let cancel = cancel.clone();
            workers.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(chapter) = next else {
                        break;
                    };
                    let result = fetcher.fetch(&chapter, &cancel).await;
                    if tx.send(result).is_err() {
                        break;
                    }
                }
                tome_debug!("Worker {} idle", worker);
            });
        }
        drop(tx);

        let mut grace_deadline = None;
        loop {
            let received = match grace_deadline {
                None => tokio::select! {
                    received = rx.recv() => received,
                    _ = cancel.cancelled() => {
                        tome_info!(
                            "Interrupted; waiting up to {:?} for in-flight chapters",
                            self.config.grace_period
                        );
                        grace_deadline =
                            Some(tokio::time::Instant::now() + self.config.grace_period);
                        continue;
                    }
                },
                Some(deadline) => tokio::select! {
                    waited = tokio::time::timeout_at(deadline, rx.recv()) => match waited {
                        Ok(received) => received,
                        Err(_) => {
                            tome_warn!("Grace period expired with chapters still in flight");
                            break;
                        }
                    },
                    _ = self.abort.cancelled() => {
                        tome_warn!("Interrupted again; dropping chapters still in flight");
                        break;
                    }
                },
            };
            match received {
                Some(result) => on_result(result),
                None => break,
            }
        }

        workers.abort_all();
        while let Ok(result) = rx.try_recv() {
            on_result(result);
        }
        while workers.join_next().await.is_some() {}
    }

    fn absorb(&self, work: &Work, state: &mut RunState, result: FetchResult, total: usize) {
        // Interrupted fetches are neither successes nor failures; the ledger
        // returns them to pending when the pass closes.
        if result.cancelled {
            return;
        }
        let index = result.chapter_index;
        if !state.ledger.complete(index, result.success) {
            return;
        }
        if result.success {
            if let Some(chapter) = work.chapter(index) {
                state
                    .chapters
                    .insert(index, ChapterText::from_result(chapter, &result));
                state.unsaved.push(result.chapter_id.clone());
            }
        }
        self.sink.emit(RunEvent::ChapterFinished {
            index,
            chapter_id: result.chapter_id,
            success: result.success,
            completed: state.ledger.done_count(),
            total,
        });
    }

    /// Rewrites the document with every chapter held, then records the new ids
    /// as completed. The set is only saved once the document is on disk.
    fn checkpoint(&self, work: &Work, state: &mut RunState) -> Result<(), StoreError> {
        if !state.unsaved.is_empty() {
            self.document_store.write(&render(work, &state.chapters))?;
            state.progress.extend(state.unsaved.drain(..));
            self.sink.emit(RunEvent::Checkpoint {
                completed: state.chapters.len(),
            });
        }
        if state.progress != state.saved_progress {
            self.progress_store.save(&state.progress)?;
            state.saved_progress = state.progress.clone();
        }
        Ok(())
    }
}
