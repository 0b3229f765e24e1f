mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{
    body, fetcher, ids, markup_endpoint, url, work, RecordingSink, ScriptedTransport, Step,
    PRIMARY,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tome_core::{parse_document, ChapterEntry, ProgressSet, Work};
use tome_engine::{
    Coordinator, CoordinatorConfig, DocumentStore, FailureKind, ProgressStore, RunEvent,
};

struct Harness {
    dir: TempDir,
    work: Work,
}

impl Harness {
    fn new(chapters: usize) -> Self {
        Self::with_work(work(chapters))
    }

    fn with_work(work: Work) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            work,
        }
    }

    fn progress_store(&self) -> ProgressStore {
        ProgressStore::for_title(self.dir.path().to_path_buf(), &self.work.title)
    }

    fn document_store(&self) -> DocumentStore {
        DocumentStore::for_title(self.dir.path().to_path_buf(), &self.work.title)
    }

    fn coordinator(
        &self,
        transport: Arc<ScriptedTransport>,
        config: CoordinatorConfig,
        sink: Arc<RecordingSink>,
    ) -> Coordinator {
        Coordinator::new(
            Arc::new(fetcher(transport, vec![markup_endpoint("primary", PRIMARY)])),
            self.progress_store(),
            self.document_store(),
            config,
        )
        .with_sink(sink)
    }

    fn document(&self) -> String {
        fs::read_to_string(self.document_store().path()).unwrap()
    }

    fn progress(&self) -> ProgressSet {
        self.progress_store().load().unwrap()
    }

    /// Ids whose blocks can be recovered from the document on disk.
    fn ids_in_document(&self) -> ProgressSet {
        parse_document(&self.work, &self.document(), &self.progress())
            .chapters
            .keys()
            .map(|index| self.work.chapters()[*index].id.clone())
            .collect()
    }
}

fn expected_document(chapters: &[usize]) -> String {
    let titles: Vec<_> = chapters.iter().map(|i| format!("Title {i}")).collect();
    let ids: Vec<_> = chapters.iter().map(|i| format!("c{i}")).collect();
    let blocks: Vec<_> = titles
        .iter()
        .zip(&ids)
        .map(|(title, id)| (title.as_str(), id.as_str()))
        .collect();
    expected_blocks(&blocks)
}

/// Document of the test work holding `(heading, chapter id)` blocks in order.
fn expected_blocks(blocks: &[(&str, &str)]) -> String {
    let mut doc = String::from(
        "Title: Test Work\nAuthor: Test Author\nDescription: A short description\n\n",
    );
    for (heading, id) in blocks {
        doc.push_str(&format!("{heading}\n\n    Body of {id}\n\n"));
    }
    doc
}

fn titled_work(entries: &[(&str, &str)]) -> Work {
    let entries = entries
        .iter()
        .map(|(id, title)| ChapterEntry::new(*id, *title))
        .collect();
    Work::new("w1", "Test Work", "Test Author", "A short description", entries)
}

fn set<S: AsRef<str>>(ids: &[S]) -> ProgressSet {
    ids.iter().map(|id| id.as_ref().to_string()).collect()
}

fn config(max_concurrency: usize) -> CoordinatorConfig {
    CoordinatorConfig {
        max_concurrency,
        grace_period: Duration::from_millis(200),
        pass_delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn document_follows_index_order_whatever_the_completion_order() {
    let harness = Harness::new(3);
    let transport = Arc::new(
        ScriptedTransport::new()
            .route(
                url(PRIMARY, "c0"),
                vec![Step::Delayed(Duration::from_millis(150), body("c0"))],
            )
            .route(
                url(PRIMARY, "c1"),
                vec![Step::Delayed(Duration::from_millis(50), body("c1"))],
            )
            .route(url(PRIMARY, "c2"), vec![Step::Body(body("c2"))]),
    );
    let sink = Arc::new(RecordingSink::default());
    let coordinator = harness.coordinator(transport, config(3), sink.clone());

    let summary = coordinator
        .run(&harness.work, &ProgressSet::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.passes, 1);
    assert_eq!(sink.finished_order(), vec![2, 1, 0]);
    assert_eq!(harness.document(), expected_document(&[0, 1, 2]));
    assert_eq!(harness.progress(), set(&ids(&harness.work)));
}

#[tokio::test]
async fn finished_work_is_not_fetched_or_rewritten_again() {
    let harness = Harness::new(3);
    let transport = Arc::new(ScriptedTransport::new().chapters(PRIMARY, &["c0", "c1", "c2"]));
    let first = harness.coordinator(transport, config(2), Arc::new(RecordingSink::default()));
    first
        .run(&harness.work, &ProgressSet::new(), CancellationToken::new())
        .await
        .unwrap();
    let document_before = fs::read(harness.document_store().path()).unwrap();
    let progress_before = fs::read(harness.progress_store().path()).unwrap();

    let idle = Arc::new(ScriptedTransport::new());
    let second = harness.coordinator(idle.clone(), config(2), Arc::new(RecordingSink::default()));
    let summary = second
        .run(&harness.work, &harness.progress(), CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.passes, 0);
    assert!(idle.calls().is_empty());
    assert_eq!(fs::read(harness.document_store().path()).unwrap(), document_before);
    assert_eq!(fs::read(harness.progress_store().path()).unwrap(), progress_before);
}

#[tokio::test]
async fn failed_chapters_are_retried_in_later_passes() {
    let harness = Harness::new(3);
    let flaky = vec![
        Step::Fail(FailureKind::Network),
        Step::Fail(FailureKind::Network),
        Step::Fail(FailureKind::Network),
        Step::Body(body("c1")),
    ];
    let transport = Arc::new(
        ScriptedTransport::new()
            .chapters(PRIMARY, &["c0", "c2"])
            .route(url(PRIMARY, "c1"), flaky),
    );
    let sink = Arc::new(RecordingSink::default());
    let coordinator = harness.coordinator(transport.clone(), config(2), sink.clone());

    let summary = coordinator
        .run(&harness.work, &ProgressSet::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.passes, 2);
    assert_eq!(transport.calls_to(&url(PRIMARY, "c1")), 4);
    assert_eq!(harness.document(), expected_document(&[0, 1, 2]));

    let reports: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            RunEvent::PassFinished(report) => Some((report.pass, report.completed, report.requeued)),
            _ => None,
        })
        .collect();
    assert_eq!(reports, vec![(1, 2, 1), (2, 1, 0)]);
}

#[tokio::test]
async fn run_stops_after_a_pass_without_progress() {
    let harness = Harness::new(3);
    let transport = Arc::new(
        ScriptedTransport::new()
            .chapters(PRIMARY, &["c0", "c2"])
            .route(url(PRIMARY, "c1"), vec![Step::Fail(FailureKind::HttpStatus(500))]),
    );
    let coordinator =
        harness.coordinator(transport, config(3), Arc::new(RecordingSink::default()));

    let summary = coordinator
        .run(&harness.work, &ProgressSet::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(!summary.is_complete());
    assert!(!summary.interrupted);
    assert_eq!(summary.passes, 2);
    assert_eq!(summary.permanently_failed, vec!["c1".to_string()]);
    assert_eq!(harness.document(), expected_document(&[0, 2]));
    assert_eq!(harness.progress(), set(&["c0", "c2"]));
}

#[tokio::test]
async fn interrupted_run_leaves_document_and_progress_consistent() {
    let harness = Harness::new(5);
    let cancel = CancellationToken::new();
    let transport = Arc::new(
        ScriptedTransport::new()
            .chapters(PRIMARY, &["c0", "c1", "c2", "c3", "c4"])
            .cancel_after(2, cancel.clone()),
    );
    let coordinator =
        harness.coordinator(transport, config(1), Arc::new(RecordingSink::default()));

    let summary = coordinator
        .run(&harness.work, &ProgressSet::new(), cancel)
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert!(summary.permanently_failed.is_empty());
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.remaining, vec!["c2", "c3", "c4"]);
    assert_eq!(harness.document(), expected_document(&[0, 1]));
    assert_eq!(harness.progress(), harness.ids_in_document());
}

#[tokio::test]
async fn grace_period_bounds_how_long_an_interrupt_waits() {
    let harness = Harness::new(2);
    let cancel = CancellationToken::new();
    let transport = Arc::new(
        ScriptedTransport::new()
            .chapters(PRIMARY, &["c0"])
            .route(url(PRIMARY, "c1"), vec![Step::Hang])
            .cancel_after(1, cancel.clone()),
    );
    let coordinator =
        harness.coordinator(transport, config(2), Arc::new(RecordingSink::default()));

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.run(&harness.work, &ProgressSet::new(), cancel),
    )
    .await
    .expect("run returns once the grace period expires")
    .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.remaining, vec!["c1"]);
    assert_eq!(harness.document(), expected_document(&[0]));
    assert_eq!(harness.progress(), harness.ids_in_document());
}

#[tokio::test]
async fn resume_refetches_only_what_the_document_lacks() {
    let harness = Harness::new(3);
    harness
        .document_store()
        .write(&expected_document(&[0, 2]))
        .unwrap();
    // c1 is recorded but its block is missing; c2 has a block but no record.
    let recorded = set(&["c0", "c1"]);

    let transport = Arc::new(ScriptedTransport::new().chapters(PRIMARY, &["c0", "c1", "c2"]));
    let coordinator =
        harness.coordinator(transport.clone(), config(2), Arc::new(RecordingSink::default()));

    let summary = coordinator
        .run(&harness.work, &recorded, CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.fetched, 1);
    assert_eq!(transport.calls(), vec![url(PRIMARY, "c1")]);
    assert_eq!(harness.document(), expected_document(&[0, 1, 2]));
    assert_eq!(harness.progress(), set(&ids(&harness.work)));
}

#[tokio::test]
async fn first_run_creates_a_header_only_document() {
    let harness = Harness::new(1);
    let transport = Arc::new(
        ScriptedTransport::new().route(url(PRIMARY, "c0"), vec![Step::Fail(FailureKind::Timeout)]),
    );
    let coordinator =
        harness.coordinator(transport, config(1), Arc::new(RecordingSink::default()));

    let summary = coordinator
        .run(&harness.work, &ProgressSet::new(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.permanently_failed, vec!["c0"]);
    assert_eq!(harness.document(), expected_document(&[]));
    assert!(harness.progress().is_empty());
}

#[tokio::test]
async fn resume_keeps_blocks_with_their_chapter_when_titles_repeat() {
    let harness = Harness::with_work(titled_work(&[("c0", "Notice"), ("c1", "Notice")]));
    let failing = Arc::new(
        ScriptedTransport::new()
            .chapters(PRIMARY, &["c1"])
            .route(url(PRIMARY, "c0"), vec![Step::Fail(FailureKind::HttpStatus(500))]),
    );
    let first = harness.coordinator(failing, config(2), Arc::new(RecordingSink::default()));
    let summary = first
        .run(&harness.work, &ProgressSet::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.permanently_failed, vec!["c0"]);
    assert_eq!(harness.progress(), set(&["c1"]));

    let healthy = Arc::new(ScriptedTransport::new().chapters(PRIMARY, &["c0", "c1"]));
    let second =
        harness.coordinator(healthy.clone(), config(2), Arc::new(RecordingSink::default()));
    let summary = second
        .run(&harness.work, &harness.progress(), CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(healthy.calls(), vec![url(PRIMARY, "c0")]);
    assert_eq!(
        harness.document(),
        expected_blocks(&[("Notice", "c0"), ("Notice", "c1")])
    );
    assert_eq!(harness.progress(), set(&["c0", "c1"]));
}

#[tokio::test]
async fn untitled_chapters_are_not_fetched_again() {
    let harness = Harness::with_work(titled_work(&[("u0", ""), ("c1", "Title 1")]));
    let transport = Arc::new(ScriptedTransport::new().chapters(PRIMARY, &["u0", "c1"]));
    let first = harness.coordinator(transport, config(2), Arc::new(RecordingSink::default()));
    let summary = first
        .run(&harness.work, &ProgressSet::new(), CancellationToken::new())
        .await
        .unwrap();
    assert!(summary.is_complete());
    let document_before = fs::read(harness.document_store().path()).unwrap();

    let idle = Arc::new(ScriptedTransport::new());
    let second = harness.coordinator(idle.clone(), config(2), Arc::new(RecordingSink::default()));
    let summary = second
        .run(&harness.work, &harness.progress(), CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.fetched, 0);
    assert!(idle.calls().is_empty());
    assert_eq!(fs::read(harness.document_store().path()).unwrap(), document_before);
    assert_eq!(harness.progress(), set(&["c1", "u0"]));
}

#[tokio::test]
async fn abort_token_ends_the_grace_period_early() {
    let harness = Harness::new(2);
    let cancel = CancellationToken::new();
    let abort = CancellationToken::new();
    let transport = Arc::new(
        ScriptedTransport::new()
            .chapters(PRIMARY, &["c0"])
            .route(url(PRIMARY, "c1"), vec![Step::Hang])
            .cancel_after(1, cancel.clone()),
    );
    let patient = CoordinatorConfig {
        grace_period: Duration::from_secs(60),
        ..config(2)
    };
    let coordinator = harness
        .coordinator(transport, patient, Arc::new(RecordingSink::default()))
        .with_abort(abort.clone());
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            cancel.cancelled().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            abort.cancel();
        }
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.run(&harness.work, &ProgressSet::new(), cancel),
    )
    .await
    .expect("run returns once aborted")
    .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.remaining, vec!["c1"]);
    assert_eq!(harness.document(), expected_document(&[0]));
    assert_eq!(harness.progress(), set(&["c0"]));
}
