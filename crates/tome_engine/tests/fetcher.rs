mod common;

use std::sync::Arc;
use std::time::Instant;

use common::{body, fetcher, markup_endpoint, url, work, ScriptedTransport, Step, BACKUP, PRIMARY};
use tokio_util::sync::CancellationToken;
use tome_engine::FailureKind;

fn endpoints() -> Vec<tome_engine::EndpointConfig> {
    vec![
        markup_endpoint("primary", PRIMARY),
        markup_endpoint("backup", BACKUP),
    ]
}

#[tokio::test]
async fn fails_over_after_retries_are_exhausted() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route(url(PRIMARY, "c0"), vec![Step::Fail(FailureKind::Network)])
            .route(url(BACKUP, "c0"), vec![Step::Body(body("c0"))]),
    );
    let fetcher = fetcher(transport.clone(), endpoints());
    let work = work(1);

    let result = fetcher.fetch(&work.chapters()[0], &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(result.endpoint.as_deref(), Some("backup"));
    assert_eq!(result.paragraphs, vec!["    Body of c0".to_string()]);
    assert_eq!(transport.calls_to(&url(PRIMARY, "c0")), 3);
    assert_eq!(transport.calls_to(&url(BACKUP, "c0")), 1);

    let health = fetcher.health().lock().unwrap();
    assert_eq!(health.consecutive_failures("primary"), 3);
    assert_eq!(health.consecutive_failures("backup"), 0);
    assert!(health.stat("backup").unwrap().last_success.is_some());
}

#[tokio::test]
async fn empty_content_moves_on_without_retrying() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .route(url(PRIMARY, "c0"), vec![Step::Body(String::new())])
            .route(url(BACKUP, "c0"), vec![Step::Body(body("c0"))]),
    );
    let fetcher = fetcher(transport.clone(), endpoints());
    let work = work(1);

    let result = fetcher.fetch(&work.chapters()[0], &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(transport.calls_to(&url(PRIMARY, "c0")), 1);
    assert_eq!(fetcher.health().lock().unwrap().consecutive_failures("primary"), 1);
}

#[tokio::test]
async fn exhausting_every_endpoint_reports_failure() {
    let transport = Arc::new(ScriptedTransport::new());
    let fetcher = fetcher(transport.clone(), endpoints());
    let work = work(1);

    let result = fetcher.fetch(&work.chapters()[0], &CancellationToken::new()).await;

    assert!(!result.success);
    assert!(!result.cancelled);
    assert!(result.paragraphs.is_empty());
    assert_eq!(result.chapter_id, "c0");
    assert_eq!(transport.calls().len(), 6);
}

#[tokio::test]
async fn cancelled_token_stops_before_any_request() {
    let transport = Arc::new(ScriptedTransport::new().chapters(PRIMARY, &["c0"]));
    let fetcher = fetcher(transport.clone(), endpoints());
    let work = work(1);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = fetcher.fetch(&work.chapters()[0], &cancel).await;

    assert!(result.cancelled);
    assert!(!result.success);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn recently_successful_endpoint_is_tried_first() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .chapters(PRIMARY, &["c0"])
            .chapters(BACKUP, &["c0"]),
    );
    let fetcher = fetcher(transport.clone(), endpoints());
    fetcher
        .health()
        .lock()
        .unwrap()
        .record_success_at("backup", Instant::now());
    let work = work(1);

    let result = fetcher.fetch(&work.chapters()[0], &CancellationToken::new()).await;

    assert_eq!(result.endpoint.as_deref(), Some("backup"));
    assert_eq!(transport.calls(), vec![url(BACKUP, "c0")]);
}

#[tokio::test]
async fn degraded_endpoint_is_skipped_and_decays() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .chapters(PRIMARY, &["c0"])
            .chapters(BACKUP, &["c0"]),
    );
    let fetcher = fetcher(transport.clone(), endpoints());
    {
        let mut health = fetcher.health().lock().unwrap();
        for _ in 0..4 {
            health.record_failure("primary");
        }
    }
    let work = work(1);

    let result = fetcher.fetch(&work.chapters()[0], &CancellationToken::new()).await;

    assert_eq!(result.endpoint.as_deref(), Some("backup"));
    assert_eq!(transport.calls_to(&url(PRIMARY, "c0")), 0);
    assert_eq!(fetcher.health().lock().unwrap().consecutive_failures("primary"), 3);
}

#[tokio::test]
async fn envelope_rejection_counts_as_soft_failure() {
    let envelope_url = "http://api.test/content?item_id={id}";
    let transport = Arc::new(
        ScriptedTransport::new()
            .route(
                url(envelope_url, "c0"),
                vec![Step::Body(r#"{"code":110,"data":null}"#.to_string())],
            )
            .chapters(BACKUP, &["c0"]),
    );
    let endpoints = vec![
        tome_engine::EndpointConfig::new(
            "api",
            envelope_url,
            tome_engine::PayloadFormat::Envelope { cipher: None },
        ),
        markup_endpoint("backup", BACKUP),
    ];
    let fetcher = fetcher(transport.clone(), endpoints);
    let work = work(1);

    let result = fetcher.fetch(&work.chapters()[0], &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(transport.calls_to(&url(envelope_url, "c0")), 1);
}
