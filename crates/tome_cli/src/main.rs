mod cli;
mod config;

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tome_core::{EndpointHealthTracker, RunSummary, Work};
use tome_engine::{
    ensure_output_dir, ChapterFetcher, Coordinator, DocumentStore, IndexError, ProgressStore,
    ReqwestTransport, RetryPolicy, SiteIndex, Transport, WorkIndex,
};
use tome_logging::{tome_error, tome_info, tome_warn};

use crate::cli::Args;
use crate::config::TomeConfig;

const LOG_FILENAME: &str = "tome.log";

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(summary) if summary.is_complete() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(err) => {
            tome_error!("{:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<RunSummary> {
    let mut config = TomeConfig::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    ensure_output_dir(&config.output_dir)
        .with_context(|| format!("preparing output directory {:?}", config.output_dir))?;
    tome_logging::initialize(
        args.log_destination(),
        args.log_level(),
        &config.output_dir.join(LOG_FILENAME),
    );

    let transport: Arc<dyn Transport> = Arc::new(
        ReqwestTransport::new(config.fetch_settings()).context("building HTTP client")?,
    );
    let index = SiteIndex::with_template(Arc::clone(&transport), config.index_page_template.clone());
    let work = fetch_work(
        &index,
        &args.work_id,
        config.index_retries,
        &config.retry_policy(),
    )
    .await
    .with_context(|| format!("fetching index of work {}", args.work_id))?;
    tome_info!(
        "{} by {}: {} chapters",
        work.title,
        work.author,
        work.chapters().len()
    );

    let progress_store = ProgressStore::for_title(config.output_dir.clone(), &work.title);
    let document_store = DocumentStore::for_title(config.output_dir.clone(), &work.title);
    let already_done = progress_store
        .load()
        .with_context(|| format!("loading {:?}", progress_store.path()))?;
    let document_path = document_store.path();

    let health = Arc::new(Mutex::new(EndpointHealthTracker::new(
        config.failure_ceiling,
    )));
    let fetcher = ChapterFetcher::new(
        transport,
        config.endpoints.clone(),
        health,
        config.retry_policy(),
    );
    let coordinator = Coordinator::new(
        Arc::new(fetcher),
        progress_store,
        document_store,
        config.coordinator_config(),
    );

    let cancel = CancellationToken::new();
    let abort = CancellationToken::new();
    let coordinator = coordinator.with_abort(abort.clone());
    tokio::spawn(watch_interrupts(cancel.clone(), abort));

    let summary = coordinator
        .run(&work, &already_done, cancel)
        .await
        .context("download run failed")?;
    print_summary(&work, &summary, &document_path);
    Ok(summary)
}

/// First ctrl-c stops new fetches and lets in-flight ones finish; a second
/// one stops waiting for them. Either way the run still checkpoints.
async fn watch_interrupts(cancel: CancellationToken, abort: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tome_warn!("Interrupt received; finishing chapters in flight (interrupt again to stop now)");
    cancel.cancel();
    if tokio::signal::ctrl_c().await.is_ok() {
        tome_warn!("Second interrupt; saving progress and exiting");
        abort.cancel();
    }
}

/// Fetches the index, retrying with the chapter backoff.
async fn fetch_work(
    index: &dyn WorkIndex,
    work_id: &str,
    attempts: u32,
    policy: &RetryPolicy,
) -> Result<Work, IndexError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match index.fetch_work(work_id).await {
            Ok(work) => return Ok(work),
            Err(err) if attempt < attempts => {
                tome_warn!(
                    "Index fetch attempt {}/{} failed: {}",
                    attempt,
                    attempts,
                    err
                );
                tokio::time::sleep(policy.backoff(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn print_summary(work: &Work, summary: &RunSummary, document: &std::path::Path) {
    println!(
        "{}: {}/{} chapters in {} ({} fetched this run, {} passes)",
        work.title,
        summary.completed,
        work.chapters().len(),
        document.display(),
        summary.fetched,
        summary.passes
    );
    if !summary.permanently_failed.is_empty() {
        println!(
            "Failed after retries: {}",
            summary.permanently_failed.join(", ")
        );
    }
    if summary.interrupted {
        println!(
            "Interrupted with {} chapters remaining; run again to resume",
            summary.remaining.len()
        );
    }
}
