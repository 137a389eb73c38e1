//! Crawl, fetch and extract a whole tree.
//!
//! Files are fetched and extracted by a bounded number of concurrent workers;
//! the results are put back into crawl discovery order before they are
//! returned. A file that cannot be fetched is skipped and reported. Only a
//! missing extraction backend stops the run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use arbor_core::{report, report_diagnostic, Config, ExtractedText, FileDescriptor, FolderNode, ProgressSink};
use arbor_drive::{
    ContentStore, CrawlDiagnostic, CrawlOptions, RemoteTree, RetryPolicy, RetryingFetcher, TreeCrawler,
};

use crate::document::{ExtractError, FormatDispatcher};

/// Share of the progress bar spent on crawling.
const CRAWL_SHARE: f32 = 0.2;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// A file that produced no text.
#[derive(Debug, Clone)]
pub struct FileFailure {
    /// `A/B/name.pdf`
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct PipelineOutput {
    /// One entry per extracted file, in crawl discovery order.
    pub texts: Vec<ExtractedText>,
    pub crawl_diagnostics: Vec<CrawlDiagnostic>,
    pub failures: Vec<FileFailure>,
    /// Whether the crawl stopped at `max_files`.
    pub truncated: bool,
}

pub struct Pipeline<'a> {
    tree: &'a dyn RemoteTree,
    dispatcher: Arc<FormatDispatcher>,
    crawl: CrawlOptions,
    retry: RetryPolicy,
    store: Option<ContentStore>,
    workers: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(tree: &'a dyn RemoteTree, dispatcher: Arc<FormatDispatcher>) -> Self {
        Self {
            tree,
            dispatcher,
            crawl: CrawlOptions::default(),
            retry: RetryPolicy::default(),
            store: None,
            workers: 4,
        }
    }

    pub fn from_config(tree: &'a dyn RemoteTree, dispatcher: Arc<FormatDispatcher>, config: &Config) -> Self {
        let mut pipeline = Self::new(tree, dispatcher)
            .with_crawl_options(CrawlOptions::from(&config.crawl))
            .with_retry(RetryPolicy::from(&config.fetch))
            .with_workers(config.pipeline.workers);
        if let Some(dir) = &config.fetch.store_dir {
            pipeline = pipeline.with_store(ContentStore::new(dir.clone()));
        }
        pipeline
    }

    pub fn with_crawl_options(mut self, options: CrawlOptions) -> Self {
        self.crawl = options;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_store(mut self, store: ContentStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Crawl `root`, then fetch and extract every file found.
    pub async fn run(
        &self,
        root: &FolderNode,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<PipelineOutput, PipelineError> {
        let crawl_progress = Stage {
            inner: progress,
            start: 0.0,
            span: CRAWL_SHARE,
        };
        let outcome = TreeCrawler::new(self.tree, self.crawl.clone())
            .crawl(root, Some(&crawl_progress))
            .await;

        let mut output = self.extract_all(&outcome.files, progress).await?;
        output.crawl_diagnostics = outcome.diagnostics;
        output.truncated = outcome.truncated;
        Ok(output)
    }

    /// Fetch and extract `files`, keeping their order in the output.
    pub async fn extract_all(
        &self,
        files: &[FileDescriptor],
        progress: Option<&dyn ProgressSink>,
    ) -> Result<PipelineOutput, PipelineError> {
        let mut fetcher = RetryingFetcher::new(self.tree, self.retry);
        if let Some(store) = &self.store {
            fetcher = fetcher.with_store(store.clone());
        }
        let total = files.len();
        let done = AtomicUsize::new(0);
        info!(files = total, workers = self.workers, "extracting");

        let fetcher = &fetcher;
        let done = &done;
        let mut results: Vec<(usize, Result<ExtractedText, FileFailure>)> = stream::iter(files.iter().enumerate())
            .map(|(index, descriptor)| async move {
                let result = self.process(fetcher, descriptor, progress).await?;
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                let fraction = CRAWL_SHARE + (1.0 - CRAWL_SHARE) * finished as f32 / total.max(1) as f32;
                report(
                    progress,
                    fraction,
                    &format!("Extracted {}/{}: {}", finished, total, descriptor.name),
                );
                Ok::<_, PipelineError>((index, result))
            })
            .buffer_unordered(self.workers)
            .try_collect()
            .await?;

        // Workers finish in any order; consumers get discovery order.
        results.sort_by_key(|(index, _)| *index);

        let mut output = PipelineOutput::default();
        for (_, result) in results {
            match result {
                Ok(text) => output.texts.push(text),
                Err(failure) => output.failures.push(failure),
            }
        }
        info!(
            extracted = output.texts.len(),
            failed = output.failures.len(),
            "extraction finished"
        );
        report(progress, 1.0, &format!("Extracted {} documents", output.texts.len()));
        Ok(output)
    }

    async fn process(
        &self,
        fetcher: &RetryingFetcher<'_>,
        descriptor: &FileDescriptor,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<Result<ExtractedText, FileFailure>, PipelineError> {
        let path = descriptor.display_path();
        let payload = match fetcher.fetch_file(descriptor).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(path = %path, error = %e, "skipping file, download failed");
                report_diagnostic(progress, &format!("skipped '{}': {}", path, e));
                return Ok(Err(FileFailure {
                    path,
                    message: e.to_string(),
                }));
            }
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let joined = tokio::task::spawn_blocking(move || dispatcher.extract_payload(payload)).await;
        match joined {
            Ok(Ok(text)) => {
                debug!(path = %path, chars = text.text.len(), kind = %text.provenance.kind, "extracted");
                Ok(Ok(text))
            }
            Ok(Err(e @ ExtractError::BackendUnavailable(_))) => Err(e.into()),
            Ok(Err(e)) => Ok(Err(self.failed(path, e.to_string(), progress))),
            Err(e) => Ok(Err(self.failed(path, format!("extraction task failed: {e}"), progress))),
        }
    }

    fn failed(&self, path: String, message: String, progress: Option<&dyn ProgressSink>) -> FileFailure {
        warn!(path = %path, error = %message, "extraction failed");
        report_diagnostic(progress, &format!("failed '{}': {}", path, message));
        FileFailure { path, message }
    }
}

/// Maps a sub-task's `[0, 1]` progress onto a slice of the overall bar.
struct Stage<'a> {
    inner: Option<&'a dyn ProgressSink>,
    start: f32,
    span: f32,
}

impl ProgressSink for Stage<'_> {
    fn progress(&self, fraction: f32, status: &str) {
        report(self.inner, self.start + fraction * self.span, status);
    }

    fn diagnostic(&self, message: &str) {
        report_diagnostic(self.inner, message);
    }
}
