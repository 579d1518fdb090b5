use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::config::{Query, ScraperOptions};
use crate::models::{JobRecord, Posting, ScrapeMetrics};
use crate::source::{JobSource, ScrapeEvent};
use crate::store::{self, FlushStats, MergePolicy};
use crate::table::JobTable;

/// State for one scrape run: the filter, the accepted rows and where they go.
pub struct RunSession {
    classifier: Classifier,
    table: JobTable,
    output: PathBuf,
    policy: MergePolicy,
    dry_run: bool,
    summary: RunSummary,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub errors: usize,
    pub ended: bool,
    /// `None` when nothing was written (dry run).
    pub flush: Option<FlushStats>,
}

impl RunSession {
    pub fn new(classifier: Classifier, output: impl Into<PathBuf>) -> Self {
        Self {
            classifier,
            table: JobTable::new(),
            output: output.into(),
            policy: MergePolicy::default(),
            dry_run: false,
            summary: RunSummary::default(),
        }
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Runs `source` on a worker thread and handles its events here until it
    /// finishes.
    pub fn run<S>(mut self, source: &S, queries: &[Query], options: &ScraperOptions) -> Result<RunSummary>
    where
        S: JobSource + Sync + ?Sized,
    {
        info!("Starting {} run with {} queries", source.name(), queries.len());
        let (tx, rx) = mpsc::channel();

        let (dispatched, source_result) = thread::scope(|scope| {
            let handle = scope.spawn(move || source.run(queries, options, tx));
            let dispatched = self.dispatch(rx);
            let joined = handle
                .join()
                .unwrap_or_else(|_| Err(anyhow::anyhow!("{} source panicked", source.name())));
            (dispatched, joined)
        });
        dispatched?;

        match source_result {
            Ok(()) if !self.summary.ended => {
                warn!("Source stopped without an end event, flushing anyway");
                self.on_end()?;
            }
            Ok(()) => {}
            Err(e) => {
                // Keep what was collected before the failure.
                if !self.summary.ended && !self.table.is_empty() {
                    warn!("Source failed, flushing {} collected rows", self.table.len());
                    self.on_end()?;
                }
                return Err(e);
            }
        }

        Ok(self.summary)
    }

    /// Handles events until `End` arrives or every sender is gone.
    /// Returns after the first `End`; later events are ignored. A failed
    /// flush on `End` is returned as the error.
    pub fn dispatch(&mut self, events: Receiver<ScrapeEvent>) -> Result<()> {
        for event in events {
            match event {
                ScrapeEvent::Data(posting) => {
                    self.on_data(posting);
                }
                ScrapeEvent::Metrics(metrics) => self.on_metrics(&metrics),
                ScrapeEvent::Error(error) => self.on_error(&error),
                ScrapeEvent::End => {
                    return self
                        .on_end()
                        .with_context(|| format!("Failed to write {}", self.output.display()));
                }
            }
        }
        Ok(())
    }

    /// Classifies one posting and keeps it if accepted.
    pub fn on_data(&mut self, posting: Posting) -> Option<JobRecord> {
        let result = self.classifier.classify(&posting.description);
        if !result.accepted {
            debug!(
                "Rejected: {} @ {} (matched {:?}, excluded {:?})",
                posting.title, posting.company, result.matched, result.excluded
            );
            self.summary.rejected += 1;
            return None;
        }

        info!("Accepted: {} @ {}", posting.title, posting.company);
        let record = JobRecord::from_posting(posting, result.matched, result.experience_years);
        self.table.append(record.clone());
        self.summary.accepted += 1;
        Some(record)
    }

    pub fn on_error(&mut self, error: &str) {
        warn!("Scraper error: {}", error);
        self.summary.errors += 1;
    }

    pub fn on_metrics(&self, metrics: &ScrapeMetrics) {
        info!("Scraper metrics: {}", metrics);
    }

    /// Persists the table. Only the first call writes.
    pub fn on_end(&mut self) -> Result<()> {
        if self.summary.ended {
            return Ok(());
        }
        self.summary.ended = true;

        info!(
            "Run finished: {} accepted, {} rejected, {} errors",
            self.summary.accepted, self.summary.rejected, self.summary.errors
        );
        if self.dry_run {
            info!("Dry run, not writing {}", self.output.display());
            return Ok(());
        }

        let stats = store::flush(&self.table, &self.output, self.policy)?;
        self.summary.flush = Some(stats);
        Ok(())
    }
}
