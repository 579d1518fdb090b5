use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::thread;
use tracing::debug;

use crate::config::{Query, ScraperOptions};
use crate::models::{Posting, ScrapeMetrics};

/// Everything a scraper can report to a run.
#[derive(Debug, Clone)]
pub enum ScrapeEvent {
    /// One processed posting. May be delivered more than once.
    Data(Posting),
    Metrics(ScrapeMetrics),
    /// Non-fatal scraper failure; the run continues.
    Error(String),
    /// Sent once, after every other event.
    End,
}

/// A scraping engine driven by queries that reports back through events.
///
/// Implementations may send from any number of worker threads; the receiver
/// side is a single consumer. `run` returns once all workers are done and
/// `End` has been sent. An `Err` means the source could not run at all.
pub trait JobSource {
    fn name(&self) -> &str;

    fn run(
        &self,
        queries: &[Query],
        options: &ScraperOptions,
        events: Sender<ScrapeEvent>,
    ) -> Result<()>;
}

/// Replays postings exported by an external scraper, one JSON object per line.
pub struct ReplaySource {
    path: PathBuf,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl JobSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn run(
        &self,
        queries: &[Query],
        options: &ScraperOptions,
        events: Sender<ScrapeEvent>,
    ) -> Result<()> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read postings file: {}", self.path.display()))?;
        debug!(
            "Replaying {} for {} queries with {} workers",
            self.path.display(),
            queries.len(),
            options.max_workers
        );

        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .collect();

        let workers = options.max_workers.max(1);
        let chunk_size = lines.len().div_ceil(workers).max(1);

        thread::scope(|scope| {
            for chunk in lines.chunks(chunk_size) {
                let events = events.clone();
                scope.spawn(move || replay_chunk(chunk, &events));
            }
        });

        events
            .send(ScrapeEvent::End)
            .map_err(|_| anyhow!("Event receiver dropped before end of run"))
    }
}

fn replay_chunk(lines: &[(usize, &str)], events: &Sender<ScrapeEvent>) {
    let mut metrics = ScrapeMetrics::default();

    for (idx, line) in lines {
        let event = match serde_json::from_str::<Posting>(line) {
            Ok(posting) => {
                metrics.processed += 1;
                ScrapeEvent::Data(posting)
            }
            Err(e) => {
                metrics.failed += 1;
                ScrapeEvent::Error(format!("line {}: {}", idx + 1, e))
            }
        };
        if events.send(event).is_err() {
            // Receiver gone; nobody is listening any more.
            return;
        }
    }

    let _ = events.send(ScrapeEvent::Metrics(metrics));
}
