//! Admission-controlled dispatch loop.
//!
//! Each cycle reconciles the in-flight jobs, then admits at most one new
//! clip if below capacity. At capacity, or with the catalog exhausted and
//! jobs still outstanding, the loop idles for the configured backoff. It
//! ends once the catalog is exhausted and nothing is in flight.
//!
//! A clip whose identity is already in flight is held back until that job
//! settles, then re-checked against the save directory.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use clipq_models::{Clip, ClipIdentity, DownloadClipJob};
use clipq_queue::{Job, JobQueue};

use crate::catalog::Catalog;
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorResult;
use crate::handler::{CompletionHandler, Reconciliation};
use crate::metrics;
use crate::oracle::CompletionOracle;

/// Format `(finished + failed) / total` as a percentage with two decimals.
///
/// An empty catalog reports `0.00%`.
pub fn percent_done(total: usize, finished: u64, failed: u64) -> String {
    if total == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", (finished + failed) as f64 / total as f64 * 100.0)
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Clips in the catalog
    pub total: usize,
    /// Saved clips, including pre-skipped ones
    pub finished: u64,
    pub failed: u64,
    /// Clips whose output already existed
    pub skipped: u64,
    /// Jobs whose record vanished from the queue
    pub missing: u64,
    /// Jobs submitted in this run
    pub submitted: u64,
    /// Largest in-flight count observed
    pub peak_in_flight: usize,
}

impl RunSummary {
    pub fn percent_done(&self) -> String {
        percent_done(self.total, self.finished, self.failed)
    }

    fn absorb(&mut self, counts: Reconciliation) {
        self.finished += counts.finished;
        self.failed += counts.failed;
        self.missing += counts.missing;
    }
}

/// The coordinator loop.
pub struct Dispatcher {
    config: CoordinatorConfig,
    queue: Arc<dyn JobQueue>,
    oracle: CompletionOracle,
    handler: CompletionHandler,
}

impl Dispatcher {
    pub fn new(config: CoordinatorConfig, queue: Arc<dyn JobQueue>) -> Self {
        let oracle = CompletionOracle::new(&config.save_dir);
        let handler = CompletionHandler::new(Arc::clone(&queue), oracle.clone());
        Self {
            config,
            queue,
            oracle,
            handler,
        }
    }

    /// Process every clip in `catalog` until nothing is left in flight.
    pub async fn run(&self, catalog: Catalog) -> CoordinatorResult<RunSummary> {
        let mut summary = RunSummary {
            total: catalog.len(),
            ..Default::default()
        };
        let mut clips = catalog.into_iter();
        let mut in_flight: Vec<Job> = Vec::new();
        let mut deferred: VecDeque<Clip> = VecDeque::new();
        let mut exhausted = false;

        loop {
            let (pending, counts) = self.handler.reconcile(std::mem::take(&mut in_flight)).await?;
            in_flight = pending;
            summary.absorb(counts);
            metrics::set_in_flight(in_flight.len());

            let has_work = !exhausted || !deferred.is_empty();
            if has_work && in_flight.len() < self.config.max_in_flight {
                let busy: HashSet<ClipIdentity> =
                    in_flight.iter().map(|job| job.clip().identity()).collect();
                match self.next_clip(&mut clips, &mut deferred, &busy, &mut summary) {
                    Some(clip) => {
                        let job = self.submit(clip).await?;
                        summary.submitted += 1;

                        info!(
                            job_id = %job.id,
                            source_id = %job.clip().source_id,
                            total = summary.total,
                            finished = summary.finished,
                            failed = summary.failed,
                            skipped = summary.skipped,
                            missing = summary.missing,
                            percent_done = %summary.percent_done(),
                            "queued job"
                        );

                        in_flight.push(job);
                        summary.peak_in_flight = summary.peak_in_flight.max(in_flight.len());
                        metrics::set_in_flight(in_flight.len());
                        continue;
                    }
                    None => exhausted = true,
                }
            }

            if exhausted && deferred.is_empty() && in_flight.is_empty() {
                break;
            }

            tokio::time::sleep(self.config.backoff).await;
        }

        info!(
            total = summary.total,
            finished = summary.finished,
            failed = summary.failed,
            skipped = summary.skipped,
            missing = summary.missing,
            percent_done = %summary.percent_done(),
            "done"
        );
        Ok(summary)
    }

    /// Next clip to submit: a deferred duplicate whose twin has settled, or
    /// the next catalog clip without output.
    ///
    /// Returns `None` when nothing is admissible right now; `clips` is then
    /// exhausted.
    fn next_clip(
        &self,
        clips: &mut impl Iterator<Item = Clip>,
        deferred: &mut VecDeque<Clip>,
        busy: &HashSet<ClipIdentity>,
        summary: &mut RunSummary,
    ) -> Option<Clip> {
        while let Some(pos) = deferred
            .iter()
            .position(|clip| !busy.contains(&clip.identity()))
        {
            let clip = deferred.remove(pos)?;
            if !self.skip_if_saved(&clip, summary) {
                return Some(clip);
            }
        }

        for clip in clips {
            if busy.contains(&clip.identity()) {
                debug!(clip = %clip, "Clip already in flight, deferring");
                deferred.push_back(clip);
                continue;
            }
            if self.skip_if_saved(&clip, summary) {
                continue;
            }
            return Some(clip);
        }
        None
    }

    fn skip_if_saved(&self, clip: &Clip, summary: &mut RunSummary) -> bool {
        if !self.oracle.is_done(clip) {
            return false;
        }
        debug!(clip = %clip, "Output exists, skipping");
        summary.skipped += 1;
        summary.finished += 1;
        metrics::record_skipped(1);
        true
    }

    async fn submit(&self, clip: Clip) -> CoordinatorResult<Job> {
        let job = DownloadClipJob::new(clip, self.config.params);
        let job = self.queue.enqueue(job, self.config.result_ttl).await?;
        metrics::record_enqueued();
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_done() {
        assert_eq!(percent_done(10, 7, 2), "90.00%");
        assert_eq!(percent_done(3, 1, 0), "33.33%");
        assert_eq!(percent_done(10, 0, 0), "0.00%");
        assert_eq!(percent_done(0, 0, 0), "0.00%");
        assert_eq!(percent_done(4, 3, 1), "100.00%");
    }
}
