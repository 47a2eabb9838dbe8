//! End-to-end dispatch scenarios over the in-process queue.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use clipq_coordinator::{Catalog, CoordinatorConfig, Dispatcher, RunSummary};
use clipq_media::{
    MediaError, MediaResult, StreamHandle, StreamKind, StreamProvider, TranscodeRequest,
    Transcoder,
};
use clipq_models::Clip;
use clipq_queue::{MemoryQueue, WorkerQueue};
use clipq_worker::{JobExecutor, WorkerConfig, WorkerRunner};

/// Every download of a source listed in `broken` fails; sources listed in
/// `slow` take a while to arrive.
struct FakeProvider {
    broken: HashSet<String>,
    slow: HashSet<String>,
}

#[async_trait]
impl StreamProvider for FakeProvider {
    async fn list_streams(&self, _source_id: &str) -> MediaResult<Vec<StreamHandle>> {
        Ok(vec![
            StreamHandle::new("18", StreamKind::Combined, "mp4").with_height(360),
            StreamHandle::new("43", StreamKind::Combined, "webm").with_height(360),
        ])
    }

    async fn download(
        &self,
        source_id: &str,
        stream: &StreamHandle,
        dest_dir: &Path,
        stem: &str,
    ) -> MediaResult<PathBuf> {
        if self.slow.contains(source_id) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        if self.broken.contains(source_id) {
            return Err(MediaError::download_failed("HTTP Error 500"));
        }
        let path = dest_dir.join(format!("{}.{}.{}", stem, stream.tag, stream.container));
        tokio::fs::write(&path, source_id.as_bytes()).await?;
        Ok(path)
    }
}

/// Copies the downloaded source into the output, prefixed with `clip:`, and
/// records the order in which outputs were produced.
#[derive(Default)]
struct FakeTranscoder {
    produced: Mutex<Vec<String>>,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, request: &TranscodeRequest) -> MediaResult<()> {
        let source = tokio::fs::read(&request.inputs[0]).await?;
        let mut out = b"clip:".to_vec();
        out.extend_from_slice(&source);
        tokio::fs::write(&request.output, out).await?;
        self.produced
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&source).into_owned());
        Ok(())
    }
}

struct Harness {
    queue: MemoryQueue,
    save_dir: tempfile::TempDir,
    work_dir: tempfile::TempDir,
    provider: Arc<FakeProvider>,
    transcoder: Arc<FakeTranscoder>,
    runners: Vec<Arc<WorkerRunner>>,
    workers: Vec<JoinHandle<()>>,
}

impl Harness {
    fn new(broken: &[&str]) -> Self {
        Self::with_queue(MemoryQueue::new(), broken, &[])
    }

    fn with_queue(queue: MemoryQueue, broken: &[&str], slow: &[&str]) -> Self {
        let provider = FakeProvider {
            broken: broken.iter().map(|s| s.to_string()).collect(),
            slow: slow.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            queue,
            save_dir: tempfile::tempdir().unwrap(),
            work_dir: tempfile::tempdir().unwrap(),
            provider: Arc::new(provider),
            transcoder: Arc::new(FakeTranscoder::default()),
            runners: Vec::new(),
            workers: Vec::new(),
        }
    }

    fn start_workers(&mut self, count: usize) {
        for i in 0..count {
            let config = WorkerConfig {
                work_dir: self.work_dir.path().to_path_buf(),
                block: Duration::from_millis(5),
                ..Default::default()
            };
            let executor = JobExecutor::new(
                config,
                Arc::clone(&self.provider) as Arc<dyn StreamProvider>,
                Arc::clone(&self.transcoder) as Arc<dyn Transcoder>,
            )
            .with_hostname(format!("worker-{}", i + 1));
            let runner = Arc::new(WorkerRunner::new(Arc::new(self.queue.clone()), executor));

            let task_runner = Arc::clone(&runner);
            self.workers.push(tokio::spawn(async move {
                task_runner.run().await.unwrap();
            }));
            self.runners.push(runner);
        }
    }

    fn config(&self, max_in_flight: usize) -> CoordinatorConfig {
        CoordinatorConfig::new("unused.csv", self.save_dir.path())
            .with_max_in_flight(max_in_flight)
            .with_backoff(Duration::from_millis(1))
    }

    async fn dispatch(&self, catalog: Catalog, max_in_flight: usize) -> RunSummary {
        let dispatcher = Dispatcher::new(self.config(max_in_flight), Arc::new(self.queue.clone()));
        tokio::time::timeout(Duration::from_secs(10), dispatcher.run(catalog))
            .await
            .expect("dispatch loop did not finish")
            .unwrap()
    }

    fn saved_files(&self) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(self.save_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn produced(&self) -> Vec<String> {
        self.transcoder.produced.lock().unwrap().clone()
    }

    async fn stop(self) {
        for runner in &self.runners {
            runner.shutdown();
        }
        for worker in self.workers {
            worker.await.unwrap();
        }
    }
}

fn catalog(sources: &[&str]) -> Catalog {
    Catalog::new(
        sources
            .iter()
            .map(|s| Clip::new(*s, 30.0, 40.0, "/m/09x0r").unwrap())
            .collect(),
    )
}

#[tokio::test]
async fn test_mixed_outcomes_with_two_in_flight() {
    let mut harness = Harness::new(&["bbb"]);
    harness.start_workers(1);

    let summary = harness.dispatch(catalog(&["aaa", "bbb", "ccc"]), 2).await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.finished, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.missing, 0);
    assert_eq!(summary.submitted, 3);
    assert!(summary.peak_in_flight <= 2);
    assert_eq!(summary.percent_done(), "100.00%");

    assert_eq!(
        harness.saved_files(),
        vec!["aaa_30.0_40.0.mp4".to_string(), "ccc_30.0_40.0.mp4".to_string()]
    );
    let bytes = std::fs::read(harness.save_dir.path().join("aaa_30.0_40.0.mp4")).unwrap();
    assert_eq!(bytes, b"clip:aaa");

    // Finished records are deleted; the failed one is retained for inspection.
    assert_eq!(harness.queue.len(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_out_of_order_completion() {
    let mut harness = Harness::with_queue(MemoryQueue::new(), &["bbb"], &["aaa"]);
    harness.start_workers(2);

    let summary = harness.dispatch(catalog(&["aaa", "bbb", "ccc"]), 2).await;

    // `ccc` was submitted after `aaa` but finished first.
    assert_eq!(harness.produced(), vec!["ccc".to_string(), "aaa".to_string()]);

    assert_eq!(summary.finished, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.missing, 0);
    assert_eq!(summary.percent_done(), "100.00%");
    assert_eq!(
        harness.saved_files(),
        vec!["aaa_30.0_40.0.mp4".to_string(), "ccc_30.0_40.0.mp4".to_string()]
    );
    let bytes = std::fs::read(harness.save_dir.path().join("ccc_30.0_40.0.mp4")).unwrap();
    assert_eq!(bytes, b"clip:ccc");

    harness.stop().await;
}

#[tokio::test]
async fn test_second_run_submits_nothing() {
    let mut harness = Harness::new(&[]);
    harness.start_workers(1);

    let first = harness.dispatch(catalog(&["aaa", "bbb", "ccc"]), 2).await;
    assert_eq!(first.finished, 3);
    assert_eq!(first.submitted, 3);

    let second = harness.dispatch(catalog(&["aaa", "bbb", "ccc"]), 2).await;
    assert_eq!(second.submitted, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.finished, 3);
    assert_eq!(second.failed, 0);
    assert_eq!(second.peak_in_flight, 0);
    assert_eq!(second.percent_done(), "100.00%");

    harness.stop().await;
}

#[tokio::test]
async fn test_admission_never_exceeds_capacity() {
    let mut harness = Harness::new(&["c05", "c07"]);
    harness.start_workers(1);

    let sources: Vec<String> = (0..10).map(|i| format!("c{:02}", i)).collect();
    let refs: Vec<&str> = sources.iter().map(String::as_str).collect();
    let summary = harness.dispatch(catalog(&refs), 3).await;

    assert!(summary.peak_in_flight >= 1);
    assert!(summary.peak_in_flight <= 3);
    assert_eq!(summary.finished, 8);
    assert_eq!(summary.failed, 2);
    assert_eq!(harness.saved_files().len(), 8);
    assert!(!harness.saved_files().contains(&"c05_30.0_40.0.mp4".to_string()));

    harness.stop().await;
}

#[tokio::test]
async fn test_vanished_job_is_reported_missing() {
    let harness = Harness::new(&[]);

    // A "worker" that loses every job it takes.
    let queue = harness.queue.clone();
    let reaper = tokio::spawn(async move {
        loop {
            if let Some(delivery) = queue.dequeue("reaper", Duration::from_millis(5)).await.unwrap()
            {
                queue.expire(delivery.job_id());
                return;
            }
        }
    });

    let summary = harness.dispatch(catalog(&["aaa"]), 2).await;
    reaper.await.unwrap();

    assert_eq!(summary.submitted, 1);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.finished, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.percent_done(), "0.00%");
    assert!(harness.saved_files().is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn test_empty_catalog_finishes_immediately() {
    let harness = Harness::new(&[]);
    let summary = harness.dispatch(Catalog::default(), 2).await;
    assert_eq!(summary, RunSummary::default());
    harness.stop().await;
}

#[tokio::test]
async fn test_abandoned_job_expires_and_is_reported_missing() {
    let harness = Harness::with_queue(
        MemoryQueue::new().with_lease(Duration::from_millis(50)),
        &[],
        &[],
    );

    // A worker that dies right after taking the job.
    let queue = harness.queue.clone();
    let crashed = tokio::spawn(async move {
        loop {
            if let Some(delivery) = queue.dequeue("crashed", Duration::from_millis(5)).await.unwrap()
            {
                drop(delivery);
                return;
            }
        }
    });

    let summary = harness.dispatch(catalog(&["aaa"]), 2).await;
    crashed.await.unwrap();

    assert_eq!(summary.submitted, 1);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.finished, 0);
    assert_eq!(summary.failed, 0);
    assert!(harness.saved_files().is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn test_duplicate_clip_is_not_submitted_while_in_flight() {
    let mut harness = Harness::with_queue(MemoryQueue::new(), &[], &["dup"]);
    harness.start_workers(2);

    let summary = harness.dispatch(catalog(&["dup", "dup"]), 2).await;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.submitted, 1);
    assert_eq!(summary.peak_in_flight, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.finished, 2);
    assert_eq!(summary.percent_done(), "100.00%");
    assert_eq!(harness.produced(), vec!["dup".to_string()]);
    assert_eq!(harness.saved_files(), vec!["dup_30.0_40.0.mp4".to_string()]);

    harness.stop().await;
}

#[tokio::test]
async fn test_duplicate_of_failed_clip_is_retried_after_it_settles() {
    let mut harness = Harness::with_queue(MemoryQueue::new(), &["bad"], &["bad"]);
    harness.start_workers(2);

    let summary = harness.dispatch(catalog(&["bad", "ok", "bad"]), 3).await;

    assert_eq!(summary.submitted, 3);
    assert!(summary.peak_in_flight <= 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.finished, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(harness.saved_files(), vec!["ok_30.0_40.0.mp4".to_string()]);

    harness.stop().await;
}
