// THEORY:
// Audits are independent and CPU-bound, so throughput comes from running many
// of them side by side rather than from parallelism inside one audit. The
// `AuditWorkerPool` owns a single shared `AuditPipeline` (it has no per-audit
// state) and a fixed set of worker tasks fed round-robin by a dispatcher.
// Each worker hands the actual computation to tokio's blocking pool so the
// async runtime never stalls on pixel work.
//
// Results come back through a oneshot channel per job; `audit_batch` awaits
// them in submission order, so output order always matches input order no
// matter which worker finishes first.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::AuditError;
use crate::pipeline::{AuditConfig, AuditPipeline, AuditResult};

/// One image and the manifest it should be audited against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditJob {
    pub image_path: PathBuf,
    pub manifest_path: PathBuf,
}

impl AuditJob {
    pub fn new(image_path: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            manifest_path: manifest_path.into(),
        }
    }
}

pub struct AuditTask {
    pub job: AuditJob,
    pub result_sender: oneshot::Sender<Result<AuditResult, AuditError>>,
}

pub struct AuditWorkerPool {
    task_sender: mpsc::UnboundedSender<AuditTask>,
    workers: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl AuditWorkerPool {
    /// One worker per logical CPU. Must be called from within a tokio runtime.
    pub fn new(config: AuditConfig) -> Self {
        Self::with_workers(config, num_cpus::get())
    }

    /// A pool with `worker_count` workers (at least one). Must be called from
    /// within a tokio runtime.
    pub fn with_workers(config: AuditConfig, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let pipeline = Arc::new(AuditPipeline::new(config));
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<AuditTask>();
        let mut workers = Vec::with_capacity(worker_count + 1);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<AuditTask>())
            .unzip();

        // Dispatcher
        workers.push(tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                // A closed worker drops the task, which the caller sees as a worker error.
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_senders.len();
            }
        }));

        for (worker_id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let pipeline = Arc::clone(&pipeline);
            workers.push(tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let pipeline = Arc::clone(&pipeline);
                    let job = task.job;
                    let outcome = tokio::task::spawn_blocking(move || {
                        pipeline.run_files(&job.image_path, &job.manifest_path)
                    })
                    .await
                    .unwrap_or_else(|e| Err(AuditError::Worker(format!("audit task failed: {e}"))));

                    let _ = task.result_sender.send(outcome);
                }
                debug!(worker_id, "audit worker stopped");
            }));
        }

        Self {
            task_sender,
            workers,
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Audits one job on the next worker in rotation.
    pub async fn audit(&self, job: AuditJob) -> Result<AuditResult, AuditError> {
        let (result_sender, result_receiver) = oneshot::channel();

        self.task_sender
            .send(AuditTask { job, result_sender })
            .map_err(|_| AuditError::Worker("failed to send task to worker pool".to_string()))?;

        result_receiver
            .await
            .map_err(|_| AuditError::Worker("failed to receive result from worker".to_string()))?
    }

    /// Audits every job concurrently; results are in job order.
    pub async fn audit_batch(&self, jobs: Vec<AuditJob>) -> Vec<Result<AuditResult, AuditError>> {
        join_all(jobs.into_iter().map(|job| self.audit(job))).await
    }

    /// Stops accepting work and waits for queued audits to finish.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::utils::image_helper::image_helper;
    use crate::pipeline::FidelityMode;
    use image::{DynamicImage, GrayImage, Luma};
    use std::path::Path;

    fn write_inputs(dir: &Path, name: &str, value: u8, manifest: &str) -> AuditJob {
        let image_path = dir.join(format!("{name}.png"));
        let manifest_path = dir.join(format!("{name}.txt"));
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(120, 90, Luma([value])));
        image_helper::save(&image_path, &image).unwrap();
        std::fs::write(&manifest_path, manifest).unwrap();
        AuditJob::new(image_path, manifest_path)
    }

    #[tokio::test]
    async fn batch_results_follow_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![
            write_inputs(dir.path(), "a", 10, "SKU1 1 A\n"),
            write_inputs(dir.path(), "b", 128, "SKU1 1 A\nSKU2 2 B\n"),
            AuditJob::new(dir.path().join("missing.png"), dir.path().join("a.txt")),
            write_inputs(dir.path(), "c", 240, ""),
        ];

        let pool = AuditWorkerPool::with_workers(AuditConfig::default(), 3);
        let results = pool.audit_batch(jobs.clone()).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap().declared_items.len(), 1);
        assert_eq!(results[1].as_ref().unwrap().declared_items.len(), 2);
        assert!(matches!(results[2], Err(AuditError::Decode(_))));
        assert!(results[3].as_ref().unwrap().declared_items.is_empty());
        assert_eq!(
            results[1].as_ref().unwrap().image_ref,
            jobs[1].image_path.display().to_string()
        );
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn pooled_audit_matches_direct_audit() {
        let dir = tempfile::tempdir().unwrap();
        let job = write_inputs(dir.path(), "shelf", 90, "SKU1 1 A\nSKU2 2 B\nSKU3 3 C\n");
        let config = AuditConfig { mode: FidelityMode::Reduced };

        let pool = AuditWorkerPool::with_workers(config, 2);
        let pooled = pool.audit(job.clone()).await.unwrap();
        let direct = AuditPipeline::new(config)
            .run_files(&job.image_path, &job.manifest_path)
            .unwrap();

        assert_eq!(pooled, direct);
    }

    #[tokio::test]
    async fn zero_workers_still_means_one() {
        let pool = AuditWorkerPool::with_workers(AuditConfig::default(), 0);
        assert_eq!(pool.worker_count(), 1);
    }
}
