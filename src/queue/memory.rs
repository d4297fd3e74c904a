use crate::queue::{new_job_id, EnqueueOptions, Job, JobCounts, JobQueue, QueueName, QueuedJob};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Waiting {
    due: Instant,
    delay: Duration,
    job: QueuedJob,
}

#[derive(Debug, Default)]
struct Lane {
    waiting: Vec<Waiting>,
    active: HashMap<String, QueuedJob>,
    completed: u64,
    failed: Vec<(QueuedJob, String)>,
}

/// Single-process queue used by tests and local runs without Redis.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    lanes: Arc<Mutex<HashMap<QueueName, Lane>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waiting jobs on `queue` with the delay each was scheduled with, oldest first.
    pub async fn scheduled(&self, queue: QueueName) -> Vec<(Job, Duration)> {
        let lanes = self.lanes.lock().await;
        lanes
            .get(&queue)
            .map(|lane| lane.waiting.iter().map(|w| (w.job.job.clone(), w.delay)).collect())
            .unwrap_or_default()
    }

    /// Removes and returns every waiting job on `queue`, ignoring due times.
    pub async fn drain(&self, queue: QueueName) -> Vec<Job> {
        let mut lanes = self.lanes.lock().await;
        lanes
            .get_mut(&queue)
            .map(|lane| lane.waiting.drain(..).map(|w| w.job.job).collect())
            .unwrap_or_default()
    }

    pub async fn failed_reasons(&self, queue: QueueName) -> Vec<String> {
        let lanes = self.lanes.lock().await;
        lanes
            .get(&queue)
            .map(|lane| lane.failed.iter().map(|(_, reason)| reason.clone()).collect())
            .unwrap_or_default()
    }

    async fn push(&self, job: QueuedJob, delay: Duration) {
        let mut lanes = self.lanes.lock().await;
        let lane = lanes.entry(job.job.queue()).or_default();
        lane.active.remove(&job.id);
        lane.waiting.push(Waiting {
            due: Instant::now() + delay,
            delay,
            job,
        });
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(&self, job: Job, opts: EnqueueOptions) -> Result<String> {
        let id = new_job_id();
        let queued = QueuedJob {
            id: id.clone(),
            job,
            attempts_made: 0,
            max_attempts: opts.max_attempts.max(1),
        };
        self.push(queued, opts.delay).await;
        Ok(id)
    }

    async fn reserve(&self, queue: QueueName) -> Result<Option<QueuedJob>> {
        let mut lanes = self.lanes.lock().await;
        let Some(lane) = lanes.get_mut(&queue) else {
            return Ok(None);
        };

        let now = Instant::now();
        let next = lane
            .waiting
            .iter()
            .enumerate()
            .filter(|(_, w)| w.due <= now)
            .min_by_key(|(_, w)| w.due)
            .map(|(idx, _)| idx);

        Ok(next.map(|idx| {
            let job = lane.waiting.remove(idx).job;
            lane.active.insert(job.id.clone(), job.clone());
            job
        }))
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        let mut lanes = self.lanes.lock().await;
        let lane = lanes.entry(job.job.queue()).or_default();
        lane.active.remove(&job.id);
        lane.completed += 1;
        Ok(())
    }

    async fn release(&self, job: &QueuedJob, delay: Duration) -> Result<()> {
        let mut next = job.clone();
        next.attempts_made += 1;
        self.push(next, delay).await;
        Ok(())
    }

    async fn fail(&self, job: &QueuedJob, reason: &str) -> Result<()> {
        let mut lanes = self.lanes.lock().await;
        let lane = lanes.entry(job.job.queue()).or_default();
        lane.active.remove(&job.id);
        lane.failed.push((job.clone(), reason.to_string()));
        Ok(())
    }

    async fn counts(&self, queue: QueueName) -> Result<JobCounts> {
        let lanes = self.lanes.lock().await;
        Ok(lanes
            .get(&queue)
            .map(|lane| JobCounts {
                waiting: lane.waiting.len() as u64,
                active: lane.active.len() as u64,
                completed: lane.completed,
                failed: lane.failed.len() as u64,
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment_job(id: &str) -> Job {
        Job::ProcessPayment {
            payment_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn delayed_jobs_are_not_reserved_early() {
        let q = InMemoryQueue::new();
        q.enqueue(payment_job("pay_late"), EnqueueOptions::delayed(Duration::from_secs(60)))
            .await
            .unwrap();
        q.enqueue(payment_job("pay_now"), EnqueueOptions::default())
            .await
            .unwrap();

        let job = q.reserve(QueueName::Payments).await.unwrap().unwrap();
        assert_eq!(job.job, payment_job("pay_now"));
        assert!(q.reserve(QueueName::Payments).await.unwrap().is_none());
        assert!(q.reserve(QueueName::Webhooks).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lifecycle_counts() {
        let q = InMemoryQueue::new();
        q.enqueue(payment_job("a"), EnqueueOptions::default()).await.unwrap();
        q.enqueue(payment_job("b"), EnqueueOptions::default()).await.unwrap();

        let a = q.reserve(QueueName::Payments).await.unwrap().unwrap();
        let counts = q.counts(QueueName::Payments).await.unwrap();
        assert_eq!((counts.waiting, counts.active), (1, 1));

        q.complete(&a).await.unwrap();
        let b = q.reserve(QueueName::Payments).await.unwrap().unwrap();
        q.release(&b, Duration::ZERO).await.unwrap();
        let b = q.reserve(QueueName::Payments).await.unwrap().unwrap();
        assert_eq!(b.attempts_made, 1);
        q.fail(&b, "boom").await.unwrap();

        let counts = q.counts(QueueName::Payments).await.unwrap();
        assert_eq!(
            counts,
            JobCounts {
                waiting: 0,
                active: 0,
                completed: 1,
                failed: 1
            }
        );
        assert_eq!(q.failed_reasons(QueueName::Payments).await, vec!["boom".to_string()]);
    }
}
