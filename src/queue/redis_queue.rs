use crate::queue::{new_job_id, EnqueueOptions, Job, JobCounts, JobQueue, QueueName, QueuedJob};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Script};
use std::time::Duration;

/// A claimed job whose worker vanished is handed out again after this long.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(120);

// KEYS: jobs, active, waiting. ARGV: id, payload, due ms.
const SCHEDULE_SCRIPT: &str = r#"
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('ZREM', KEYS[2], ARGV[1])
return redis.call('ZADD', KEYS[3], ARGV[3], ARGV[1])
"#;

// KEYS: waiting, active, jobs. ARGV: now ms, lease expiry ms.
// Returns {requeued} or {requeued, id, payload}.
const CLAIM_SCRIPT: &str = r#"
local stalled = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, id in ipairs(stalled) do
  redis.call('ZREM', KEYS[2], id)
  redis.call('ZADD', KEYS[1], ARGV[1], id)
end
while true do
  local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
  if #due == 0 then
    return {tostring(#stalled)}
  end
  local id = due[1]
  redis.call('ZREM', KEYS[1], id)
  local payload = redis.call('HGET', KEYS[3], id)
  if payload then
    redis.call('ZADD', KEYS[2], ARGV[2], id)
    return {tostring(#stalled), id, payload}
  end
end
"#;

// KEYS: active, jobs, counter. ARGV: id.
const FINISH_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
return redis.call('INCR', KEYS[3])
"#;

/// Delayed queue on Redis sorted sets.
///
/// Per queue: `waiting` and `active` are ZSETs of job ids scored by epoch ms
/// (due time and lease expiry), `jobs` is a HASH of id to job JSON, and
/// `completed`/`failed` are counters. Every move between the sets runs as one
/// Lua script, so a worker dying mid-call never leaves a job in neither set.
#[derive(Clone)]
pub struct RedisQueue {
    pub client: redis::Client,
    pub prefix: String,
    pub lease: Duration,
}

impl RedisQueue {
    pub fn new(redis_url: &str) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            prefix: "paygate:queue".to_string(),
            lease: DEFAULT_LEASE,
        })
    }

    fn key(&self, queue: QueueName, part: &str) -> String {
        format!("{}:{}:{}", self.prefix, queue.as_str(), part)
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn lease_ms(delay: Duration) -> i64 {
        i64::try_from(delay.as_millis()).unwrap_or(i64::MAX / 2)
    }

    fn due_ms(delay: Duration) -> i64 {
        Self::now_ms() + Self::lease_ms(delay)
    }

    async fn schedule(&self, job: &QueuedJob, delay: Duration) -> Result<()> {
        let queue = job.job.queue();
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;

        let _: i64 = Script::new(SCHEDULE_SCRIPT)
            .key(self.key(queue, "jobs"))
            .key(self.key(queue, "active"))
            .key(self.key(queue, "waiting"))
            .arg(&job.id)
            .arg(payload)
            .arg(Self::due_ms(delay))
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn finish(&self, job: &QueuedJob, counter: &str) -> Result<()> {
        let queue = job.job.queue();
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = Script::new(FINISH_SCRIPT)
            .key(self.key(queue, "active"))
            .key(self.key(queue, "jobs"))
            .key(self.key(queue, counter))
            .arg(&job.id)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: Job, opts: EnqueueOptions) -> Result<String> {
        let queued = QueuedJob {
            id: new_job_id(),
            job,
            attempts_made: 0,
            max_attempts: opts.max_attempts.max(1),
        };
        self.schedule(&queued, opts.delay).await?;
        Ok(queued.id)
    }

    async fn reserve(&self, queue: QueueName) -> Result<Option<QueuedJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let now = Self::now_ms();

        let reply: Vec<String> = Script::new(CLAIM_SCRIPT)
            .key(self.key(queue, "waiting"))
            .key(self.key(queue, "active"))
            .key(self.key(queue, "jobs"))
            .arg(now)
            .arg(now + Self::lease_ms(self.lease))
            .invoke_async(&mut conn)
            .await?;

        let mut reply = reply.into_iter();
        let requeued: u64 = reply.next().and_then(|n| n.parse().ok()).unwrap_or(0);
        if requeued > 0 {
            tracing::warn!(queue = queue.as_str(), requeued, "lease expired, jobs requeued");
        }

        match (reply.next(), reply.next()) {
            (Some(_id), Some(payload)) => Ok(Some(serde_json::from_str::<QueuedJob>(&payload)?)),
            _ => Ok(None),
        }
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        self.finish(job, "completed").await
    }

    async fn release(&self, job: &QueuedJob, delay: Duration) -> Result<()> {
        let mut next = job.clone();
        next.attempts_made += 1;
        self.schedule(&next, delay).await
    }

    async fn fail(&self, job: &QueuedJob, reason: &str) -> Result<()> {
        tracing::warn!(
            queue = job.job.queue().as_str(),
            job_id = %job.id,
            attempts = job.attempts_made + 1,
            reason,
            "job failed"
        );
        self.finish(job, "failed").await
    }

    async fn counts(&self, queue: QueueName) -> Result<JobCounts> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let waiting: u64 = conn.zcard(self.key(queue, "waiting")).await?;
        let active: u64 = conn.zcard(self.key(queue, "active")).await?;
        let completed: Option<u64> = conn.get(self.key(queue, "completed")).await?;
        let failed: Option<u64> = conn.get(self.key(queue, "failed")).await?;

        Ok(JobCounts {
            waiting,
            active,
            completed: completed.unwrap_or(0),
            failed: failed.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_queue(lease: Duration) -> RedisQueue {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string());
        let mut q = RedisQueue::new(&url).unwrap();
        q.prefix = format!("paygate:test:{}", uuid::Uuid::new_v4());
        q.lease = lease;
        q
    }

    fn refund_job() -> Job {
        Job::ProcessRefund {
            refund_id: "rfnd_lease".to_string(),
        }
    }

    #[tokio::test]
    #[ignore] // needs a running Redis
    async fn expired_lease_hands_the_job_out_again() {
        let q = test_queue(Duration::from_millis(50));
        let id = q.enqueue(refund_job(), EnqueueOptions::default()).await.unwrap();

        let first = q.reserve(QueueName::Refunds).await.unwrap().unwrap();
        assert_eq!(first.id, id);
        assert!(q.reserve(QueueName::Refunds).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(120)).await;

        let again = q.reserve(QueueName::Refunds).await.unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.job, refund_job());
        let counts = q.counts(QueueName::Refunds).await.unwrap();
        assert_eq!((counts.waiting, counts.active), (0, 1));

        q.complete(&again).await.unwrap();
        let counts = q.counts(QueueName::Refunds).await.unwrap();
        assert_eq!((counts.active, counts.completed), (0, 1));
    }

    #[tokio::test]
    #[ignore] // needs a running Redis
    async fn release_moves_job_back_with_delay() {
        let q = test_queue(DEFAULT_LEASE);
        q.enqueue(refund_job(), EnqueueOptions::default()).await.unwrap();

        let job = q.reserve(QueueName::Refunds).await.unwrap().unwrap();
        q.release(&job, Duration::from_secs(60)).await.unwrap();

        assert!(q.reserve(QueueName::Refunds).await.unwrap().is_none());
        let counts = q.counts(QueueName::Refunds).await.unwrap();
        assert_eq!((counts.waiting, counts.active), (1, 0));
    }

    #[test]
    fn keys_are_namespaced_per_queue() {
        let q = RedisQueue::new("redis://127.0.0.1:6379/").unwrap();
        assert_eq!(q.key(QueueName::Webhooks, "waiting"), "paygate:queue:webhooks:waiting");
        assert_eq!(q.key(QueueName::Payments, "jobs"), "paygate:queue:payments:jobs");
    }
}
