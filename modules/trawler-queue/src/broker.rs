//! Task broker — named Redis list queues with per-task reply lists.
//!
//! `LPUSH`/`BRPOP` gives at-least-once delivery: a consumer that dies after
//! popping simply forces the caller's timeout-and-retry path, so tasks must
//! be idempotent on their job id. The RPC round trip pushes the result to
//! `result:{task_id}`, where the enqueuing side blocks with a deadline.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const LLM_QUEUE: &str = "llm";
pub const SCRAPER_QUEUE: &str = "scraper";

/// How long an unclaimed result lingers before Redis reaps it.
const RESULT_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempt: u32,
}

#[derive(Clone)]
pub struct TaskBroker {
    conn: ConnectionManager,
}

impl TaskBroker {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid Redis url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("Failed to connect to Redis for task broker")?;
        Ok(Self { conn })
    }

    /// Enqueue a new task; returns the generated task id.
    pub async fn enqueue<P: Serialize>(
        &self,
        queue: &str,
        kind: &str,
        payload: &P,
    ) -> Result<String> {
        let envelope = TaskEnvelope {
            task_id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            payload: serde_json::to_value(payload)?,
            enqueued_at: Utc::now(),
            attempt: 0,
        };
        let task_id = envelope.task_id.clone();
        self.enqueue_envelope(queue, &envelope).await?;
        Ok(task_id)
    }

    /// Re-enqueue an existing envelope (retry path keeps the task id so the
    /// original caller's result wait still resolves).
    pub async fn enqueue_envelope(&self, queue: &str, envelope: &TaskEnvelope) -> Result<()> {
        let body = serde_json::to_string(envelope)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .lpush(queue, body)
            .await
            .with_context(|| format!("Failed to enqueue on {queue}"))?;
        debug!(
            queue,
            task_id = %envelope.task_id,
            kind = %envelope.kind,
            attempt = envelope.attempt,
            "Enqueued task"
        );
        Ok(())
    }

    /// Block until a task is available or the timeout passes.
    pub async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<TaskEnvelope>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .brpop(queue, timeout.as_secs_f64())
            .await
            .with_context(|| format!("Failed to dequeue from {queue}"))?;

        match popped {
            Some((_, body)) => {
                let envelope: TaskEnvelope =
                    serde_json::from_str(&body).context("Undecodable task envelope")?;
                Ok(Some(envelope))
            }
            None => Ok(None),
        }
    }

    /// Publish a task's result for whoever is awaiting it.
    pub async fn push_result(&self, task_id: &str, payload: &serde_json::Value) -> Result<()> {
        let key = result_key(task_id);
        let body = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(&key, body).await?;
        let _: () = conn.expire(&key, RESULT_TTL_SECS).await?;
        Ok(())
    }

    /// Block until a task's result arrives. `None` on timeout.
    pub async fn await_result(
        &self,
        task_id: &str,
        timeout: Duration,
    ) -> Result<Option<serde_json::Value>> {
        let key = result_key(task_id);
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .brpop(&key, timeout.as_secs_f64())
            .await
            .with_context(|| format!("Failed awaiting result for task {task_id}"))?;

        match popped {
            Some((_, body)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}

fn result_key(task_id: &str) -> String {
    format!("result:{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_key_naming() {
        assert_eq!(result_key("abc"), "result:abc");
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = TaskEnvelope {
            task_id: "t-1".into(),
            kind: "deep_search".into(),
            payload: serde_json::json!({"job_id": "j-1"}),
            enqueued_at: Utc::now(),
            attempt: 1,
        };

        let json = serde_json::to_string(&envelope).unwrap();
        let back: TaskEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, "t-1");
        assert_eq!(back.kind, "deep_search");
        assert_eq!(back.attempt, 1);
        assert_eq!(back.payload["job_id"], "j-1");
    }

    #[test]
    fn attempt_defaults_to_zero() {
        let json = r#"{
            "task_id": "t-2",
            "kind": "scrape_content",
            "payload": {},
            "enqueued_at": "2026-01-01T00:00:00Z"
        }"#;
        let envelope: TaskEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.attempt, 0);
    }
}
