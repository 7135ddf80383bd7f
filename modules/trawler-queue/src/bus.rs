//! Progress bus — Redis pub/sub keyed by job id.
//!
//! Publishing is fire-and-forget: a job must never fail because nobody could
//! hear about its progress. Subscribing requires a dedicated connection per
//! reader, so the bus keeps the client around to mint them.

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

use trawler_common::events::{job_channel, ProgressEvent};

#[derive(Clone)]
pub struct ProgressBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl ProgressBus {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid Redis url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("Failed to connect to Redis for progress bus")?;
        Ok(Self { client, conn })
    }

    /// Publish one event on `job:{id}`. Transport errors are logged and
    /// swallowed.
    pub async fn publish(&self, job_id: &str, event: &ProgressEvent) {
        let channel = job_channel(job_id);

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(job_id, error = %e, "Failed to serialize progress event");
                return;
            }
        };

        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn.publish(&channel, payload).await;
        match result {
            Ok(()) => debug!(job_id, kind = event.kind(), "Published progress event"),
            Err(e) => warn!(job_id, error = %e, "Failed to publish progress event"),
        }
    }

    /// Subscribe to a job's progress stream on a dedicated connection.
    ///
    /// The stream ends after a terminal event (`complete` or fatal `error`);
    /// undecodable payloads are skipped with a warning.
    pub async fn subscribe(
        &self,
        job_id: &str,
    ) -> Result<impl Stream<Item = ProgressEvent>> {
        let channel = job_channel(job_id);

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .context("Failed to open pub/sub connection")?;
        pubsub
            .subscribe(&channel)
            .await
            .with_context(|| format!("Failed to subscribe to {channel}"))?;

        let job_id = job_id.to_string();

        Ok(async_stream::stream! {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(job_id, error = %e, "Unreadable pub/sub payload");
                        continue;
                    }
                };

                match serde_json::from_str::<ProgressEvent>(&payload) {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(job_id, error = %e, "Undecodable progress event, skipping");
                    }
                }
            }
        })
    }
}
