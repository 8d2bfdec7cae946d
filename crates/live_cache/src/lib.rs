//! The single "what is live right now" slot that every client polls.
//!
//! The relational row stays authoritative. This slot is a projection of it
//! that is cheap to read and may lag by one write.

use anyhow::{Context, Result};
use async_trait::async_trait;
use fred::prelude::*;
use shared::domain::LiveEvent;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Key of the one global live-event slot.
pub const LIVE_EVENT_KEY: &str = "live_event";

#[async_trait]
pub trait LiveEventPointer: Send + Sync {
    /// Overwrites the slot with `live`.
    async fn set(&self, live: &LiveEvent) -> Result<()>;
    async fn get(&self) -> Result<Option<LiveEvent>>;
    async fn clear(&self) -> Result<()>;
}

/// Process-local slot for tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryLivePointer {
    slot: RwLock<Option<LiveEvent>>,
}

impl InMemoryLivePointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LiveEventPointer for InMemoryLivePointer {
    async fn set(&self, live: &LiveEvent) -> Result<()> {
        *self.slot.write().await = Some(live.clone());
        Ok(())
    }

    async fn get(&self) -> Result<Option<LiveEvent>> {
        Ok(self.slot.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.slot.write().await.take();
        Ok(())
    }
}

/// Slot stored as JSON under [`LIVE_EVENT_KEY`] in Redis.
#[derive(Clone)]
pub struct RedisLivePointer {
    client: RedisClient,
    key: String,
}

impl RedisLivePointer {
    pub fn new(redis_url: &str) -> Result<Self> {
        let config = RedisConfig::from_url(redis_url)
            .with_context(|| format!("invalid redis url '{redis_url}'"))?;
        let client = RedisClient::new(config, None, None, None);
        Ok(Self {
            client,
            key: LIVE_EVENT_KEY.to_string(),
        })
    }

    pub async fn connect(&self) -> Result<()> {
        self.client.connect();
        self.client
            .wait_for_connect()
            .await
            .context("failed to connect to redis")?;
        info!(key = %self.key, "connected live event cache");
        Ok(())
    }
}

#[async_trait]
impl LiveEventPointer for RedisLivePointer {
    async fn set(&self, live: &LiveEvent) -> Result<()> {
        let payload = serde_json::to_string(live)?;
        self.client
            .set::<(), _, _>(self.key.as_str(), payload, None, None, false)
            .await
            .context("redis SET live event failed")?;
        debug!(event_id = %live.event_id, phase = %live.phase, "live event cached");
        Ok(())
    }

    async fn get(&self) -> Result<Option<LiveEvent>> {
        let payload: Option<String> = self
            .client
            .get(self.key.as_str())
            .await
            .context("redis GET live event failed")?;
        payload
            .map(|raw| serde_json::from_str(&raw).context("malformed live event in cache"))
            .transpose()
    }

    async fn clear(&self) -> Result<()> {
        self.client
            .del::<(), _>(self.key.as_str())
            .await
            .context("redis DEL live event failed")?;
        debug!("live event cache cleared");
        Ok(())
    }
}
