//! Client side of the live event sync.
//!
//! Every screen (attendee app, admin dashboard, presentation display) polls
//! the small live pointer and refetches the full event only when the polled
//! phase or event changes. Phase changes therefore reach every observer within
//! one poll interval.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::{EventId, LiveEvent},
    error::{ApiError, ErrorCode},
    protocol::EventAggregate,
};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval used when the caller does not pick one: short while
/// developing, gentler on the server in release builds.
pub fn default_poll_interval() -> Duration {
    if cfg!(debug_assertions) {
        Duration::from_secs(1)
    } else {
        Duration::from_secs(5)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {status}: {}", .error.message)]
    Api { status: u16, error: ApiError },
}

#[async_trait]
pub trait LiveEventSource: Send + Sync {
    /// The live pointer, or `None` when no event is live.
    async fn fetch_live(&self) -> Result<Option<LiveEvent>, SyncError>;
    async fn fetch_aggregate(&self, event_id: EventId) -> Result<EventAggregate, SyncError>;
}

/// Reads the open `GET /live` and `GET /events/:id` endpoints.
#[derive(Clone)]
pub struct HttpLiveEventSource {
    http: Client,
    base: Url,
}

impl HttpLiveEventSource {
    pub fn new(server_url: &str) -> Result<Self, SyncError> {
        let mut base = Url::parse(server_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let url = self.base.join(path)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error = response.json::<ApiError>().await.unwrap_or_else(|_| {
                ApiError::new(ErrorCode::Internal, format!("unexpected status {status}"))
            });
            return Err(SyncError::Api {
                status: status.as_u16(),
                error,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl LiveEventSource for HttpLiveEventSource {
    async fn fetch_live(&self) -> Result<Option<LiveEvent>, SyncError> {
        self.get_json("live").await
    }

    async fn fetch_aggregate(&self, event_id: EventId) -> Result<EventAggregate, SyncError> {
        self.get_json(&format!("events/{event_id}")).await
    }
}

/// A cancellable fixed-interval poll loop.
///
/// `changed(previous, current)` decides whether `on_change` runs; the first
/// successful poll always counts as a change. When `on_change` fails the
/// observation is not recorded, so the next tick sees the same change again.
/// Errors are logged and never end the loop; only the token does.
pub struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    pub fn spawn<T, E, P, PFut, C, H, HFut>(
        interval: Duration,
        token: CancellationToken,
        mut poll: P,
        changed: C,
        mut on_change: H,
    ) -> Self
    where
        T: Clone + Send + Sync + 'static,
        E: std::fmt::Display + Send + 'static,
        P: FnMut() -> PFut + Send + 'static,
        PFut: Future<Output = Result<T, E>> + Send,
        C: Fn(&T, &T) -> bool + Send + 'static,
        H: FnMut(T) -> HFut + Send + 'static,
        HFut: Future<Output = Result<(), E>> + Send,
    {
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<T> = None;

            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let polled = tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    polled = poll() => polled,
                };
                let current = match polled {
                    Ok(current) => current,
                    Err(err) => {
                        warn!(error = %err, "poll failed");
                        continue;
                    }
                };

                let is_change = last
                    .as_ref()
                    .map_or(true, |previous| changed(previous, &current));
                if !is_change {
                    continue;
                }

                let handled = tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    handled = on_change(current.clone()) => handled,
                };
                match handled {
                    Ok(()) => last = Some(current),
                    Err(err) => warn!(error = %err, "change handler failed; retrying next tick"),
                }
            }
            debug!("poll task stopped");
        });
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the loop to end. Returns once the token has been cancelled.
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            warn!(error = %err, "poll task panicked");
        }
    }
}

/// What a screen should render right now.
#[derive(Debug, Clone)]
pub enum SyncUpdate {
    /// Nothing has been observed yet.
    Pending,
    /// No event is live.
    Idle,
    /// `live` is the latest pointer; `aggregate` was fetched when the pointer
    /// last changed event or phase.
    Live {
        live: LiveEvent,
        aggregate: EventAggregate,
    },
}

impl SyncUpdate {
    pub fn live(&self) -> Option<&LiveEvent> {
        match self {
            SyncUpdate::Live { live, .. } => Some(live),
            SyncUpdate::Pending | SyncUpdate::Idle => None,
        }
    }
}

/// Keeps a [`SyncUpdate`] current by polling a [`LiveEventSource`].
pub struct LiveEventSync {
    task: PollTask,
    updates: watch::Receiver<SyncUpdate>,
}

impl LiveEventSync {
    pub fn spawn(
        source: Arc<dyn LiveEventSource>,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        let (tx, updates) = watch::channel(SyncUpdate::Pending);
        let tx = Arc::new(tx);
        let poll_source = source.clone();

        let task = PollTask::spawn(
            interval,
            token,
            move || {
                let source = poll_source.clone();
                async move { source.fetch_live().await }
            },
            |previous: &Option<LiveEvent>, current: &Option<LiveEvent>| previous != current,
            move |live: Option<LiveEvent>| {
                let source = source.clone();
                let tx = tx.clone();
                async move { publish(source.as_ref(), &tx, live).await }
            },
        );
        Self { task, updates }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncUpdate> {
        self.updates.clone()
    }

    pub fn current(&self) -> SyncUpdate {
        self.updates.borrow().clone()
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub async fn join(self) {
        self.task.join().await;
    }
}

async fn publish(
    source: &dyn LiveEventSource,
    tx: &watch::Sender<SyncUpdate>,
    live: Option<LiveEvent>,
) -> Result<(), SyncError> {
    let Some(live) = live else {
        info!("no event is live");
        tx.send_replace(SyncUpdate::Idle);
        return Ok(());
    };

    let reusable = match &*tx.borrow() {
        SyncUpdate::Live {
            live: previous,
            aggregate,
        } if previous.event_id == live.event_id && previous.phase == live.phase => {
            Some(aggregate.clone())
        }
        _ => None,
    };
    let aggregate = match reusable {
        Some(aggregate) => aggregate,
        None => {
            info!(event_id = %live.event_id, phase = %live.phase, "phase changed; refetching event");
            source.fetch_aggregate(live.event_id).await?
        }
    };
    tx.send_replace(SyncUpdate::Live { live, aggregate });
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
