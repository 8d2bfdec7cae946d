//! Operations behind the admin and attendee endpoints.
//!
//! Every mutation that can change the live event's phase or pointers writes
//! the relational row first and then republishes the [`LiveEventPointer`]
//! before returning, so a poller never sees a slot older than the row that
//! was just acknowledged.

use std::{future::Future, sync::Arc};

use live_cache::LiveEventPointer;
use shared::{
    advice::phase_advice as advise,
    domain::{AwardId, DemoId, Event, EventId, LiveEvent, Phase, PhaseAdvice},
    error::{ApiError, ErrorCode},
    protocol::{AwardReveal, EventAggregate, PhaseUpdate},
    reveal::reveal_states,
};
use storage::{Storage, StorageError};
use tracing::{info, warn};

mod items;
mod voting;

pub use items::*;
pub use voting::*;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub live: Arc<dyn LiveEventPointer>,
}

pub async fn create_event(ctx: &ApiContext, name: &str) -> Result<Event, ApiError> {
    let name = require_name(name)?;
    let event = ctx.storage.create_event(name).await.map_err(store)?;
    info!(event_id = %event.id, "event created");
    Ok(event)
}

pub async fn list_events(ctx: &ApiContext) -> Result<Vec<Event>, ApiError> {
    ctx.storage.list_events().await.map_err(store)
}

pub async fn get_event(ctx: &ApiContext, event_id: EventId) -> Result<Event, ApiError> {
    ctx.storage.require_event(event_id).await.map_err(store)
}

pub async fn rename_event(
    ctx: &ApiContext,
    event_id: EventId,
    name: &str,
) -> Result<Event, ApiError> {
    let name = require_name(name)?;
    let event = ctx
        .storage
        .rename_event(event_id, name)
        .await
        .map_err(store)?;
    publish(ctx, &event).await?;
    Ok(event)
}

/// Deletes the event with its demos, awards and votes. The live slot is
/// cleared if it pointed at this event.
pub async fn delete_event(ctx: &ApiContext, event_id: EventId) -> Result<Event, ApiError> {
    let event = ctx.storage.delete_event(event_id).await.map_err(store)?;
    let stale = event.is_live
        || match ctx.live.get().await {
            Ok(cached) => cached.is_some_and(|live| live.event_id == event_id),
            Err(err) => {
                warn!(%event_id, error = %err, "live cache read failed while deleting event");
                false
            }
        };
    if stale {
        ctx.live.clear().await.map_err(internal)?;
    }
    info!(%event_id, "event deleted");
    Ok(event)
}

/// Makes `event_id` the single live event. Fails while another event is live.
pub async fn start_live_event(ctx: &ApiContext, event_id: EventId) -> Result<LiveEvent, ApiError> {
    let storage = &ctx.storage;
    let event = retry_on_conflict(move || storage.set_live(event_id))
        .await
        .map_err(store)?;
    let live = LiveEvent::from(&event);
    ctx.live.set(&live).await.map_err(internal)?;
    info!(%event_id, phase = %event.phase, "event is live");
    Ok(live)
}

pub async fn stop_live_event(ctx: &ApiContext) -> Result<(), ApiError> {
    let stopped = ctx.storage.clear_live().await.map_err(store)?;
    ctx.live.clear().await.map_err(internal)?;
    info!(?stopped, "live event stopped");
    Ok(())
}

/// Reads the live slot. When the cache is unreachable the relational row
/// answers instead.
pub async fn get_live_event(ctx: &ApiContext) -> Result<Option<LiveEvent>, ApiError> {
    match ctx.live.get().await {
        Ok(live) => Ok(live),
        Err(err) => {
            warn!(error = %err, "live cache read failed; falling back to database");
            let event = ctx.storage.live_event().await.map_err(store)?;
            Ok(event.as_ref().map(LiveEvent::from))
        }
    }
}

/// Rewrites the live slot from the relational row, which always wins.
pub async fn refresh_live_pointer(ctx: &ApiContext) -> Result<Option<LiveEvent>, ApiError> {
    let live = ctx
        .storage
        .live_event()
        .await
        .map_err(store)?
        .as_ref()
        .map(LiveEvent::from);
    match &live {
        Some(live) => ctx.live.set(live).await.map_err(internal)?,
        None => ctx.live.clear().await.map_err(internal)?,
    }
    Ok(live)
}

/// Sets the phase unconditionally and returns advice for the new phase.
/// Advice warnings never block the change.
pub async fn set_phase(
    ctx: &ApiContext,
    event_id: EventId,
    phase: Phase,
) -> Result<PhaseUpdate, ApiError> {
    let event = ctx
        .storage
        .set_phase(event_id, phase)
        .await
        .map_err(store)?;
    publish(ctx, &event).await?;
    let advice = advice_for(ctx, &event).await?;
    if let Some(warning) = &advice.warning {
        warn!(%event_id, %phase, warning, "phase changed with outstanding work");
    } else {
        info!(%event_id, %phase, "phase changed");
    }
    Ok(PhaseUpdate { event, advice })
}

pub async fn set_current_demo(
    ctx: &ApiContext,
    event_id: EventId,
    demo_id: Option<DemoId>,
) -> Result<Event, ApiError> {
    let storage = &ctx.storage;
    let event = retry_on_conflict(move || storage.set_current_demo(event_id, demo_id))
        .await
        .map_err(store)?;
    publish(ctx, &event).await?;
    Ok(event)
}

/// Points the event at any of its awards, bypassing the reveal sequence.
pub async fn set_current_award(
    ctx: &ApiContext,
    event_id: EventId,
    award_id: Option<AwardId>,
) -> Result<Event, ApiError> {
    let storage = &ctx.storage;
    let event = retry_on_conflict(move || storage.set_current_award(event_id, award_id))
        .await
        .map_err(store)?;
    publish(ctx, &event).await?;
    Ok(event)
}

pub async fn phase_advice(ctx: &ApiContext, event_id: EventId) -> Result<PhaseAdvice, ApiError> {
    let event = get_event(ctx, event_id).await?;
    advice_for(ctx, &event).await
}

/// Event row plus its ordered demos and awards, phase advice and the reveal
/// state of every award.
pub async fn get_event_aggregate(
    ctx: &ApiContext,
    event_id: EventId,
) -> Result<EventAggregate, ApiError> {
    let event = get_event(ctx, event_id).await?;
    let demos = ctx.storage.demos().list(event_id).await.map_err(store)?;
    let awards = ctx.storage.awards().list(event_id).await.map_err(store)?;
    let advice = advise(&event, &demos, &awards);
    let reveal = reveal_states(&awards, event.current_award_id)
        .into_iter()
        .map(|(award_id, state)| AwardReveal { award_id, state })
        .collect();
    Ok(EventAggregate {
        event,
        demos,
        awards,
        advice,
        reveal,
    })
}

async fn advice_for(ctx: &ApiContext, event: &Event) -> Result<PhaseAdvice, ApiError> {
    let demos = ctx.storage.demos().list(event.id).await.map_err(store)?;
    let awards = ctx.storage.awards().list(event.id).await.map_err(store)?;
    Ok(advise(event, &demos, &awards))
}

/// Republishes the slot when `event` is the live one.
async fn publish(ctx: &ApiContext, event: &Event) -> Result<(), ApiError> {
    if event.is_live {
        ctx.live
            .set(&LiveEvent::from(event))
            .await
            .map_err(internal)?;
    }
    Ok(())
}

/// Re-reads the event after a collection change that may have nulled one of
/// its pointers, and republishes it if it is live.
async fn republish(ctx: &ApiContext, event_id: EventId) -> Result<(), ApiError> {
    match ctx.storage.get_event(event_id).await.map_err(store)? {
        Some(event) => publish(ctx, &event).await,
        None => Ok(()),
    }
}

/// Runs `op` again once if SQLite reported a write conflict.
async fn retry_on_conflict<T, F, Fut>(mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    match op().await {
        Err(err) if err.is_conflict() => {
            warn!(error = %err, "write conflict; retrying once");
            op().await
        }
        other => other,
    }
}

fn require_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    Ok(name)
}

fn store(err: StorageError) -> ApiError {
    match err {
        StorageError::EventNotFound(_) | StorageError::ItemNotFound { .. } => {
            ApiError::not_found(err.to_string())
        }
        StorageError::AlreadyLive(id) => ApiError::invalid_state(format!(
            "event {id} is already live; stop it before starting another"
        )),
        StorageError::Conflict(_) => ApiError::new(
            ErrorCode::ConflictRetry,
            "another change landed at the same time; retry",
        ),
        StorageError::Corrupt(_) | StorageError::Database(_) => {
            ApiError::new(ErrorCode::Internal, err.to_string())
        }
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
