use std::collections::BTreeMap;

use shared::{
    domain::{
        AttendeeId, Award, AwardId, Demo, DemoId, Event, EventId, Phase, RevealState, Vote,
    },
    error::ApiError,
    protocol::{AwardTally, CastVoteRequest, DemoVoteCount},
    reveal::{pointer_after_hide, state_of},
};
use tracing::info;

use crate::{publish, retry_on_conflict, store, ApiContext};

/// Per-demo counts of the non-retracted votes for `award_id`.
///
/// Every votable demo is listed, with zero when nobody picked it. Demos come
/// in display order. Ties are left as they are.
pub fn tally(award_id: AwardId, demos: &[Demo], votes: &[Vote]) -> AwardTally {
    let mut counted: BTreeMap<DemoId, u64> = BTreeMap::new();
    for demo_id in votes
        .iter()
        .filter(|v| v.award_id == award_id)
        .filter_map(|v| v.demo_id)
    {
        *counted.entry(demo_id).or_default() += 1;
    }

    let mut counts = Vec::with_capacity(demos.len());
    for demo in demos {
        let votes = counted.remove(&demo.id).unwrap_or(0);
        if demo.votable || votes > 0 {
            counts.push(DemoVoteCount {
                demo_id: demo.id,
                votes,
            });
        }
    }
    counts.extend(
        counted
            .into_iter()
            .map(|(demo_id, votes)| DemoVoteCount { demo_id, votes }),
    );
    AwardTally { award_id, counts }
}

pub async fn tally_votes(ctx: &ApiContext, award_id: AwardId) -> Result<AwardTally, ApiError> {
    let award = require_award(ctx, award_id).await?;
    let demos = ctx
        .storage
        .demos()
        .list(award.event_id)
        .await
        .map_err(store)?;
    let votes = ctx
        .storage
        .votes_for_award(award_id)
        .await
        .map_err(store)?;
    Ok(tally(award_id, &demos, &votes))
}

/// Picks or clears the winner in any phase. Reveal state is untouched.
pub async fn set_winner(
    ctx: &ApiContext,
    award_id: AwardId,
    demo_id: Option<DemoId>,
) -> Result<Award, ApiError> {
    let awards = &ctx.storage.awards();
    let award = retry_on_conflict(move || awards.set_winner(award_id, demo_id))
        .await
        .map_err(store)?;
    info!(%award_id, winner = ?demo_id, "winner set");
    Ok(award)
}

/// Shows the award's winner. Only the award next in reverse display order
/// may be revealed.
pub async fn reveal_award(ctx: &ApiContext, award_id: AwardId) -> Result<Event, ApiError> {
    let (award, event, awards) = reveal_context(ctx, award_id).await?;
    ensure_state(&awards, &event, award_id, RevealState::Reveal)?;
    let event = swap_pointer(ctx, &event, Some(award.id)).await?;
    info!(event_id = %event.id, %award_id, index = award.index, "award revealed");
    Ok(event)
}

/// Takes back the most recent reveal. The pointer returns to the award
/// revealed before it, or to nothing.
pub async fn hide_award(ctx: &ApiContext, award_id: AwardId) -> Result<Event, ApiError> {
    let (award, event, awards) = reveal_context(ctx, award_id).await?;
    ensure_state(&awards, &event, award_id, RevealState::Hide)?;
    let previous = pointer_after_hide(&awards, award.index);
    let event = swap_pointer(ctx, &event, previous).await?;
    info!(event_id = %event.id, %award_id, ?previous, "award hidden");
    Ok(event)
}

/// Records or replaces an attendee's vote. Only accepted while voting is open.
pub async fn cast_vote(ctx: &ApiContext, request: &CastVoteRequest) -> Result<Vote, ApiError> {
    let event = ctx
        .storage
        .require_event(request.event_id)
        .await
        .map_err(store)?;
    if event.phase != Phase::Voting {
        return Err(ApiError::invalid_state(format!(
            "voting is closed while the event is in {}",
            event.phase
        )));
    }

    let award = require_award(ctx, request.award_id).await?;
    if award.event_id != event.id {
        return Err(ApiError::not_found(format!(
            "award {} not found in event {}",
            award.id, event.id
        )));
    }
    if !award.votable {
        return Err(ApiError::validation(format!(
            "award {} is not open to votes",
            award.id
        )));
    }

    if let Some(demo_id) = request.demo_id {
        let demo = ctx.storage.demos().get(demo_id).await.map_err(store)?;
        if !demo.is_some_and(|d| d.event_id == event.id) {
            return Err(ApiError::not_found(format!(
                "demo {demo_id} not found in event {}",
                event.id
            )));
        }
    }

    ctx.storage
        .upsert_vote(event.id, request.attendee_id, award.id, request.demo_id)
        .await
        .map_err(store)
}

/// The attendee's standing ballot in the event, so a device can restore it.
pub async fn attendee_votes(
    ctx: &ApiContext,
    event_id: EventId,
    attendee_id: AttendeeId,
) -> Result<Vec<Vote>, ApiError> {
    ctx.storage.require_event(event_id).await.map_err(store)?;
    ctx.storage
        .votes_by_attendee(event_id, attendee_id)
        .await
        .map_err(store)
}

async fn require_award(ctx: &ApiContext, award_id: AwardId) -> Result<Award, ApiError> {
    ctx.storage
        .awards()
        .get(award_id)
        .await
        .map_err(store)?
        .ok_or_else(|| ApiError::not_found(format!("award {award_id} not found")))
}

async fn reveal_context(
    ctx: &ApiContext,
    award_id: AwardId,
) -> Result<(Award, Event, Vec<Award>), ApiError> {
    let award = require_award(ctx, award_id).await?;
    let event = ctx
        .storage
        .require_event(award.event_id)
        .await
        .map_err(store)?;
    let awards = ctx
        .storage
        .awards()
        .list(event.id)
        .await
        .map_err(store)?;
    Ok((award, event, awards))
}

fn ensure_state(
    awards: &[Award],
    event: &Event,
    award_id: AwardId,
    wanted: RevealState,
) -> Result<(), ApiError> {
    let state = state_of(awards, event.current_award_id, award_id)
        .ok_or_else(|| ApiError::not_found(format!("award {award_id} not found")))?;
    if state != wanted {
        return Err(ApiError::invalid_state(format!(
            "award {award_id} is {state:?}, expected {wanted:?}"
        )));
    }
    Ok(())
}

async fn swap_pointer(
    ctx: &ApiContext,
    event: &Event,
    next: Option<AwardId>,
) -> Result<Event, ApiError> {
    let updated = ctx
        .storage
        .swap_current_award(event.id, event.current_award_id, next)
        .await
        .map_err(store)?
        .ok_or_else(|| {
            ApiError::invalid_state("the revealed award changed underneath this request")
        })?;
    publish(ctx, &updated).await?;
    Ok(updated)
}
