use serde::{Deserialize, Serialize};

use crate::domain::{
    AttendeeId, Award, AwardId, Demo, DemoId, Event, EventId, Phase, PhaseAdvice, RevealState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameEventRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPhaseRequest {
    pub phase: Phase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCurrentDemoRequest {
    #[serde(default)]
    pub demo_id: Option<DemoId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCurrentAwardRequest {
    #[serde(default)]
    pub award_id: Option<AwardId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveItemRequest {
    pub index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWinnerRequest {
    #[serde(default)]
    pub demo_id: Option<DemoId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVoteRequest {
    pub event_id: EventId,
    pub attendee_id: AttendeeId,
    pub award_id: AwardId,
    #[serde(default)]
    pub demo_id: Option<DemoId>,
}

/// Result of a phase change: the updated row plus advice for the new phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseUpdate {
    pub event: Event,
    pub advice: PhaseAdvice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardReveal {
    pub award_id: AwardId,
    pub state: RevealState,
}

/// Everything a client renders for one event, fetched whenever the polled phase changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAggregate {
    pub event: Event,
    pub demos: Vec<Demo>,
    pub awards: Vec<Award>,
    pub advice: PhaseAdvice,
    pub reveal: Vec<AwardReveal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoVoteCount {
    pub demo_id: DemoId,
    pub votes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardTally {
    pub award_id: AwardId,
    pub counts: Vec<DemoVoteCount>,
}

impl AwardTally {
    pub fn votes_for(&self, demo_id: DemoId) -> Option<u64> {
        self.counts
            .iter()
            .find(|c| c.demo_id == demo_id)
            .map(|c| c.votes)
    }
}
