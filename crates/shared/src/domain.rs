use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(EventId);
id_newtype!(DemoId);
id_newtype!(AwardId);
id_newtype!(VoteId);

/// Identity handed to an attendee device by the attendee app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttendeeId(pub Uuid);

impl fmt::Display for AttendeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stage of a live event. Declaration order is the intended progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pre,
    Demos,
    Voting,
    Results,
    Recap,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Pre,
        Phase::Demos,
        Phase::Voting,
        Phase::Results,
        Phase::Recap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Demos => "demos",
            Phase::Voting => "voting",
            Phase::Results => "results",
            Phase::Recap => "recap",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub phase: Phase,
    pub current_demo_id: Option<DemoId>,
    pub current_award_id: Option<AwardId>,
    pub is_live: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demo {
    pub id: DemoId,
    pub event_id: EventId,
    pub index: i64,
    pub name: String,
    pub description: String,
    pub votable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    pub id: AwardId,
    pub event_id: EventId,
    pub index: i64,
    pub name: String,
    pub description: String,
    pub votable: bool,
    pub winner_id: Option<DemoId>,
}

/// Editable fields of a demo. The index is owned by the ordered collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_votable")]
    pub votable: bool,
}

/// Editable fields of an award. Winners are set through the winner gate only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_votable")]
    pub votable: bool,
}

fn default_votable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub event_id: EventId,
    pub attendee_id: AttendeeId,
    pub award_id: AwardId,
    /// `None` marks a retracted vote.
    pub demo_id: Option<DemoId>,
    pub updated_at: DateTime<Utc>,
}

/// Projection of the live event held in the fast cache and polled by every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEvent {
    pub event_id: EventId,
    pub name: String,
    pub phase: Phase,
    pub current_demo_id: Option<DemoId>,
    pub current_award_id: Option<AwardId>,
}

impl From<&Event> for LiveEvent {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id,
            name: event.name.clone(),
            phase: event.phase,
            current_demo_id: event.current_demo_id,
            current_award_id: event.current_award_id,
        }
    }
}

/// Reveal state of one award during the results walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealState {
    Locked,
    Reveal,
    Hide,
    Revealed,
}

impl RevealState {
    pub fn is_actionable(self) -> bool {
        matches!(self, RevealState::Reveal | RevealState::Hide)
    }
}

/// Non-blocking operator guidance for the current phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAdvice {
    pub suggested: Option<Phase>,
    pub warning: Option<String>,
}
