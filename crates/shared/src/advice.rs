//! Operator guidance for phase changes.
//!
//! Phase transitions are never blocked. These functions only compute what the
//! admin dashboard shows next to the phase switcher: the phase that would
//! naturally come next, or a warning when the current phase still has work
//! left. Both are pure so the dashboard and the server agree on them.

use crate::domain::{Award, Demo, Event, Phase, PhaseAdvice};

const FIRST_DEMO_NOT_LIVE: &str = "first demo is not live yet";
const LAST_DEMO_NOT_LIVE: &str = "last demo is not live yet";
const WINNERS_MISSING: &str = "not every votable award has a winner";
const AWARDS_NOT_REVEALED: &str = "not every award has been revealed";

pub fn phase_advice(event: &Event, demos: &[Demo], awards: &[Award]) -> PhaseAdvice {
    match event.phase {
        Phase::Pre => {
            let first = demos.iter().min_by_key(|d| d.index).map(|d| d.id);
            match event.current_demo_id {
                None => suggest(Phase::Demos),
                Some(current) if Some(current) == first => suggest(Phase::Demos),
                Some(_) => warn(FIRST_DEMO_NOT_LIVE),
            }
        }
        Phase::Demos => {
            let last = demos.iter().max_by_key(|d| d.index).map(|d| d.id);
            if last.is_some() && event.current_demo_id == last {
                suggest(Phase::Voting)
            } else {
                warn(LAST_DEMO_NOT_LIVE)
            }
        }
        Phase::Voting => {
            let all_decided = awards
                .iter()
                .filter(|a| a.votable)
                .all(|a| a.winner_id.is_some());
            if all_decided {
                suggest(Phase::Results)
            } else {
                warn(WINNERS_MISSING)
            }
        }
        Phase::Results => {
            let first = awards.iter().min_by_key(|a| a.index).map(|a| a.id);
            if first.is_some() && event.current_award_id == first {
                suggest(Phase::Recap)
            } else {
                warn(AWARDS_NOT_REVEALED)
            }
        }
        Phase::Recap => PhaseAdvice::default(),
    }
}

fn suggest(phase: Phase) -> PhaseAdvice {
    PhaseAdvice {
        suggested: Some(phase),
        warning: None,
    }
}

fn warn(message: &str) -> PhaseAdvice {
    PhaseAdvice {
        suggested: None,
        warning: Some(message.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/advice_tests.rs"]
mod tests;
