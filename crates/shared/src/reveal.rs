//! Reveal sequencing for award winners.
//!
//! Awards are revealed in reverse display order: the award with the highest
//! index goes first and index 0 goes last. The event's `current_award_id`
//! names the most recently revealed award.

use crate::domain::{Award, AwardId, RevealState};

/// State of the award at `award_index` given the index of the most recently
/// revealed award and the number of awards in the event.
pub fn reveal_state(
    award_index: i64,
    revealed_index: Option<i64>,
    award_count: usize,
) -> RevealState {
    let last_index = award_count as i64 - 1;
    match revealed_index {
        None if award_index == last_index => RevealState::Reveal,
        None => RevealState::Locked,
        Some(current) if award_index == current => RevealState::Hide,
        Some(current) if award_index == current - 1 => RevealState::Reveal,
        Some(current) if award_index > current => RevealState::Revealed,
        Some(_) => RevealState::Locked,
    }
}

/// Index of the revealed award, or `None` when the pointer is unset or names
/// an award outside this list.
pub fn revealed_index(awards: &[Award], current_award_id: Option<AwardId>) -> Option<i64> {
    let current = current_award_id?;
    awards.iter().find(|a| a.id == current).map(|a| a.index)
}

pub fn reveal_states(
    awards: &[Award],
    current_award_id: Option<AwardId>,
) -> Vec<(AwardId, RevealState)> {
    let revealed = revealed_index(awards, current_award_id);
    awards
        .iter()
        .map(|a| (a.id, reveal_state(a.index, revealed, awards.len())))
        .collect()
}

pub fn state_of(
    awards: &[Award],
    current_award_id: Option<AwardId>,
    award_id: AwardId,
) -> Option<RevealState> {
    let award = awards.iter().find(|a| a.id == award_id)?;
    let revealed = revealed_index(awards, current_award_id);
    Some(reveal_state(award.index, revealed, awards.len()))
}

/// Pointer value after hiding the award at `hidden_index`: the award revealed
/// just before it, or nothing when it was the first one revealed.
pub fn pointer_after_hide(awards: &[Award], hidden_index: i64) -> Option<AwardId> {
    awards
        .iter()
        .find(|a| a.index == hidden_index + 1)
        .map(|a| a.id)
}

#[cfg(test)]
#[path = "tests/reveal_tests.rs"]
mod tests;
