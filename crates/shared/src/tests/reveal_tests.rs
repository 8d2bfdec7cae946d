use super::*;
use crate::domain::{DemoId, EventId};

fn awards(count: i64) -> Vec<Award> {
    (0..count)
        .map(|i| Award {
            id: AwardId(100 + i),
            event_id: EventId(1),
            index: i,
            name: format!("award {i}"),
            description: String::new(),
            votable: true,
            winner_id: Some(DemoId(1)),
        })
        .collect()
}

fn states(awards: &[Award], current: Option<AwardId>) -> Vec<RevealState> {
    reveal_states(awards, current)
        .into_iter()
        .map(|(_, state)| state)
        .collect()
}

#[test]
fn nothing_revealed_only_last_award_is_revealable() {
    let awards = awards(3);
    assert_eq!(
        states(&awards, None),
        vec![RevealState::Locked, RevealState::Locked, RevealState::Reveal]
    );
}

#[test]
fn walk_proceeds_in_reverse_index_order() {
    let awards = awards(3);

    assert_eq!(
        states(&awards, Some(AwardId(102))),
        vec![RevealState::Locked, RevealState::Reveal, RevealState::Hide]
    );
    assert_eq!(
        states(&awards, Some(AwardId(101))),
        vec![RevealState::Reveal, RevealState::Hide, RevealState::Revealed]
    );
    assert_eq!(
        states(&awards, Some(AwardId(100))),
        vec![RevealState::Hide, RevealState::Revealed, RevealState::Revealed]
    );
}

#[test]
fn stale_pointer_is_treated_as_nothing_revealed() {
    let awards = awards(2);
    assert_eq!(
        states(&awards, Some(AwardId(999))),
        vec![RevealState::Locked, RevealState::Reveal]
    );
}

#[test]
fn state_of_unknown_award_is_none() {
    let awards = awards(2);
    assert_eq!(state_of(&awards, None, AwardId(7)), None);
    assert_eq!(
        state_of(&awards, None, AwardId(101)),
        Some(RevealState::Reveal)
    );
}

#[test]
fn hiding_moves_pointer_back_one_step() {
    let awards = awards(3);
    assert_eq!(pointer_after_hide(&awards, 1), Some(AwardId(102)));
    assert_eq!(pointer_after_hide(&awards, 2), None);
    assert!(RevealState::Hide.is_actionable());
    assert!(!RevealState::Revealed.is_actionable());
}
