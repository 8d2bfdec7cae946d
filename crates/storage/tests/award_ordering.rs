use shared::domain::{AwardDraft, Phase};
use storage::{Storage, StorageError};

fn award(name: &str) -> AwardDraft {
    AwardDraft {
        name: name.to_string(),
        description: format!("{name} award"),
        votable: true,
    }
}

#[tokio::test]
async fn awards_reorder_like_demos_and_keep_winner_fields() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let event = storage.create_event("finals").await.expect("event");
    let awards = storage
        .awards()
        .replace_all(event.id, &[award("best"), award("crowd"), award("tech")])
        .await
        .expect("replace");

    let moved = storage
        .awards()
        .move_to(awards[0].id, 2)
        .await
        .expect("move");
    assert_eq!(moved.index, 2);

    let names: Vec<String> = storage
        .awards()
        .list(event.id)
        .await
        .expect("list")
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["crowd", "tech", "best"]);

    storage.awards().remove(awards[1].id).await.expect("remove");
    let indices: Vec<i64> = storage
        .awards()
        .list(event.id)
        .await
        .expect("list")
        .into_iter()
        .map(|a| a.index)
        .collect();
    assert_eq!(indices, vec![0, 1]);
}

#[tokio::test]
async fn phase_updates_are_unconditional() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let event = storage.create_event("finals").await.expect("event");

    let jumped = storage
        .set_phase(event.id, Phase::Results)
        .await
        .expect("jump");
    assert_eq!(jumped.phase, Phase::Results);

    let back = storage.set_phase(event.id, Phase::Pre).await.expect("back");
    assert_eq!(back.phase, Phase::Pre);

    let err = storage
        .set_phase(shared::domain::EventId(404), Phase::Demos)
        .await
        .expect_err("missing");
    assert!(matches!(err, StorageError::EventNotFound(_)));
}
