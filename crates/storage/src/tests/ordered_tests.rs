use super::*;
use crate::Storage;

async fn event_with_demos(names: &[&str]) -> (Storage, EventId, Vec<Demo>) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let event = storage.create_event("demo night").await.expect("event");
    let mut demos = Vec::new();
    for name in names {
        let demo = storage
            .demos()
            .append(event.id, &draft(name))
            .await
            .expect("append");
        demos.push(demo);
    }
    (storage, event.id, demos)
}

fn draft(name: &str) -> DemoDraft {
    DemoDraft {
        name: name.to_string(),
        description: String::new(),
        votable: true,
    }
}

async fn order(storage: &Storage, event_id: EventId) -> Vec<(String, i64)> {
    storage
        .demos()
        .list(event_id)
        .await
        .expect("list")
        .into_iter()
        .map(|d| (d.name, d.index))
        .collect()
}

async fn assert_contiguous(storage: &Storage, event_id: EventId) {
    let indices: Vec<i64> = storage
        .demos()
        .list(event_id)
        .await
        .expect("list")
        .into_iter()
        .map(|d| d.index)
        .collect();
    let expected: Vec<i64> = (0..indices.len() as i64).collect();
    assert_eq!(indices, expected);
}

fn pairs(names: &[&str]) -> Vec<(String, i64)> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.to_string(), i as i64))
        .collect()
}

#[tokio::test]
async fn append_assigns_next_index() {
    let (storage, event_id, demos) = event_with_demos(&["A", "B", "C"]).await;
    assert_eq!(
        demos.iter().map(|d| d.index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(storage.demos().count(event_id).await.expect("count"), 3);
}

#[tokio::test]
async fn append_to_missing_event_fails() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let err = storage
        .demos()
        .append(EventId(42), &draft("A"))
        .await
        .expect_err("missing parent");
    assert!(matches!(err, StorageError::EventNotFound(EventId(42))));
}

#[tokio::test]
async fn move_last_item_up() {
    let (storage, event_id, demos) = event_with_demos(&["A", "B", "C", "D"]).await;
    let moved = storage.demos().move_to(demos[3].id, 1).await.expect("move");
    assert_eq!(moved.index, 1);
    assert_eq!(order(&storage, event_id).await, pairs(&["A", "D", "B", "C"]));
}

#[tokio::test]
async fn move_first_item_down() {
    let (storage, event_id, demos) = event_with_demos(&["A", "B", "C", "D"]).await;
    storage.demos().move_to(demos[0].id, 2).await.expect("move");
    assert_eq!(order(&storage, event_id).await, pairs(&["B", "C", "A", "D"]));
}

#[tokio::test]
async fn out_of_range_and_same_index_moves_are_ignored() {
    let (storage, event_id, demos) = event_with_demos(&["A", "B", "C", "D"]).await;
    for target in [1, -1, 4, 100] {
        let item = storage
            .demos()
            .move_to(demos[1].id, target)
            .await
            .expect("move");
        assert_eq!(item.index, 1);
    }
    assert_eq!(order(&storage, event_id).await, pairs(&["A", "B", "C", "D"]));
}

#[tokio::test]
async fn move_missing_item_fails() {
    let (storage, _, _) = event_with_demos(&["A"]).await;
    let err = storage
        .demos()
        .move_to(DemoId(999), 0)
        .await
        .expect_err("missing item");
    assert!(matches!(
        err,
        StorageError::ItemNotFound { kind: "demo", id: 999 }
    ));
}

#[tokio::test]
async fn remove_closes_gap() {
    let (storage, event_id, demos) = event_with_demos(&["A", "B", "C", "D"]).await;
    let removed = storage.demos().remove(demos[1].id).await.expect("remove");
    assert_eq!(removed.name, "B");
    assert_eq!(order(&storage, event_id).await, pairs(&["A", "C", "D"]));
}

#[tokio::test]
async fn collections_are_scoped_per_event() {
    let (storage, first_event, first_demos) = event_with_demos(&["A", "B"]).await;
    let other = storage.create_event("other").await.expect("event");
    storage
        .demos()
        .append(other.id, &draft("X"))
        .await
        .expect("append");

    storage.demos().remove(first_demos[0].id).await.expect("remove");
    assert_eq!(order(&storage, first_event).await, pairs(&["B"]));
    assert_eq!(order(&storage, other.id).await, pairs(&["X"]));
}

#[tokio::test]
async fn replace_all_reindexes_in_given_order() {
    let (storage, event_id, _) = event_with_demos(&["A", "B", "C"]).await;
    let replaced = storage
        .demos()
        .replace_all(event_id, &[draft("Z"), draft("Y")])
        .await
        .expect("replace");
    assert_eq!(replaced.len(), 2);
    assert_eq!(order(&storage, event_id).await, pairs(&["Z", "Y"]));
}

#[tokio::test]
async fn replace_all_for_missing_event_keeps_nothing_partial() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let err = storage
        .awards()
        .replace_all(
            EventId(7),
            &[AwardDraft {
                name: "best".into(),
                description: String::new(),
                votable: true,
            }],
        )
        .await
        .expect_err("missing parent");
    assert!(matches!(err, StorageError::EventNotFound(_)));
}

#[tokio::test]
async fn update_keeps_index() {
    let (storage, _, demos) = event_with_demos(&["A", "B"]).await;
    let updated = storage
        .demos()
        .update(
            demos[1].id,
            &DemoDraft {
                name: "B2".into(),
                description: "new".into(),
                votable: false,
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.index, 1);
    assert_eq!(updated.name, "B2");
    assert!(!updated.votable);
}

#[tokio::test]
async fn indices_stay_contiguous_across_mixed_operations() {
    let (storage, event_id, _) = event_with_demos(&["A", "B", "C", "D", "E", "F"]).await;
    let mut seed: u64 = 0x5eed;
    let mut next = move |bound: i64| {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((seed >> 33) as i64).rem_euclid(bound.max(1))
    };

    for step in 0..60 {
        let demos = storage.demos().list(event_id).await.expect("list");
        match step % 5 {
            0 | 1 | 2 if !demos.is_empty() => {
                let item = &demos[next(demos.len() as i64) as usize];
                let target = next(demos.len() as i64 + 2) - 1;
                storage.demos().move_to(item.id, target).await.expect("move");
            }
            3 if demos.len() > 2 => {
                let item = &demos[next(demos.len() as i64) as usize];
                storage.demos().remove(item.id).await.expect("remove");
            }
            _ => {
                storage
                    .demos()
                    .append(event_id, &draft(&format!("N{step}")))
                    .await
                    .expect("append");
            }
        }
        assert_contiguous(&storage, event_id).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_on_a_file_database_keep_indices_contiguous() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = format!(
        "sqlite://{}",
        dir.path().join("ordering.db").to_string_lossy().replace('\\', "/")
    );
    let storage = Storage::new(&database_url).await.expect("db");
    let event = storage.create_event("demo night").await.expect("event");
    let mut demos = Vec::new();
    for name in ["A", "B", "C", "D", "E", "F"] {
        let demo = storage
            .demos()
            .append(event.id, &draft(name))
            .await
            .expect("append");
        demos.push(demo);
    }

    let mut tasks = Vec::new();
    for round in 0..4_i64 {
        for (i, demo) in demos.iter().enumerate().skip(1) {
            let collection = storage.demos();
            let id = demo.id;
            let target = (i as i64 + round) % 6;
            tasks.push(tokio::spawn(async move {
                collection.move_to(id, target).await.map(|_| ())
            }));
        }
        let collection = storage.demos();
        let event_id = event.id;
        tasks.push(tokio::spawn(async move {
            collection
                .append(event_id, &draft(&format!("late {round}")))
                .await
                .map(|_| ())
        }));
    }
    let collection = storage.demos();
    let removed = demos[0].id;
    tasks.push(tokio::spawn(async move {
        collection.remove(removed).await.map(|_| ())
    }));

    for task in tasks {
        task.await.expect("join").expect("write queued behind the lock");
    }
    assert_eq!(storage.demos().count(event.id).await.expect("count"), 9);
    assert_contiguous(&storage, event.id).await;
}

#[tokio::test]
async fn set_winner_requires_demo_from_same_event() {
    let (storage, event_id, demos) = event_with_demos(&["A"]).await;
    let award = storage
        .awards()
        .append(
            event_id,
            &AwardDraft {
                name: "best".into(),
                description: String::new(),
                votable: true,
            },
        )
        .await
        .expect("award");

    let other = storage.create_event("other").await.expect("event");
    let foreign = storage
        .demos()
        .append(other.id, &draft("X"))
        .await
        .expect("demo");

    let err = storage
        .awards()
        .set_winner(award.id, Some(foreign.id))
        .await
        .expect_err("foreign demo");
    assert!(matches!(err, StorageError::ItemNotFound { kind: "demo", .. }));

    let won = storage
        .awards()
        .set_winner(award.id, Some(demos[0].id))
        .await
        .expect("winner");
    assert_eq!(won.winner_id, Some(demos[0].id));

    let cleared = storage
        .awards()
        .set_winner(award.id, None)
        .await
        .expect("clear");
    assert_eq!(cleared.winner_id, None);
}
