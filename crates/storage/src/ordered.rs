//! Gap-free ordered collections scoped by event.
//!
//! Demos and awards both carry an `idx` column that must hold exactly
//! `0..count` within one event between transactions. Every operation that
//! reads or shifts indices does so inside a single transaction, so the shift
//! arithmetic always sees the same rows it rewrites.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnection, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use tracing::debug;

use shared::domain::{Award, AwardDraft, AwardId, Demo, DemoDraft, DemoId, EventId};

use crate::error::{StorageError, StorageResult};

/// Table binding for one kind of ordered item.
#[async_trait]
pub trait OrderedKind: Send + Sync + 'static {
    /// Used in not-found errors.
    const KIND: &'static str;
    const TABLE: &'static str;
    const COLUMNS: &'static str;

    type Id: Copy + Send + Sync;
    type Item: Send;
    type Draft: Sync;

    fn raw_id(id: Self::Id) -> i64;
    fn event_of(item: &Self::Item) -> EventId;
    fn from_row(row: &SqliteRow) -> Self::Item;

    async fn insert(
        conn: &mut SqliteConnection,
        event_id: EventId,
        index: i64,
        draft: &Self::Draft,
    ) -> sqlx::Result<Self::Item>;

    async fn update(
        conn: &mut SqliteConnection,
        id: Self::Id,
        draft: &Self::Draft,
    ) -> sqlx::Result<Option<Self::Item>>;
}

pub struct DemoKind;

#[async_trait]
impl OrderedKind for DemoKind {
    const KIND: &'static str = "demo";
    const TABLE: &'static str = "demos";
    const COLUMNS: &'static str = "id, event_id, idx, name, description, votable";

    type Id = DemoId;
    type Item = Demo;
    type Draft = DemoDraft;

    fn raw_id(id: DemoId) -> i64 {
        id.0
    }

    fn event_of(item: &Demo) -> EventId {
        item.event_id
    }

    fn from_row(row: &SqliteRow) -> Demo {
        Demo {
            id: DemoId(row.get::<i64, _>("id")),
            event_id: EventId(row.get::<i64, _>("event_id")),
            index: row.get::<i64, _>("idx"),
            name: row.get::<String, _>("name"),
            description: row.get::<String, _>("description"),
            votable: row.get::<bool, _>("votable"),
        }
    }

    async fn insert(
        conn: &mut SqliteConnection,
        event_id: EventId,
        index: i64,
        draft: &DemoDraft,
    ) -> sqlx::Result<Demo> {
        let row = sqlx::query(
            "INSERT INTO demos (event_id, idx, name, description, votable)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, event_id, idx, name, description, votable",
        )
        .bind(event_id.0)
        .bind(index)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.votable)
        .fetch_one(&mut *conn)
        .await?;
        Ok(Self::from_row(&row))
    }

    async fn update(
        conn: &mut SqliteConnection,
        id: DemoId,
        draft: &DemoDraft,
    ) -> sqlx::Result<Option<Demo>> {
        let row = sqlx::query(
            "UPDATE demos SET name = ?, description = ?, votable = ?
             WHERE id = ?
             RETURNING id, event_id, idx, name, description, votable",
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.votable)
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.as_ref().map(Self::from_row))
    }
}

pub struct AwardKind;

#[async_trait]
impl OrderedKind for AwardKind {
    const KIND: &'static str = "award";
    const TABLE: &'static str = "awards";
    const COLUMNS: &'static str = "id, event_id, idx, name, description, votable, winner_id";

    type Id = AwardId;
    type Item = Award;
    type Draft = AwardDraft;

    fn raw_id(id: AwardId) -> i64 {
        id.0
    }

    fn event_of(item: &Award) -> EventId {
        item.event_id
    }

    fn from_row(row: &SqliteRow) -> Award {
        Award {
            id: AwardId(row.get::<i64, _>("id")),
            event_id: EventId(row.get::<i64, _>("event_id")),
            index: row.get::<i64, _>("idx"),
            name: row.get::<String, _>("name"),
            description: row.get::<String, _>("description"),
            votable: row.get::<bool, _>("votable"),
            winner_id: row.get::<Option<i64>, _>("winner_id").map(DemoId),
        }
    }

    async fn insert(
        conn: &mut SqliteConnection,
        event_id: EventId,
        index: i64,
        draft: &AwardDraft,
    ) -> sqlx::Result<Award> {
        let row = sqlx::query(
            "INSERT INTO awards (event_id, idx, name, description, votable)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, event_id, idx, name, description, votable, winner_id",
        )
        .bind(event_id.0)
        .bind(index)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.votable)
        .fetch_one(&mut *conn)
        .await?;
        Ok(Self::from_row(&row))
    }

    async fn update(
        conn: &mut SqliteConnection,
        id: AwardId,
        draft: &AwardDraft,
    ) -> sqlx::Result<Option<Award>> {
        let row = sqlx::query(
            "UPDATE awards SET name = ?, description = ?, votable = ?
             WHERE id = ?
             RETURNING id, event_id, idx, name, description, votable, winner_id",
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.votable)
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.as_ref().map(Self::from_row))
    }
}

/// Index-maintaining view over one ordered table.
pub struct OrderedCollection<K: OrderedKind> {
    pool: Pool<Sqlite>,
    _kind: PhantomData<K>,
}

impl<K: OrderedKind> Clone for OrderedCollection<K> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<K: OrderedKind> OrderedCollection<K> {
    pub(crate) fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            _kind: PhantomData,
        }
    }

    pub async fn list(&self, event_id: EventId) -> StorageResult<Vec<K::Item>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE event_id = ? ORDER BY idx ASC",
            K::COLUMNS,
            K::TABLE
        );
        let rows = sqlx::query(&sql)
            .bind(event_id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(K::from_row).collect())
    }

    pub async fn get(&self, id: K::Id) -> StorageResult<Option<K::Item>> {
        let mut conn = self.pool.acquire().await?;
        fetch_item::<K>(&mut conn, K::raw_id(id)).await
    }

    pub async fn count(&self, event_id: EventId) -> StorageResult<i64> {
        let mut conn = self.pool.acquire().await?;
        count_in_scope::<K>(&mut conn, event_id).await
    }

    /// Appends `draft` as the last item of the event.
    pub async fn append(&self, event_id: EventId, draft: &K::Draft) -> StorageResult<K::Item> {
        let mut tx = begin_write(&self.pool).await?;
        ensure_event(&mut tx, event_id).await?;
        let index = count_in_scope::<K>(&mut tx, event_id).await?;
        let item = K::insert(&mut tx, event_id, index, draft).await?;
        tx.commit().await?;
        debug!(kind = K::KIND, %event_id, index, "appended item");
        Ok(item)
    }

    /// Rewrites the editable fields of an item without touching its index.
    pub async fn update(&self, id: K::Id, draft: &K::Draft) -> StorageResult<K::Item> {
        let mut conn = self.pool.acquire().await?;
        K::update(&mut conn, id, draft)
            .await?
            .ok_or_else(|| not_found::<K>(K::raw_id(id)))
    }

    /// Moves an item to `new_index`, shifting the items in between by one.
    ///
    /// Out-of-range targets and the current index leave the collection
    /// untouched and return the item as it is.
    pub async fn move_to(&self, id: K::Id, new_index: i64) -> StorageResult<K::Item> {
        let raw_id = K::raw_id(id);
        let mut tx = begin_write(&self.pool).await?;
        let (event_id, current) = position_of::<K>(&mut tx, raw_id).await?;
        let max_index = count_in_scope::<K>(&mut tx, event_id).await? - 1;

        if new_index == current || new_index < 0 || new_index > max_index {
            let item = fetch_item::<K>(&mut tx, raw_id)
                .await?
                .ok_or_else(|| not_found::<K>(raw_id))?;
            tx.commit().await?;
            debug!(kind = K::KIND, id = raw_id, new_index, max_index, "move ignored");
            return Ok(item);
        }

        let shift = if new_index > current {
            format!(
                "UPDATE {} SET idx = idx - 1 WHERE event_id = ? AND idx > ? AND idx <= ?",
                K::TABLE
            )
        } else {
            format!(
                "UPDATE {} SET idx = idx + 1 WHERE event_id = ? AND idx < ? AND idx >= ?",
                K::TABLE
            )
        };
        sqlx::query(&shift)
            .bind(event_id.0)
            .bind(current)
            .bind(new_index)
            .execute(&mut *tx)
            .await?;

        let place = format!("UPDATE {} SET idx = ? WHERE id = ?", K::TABLE);
        sqlx::query(&place)
            .bind(new_index)
            .bind(raw_id)
            .execute(&mut *tx)
            .await?;

        let item = fetch_item::<K>(&mut tx, raw_id)
            .await?
            .ok_or_else(|| not_found::<K>(raw_id))?;
        tx.commit().await?;
        debug!(kind = K::KIND, id = raw_id, from = current, to = new_index, "moved item");
        Ok(item)
    }

    /// Deletes an item and closes the gap it leaves. Returns the deleted row.
    pub async fn remove(&self, id: K::Id) -> StorageResult<K::Item> {
        let raw_id = K::raw_id(id);
        let mut tx = begin_write(&self.pool).await?;
        let item = fetch_item::<K>(&mut tx, raw_id)
            .await?
            .ok_or_else(|| not_found::<K>(raw_id))?;
        let (event_id, index) = position_of::<K>(&mut tx, raw_id).await?;

        let delete = format!("DELETE FROM {} WHERE id = ?", K::TABLE);
        sqlx::query(&delete).bind(raw_id).execute(&mut *tx).await?;

        let close_gap = format!(
            "UPDATE {} SET idx = idx - 1 WHERE event_id = ? AND idx > ?",
            K::TABLE
        );
        sqlx::query(&close_gap)
            .bind(event_id.0)
            .bind(index)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(kind = K::KIND, id = raw_id, %event_id, index, "removed item");
        Ok(item)
    }

    /// Replaces every item of the event with `drafts`, indexed in the given order.
    pub async fn replace_all(
        &self,
        event_id: EventId,
        drafts: &[K::Draft],
    ) -> StorageResult<Vec<K::Item>> {
        let mut tx = begin_write(&self.pool).await?;
        ensure_event(&mut tx, event_id).await?;

        let clear = format!("DELETE FROM {} WHERE event_id = ?", K::TABLE);
        sqlx::query(&clear)
            .bind(event_id.0)
            .execute(&mut *tx)
            .await?;

        let mut items = Vec::with_capacity(drafts.len());
        for (index, draft) in drafts.iter().enumerate() {
            items.push(K::insert(&mut tx, event_id, index as i64, draft).await?);
        }

        tx.commit().await?;
        debug!(kind = K::KIND, %event_id, count = items.len(), "replaced items");
        Ok(items)
    }
}

impl OrderedCollection<AwardKind> {
    /// Sets or clears the winner. The demo must belong to the award's event.
    pub async fn set_winner(
        &self,
        id: AwardId,
        winner: Option<DemoId>,
    ) -> StorageResult<Award> {
        let mut tx = begin_write(&self.pool).await?;
        let (event_id, _) = position_of::<AwardKind>(&mut tx, id.0).await?;

        if let Some(demo_id) = winner {
            let (demo_event, _) = position_of::<DemoKind>(&mut tx, demo_id.0).await?;
            if demo_event != event_id {
                return Err(not_found::<DemoKind>(demo_id.0));
            }
        }

        let row = sqlx::query(
            "UPDATE awards SET winner_id = ? WHERE id = ?
             RETURNING id, event_id, idx, name, description, votable, winner_id",
        )
        .bind(winner.map(|d| d.0))
        .bind(id.0)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(AwardKind::from_row(&row))
    }
}

pub(crate) fn not_found<K: OrderedKind>(id: i64) -> StorageError {
    StorageError::ItemNotFound { kind: K::KIND, id }
}

pub(crate) async fn position_of<K: OrderedKind>(
    conn: &mut SqliteConnection,
    id: i64,
) -> StorageResult<(EventId, i64)> {
    let sql = format!("SELECT event_id, idx FROM {} WHERE id = ?", K::TABLE);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found::<K>(id))?;
    Ok((EventId(row.get::<i64, _>(0)), row.get::<i64, _>(1)))
}

async fn fetch_item<K: OrderedKind>(
    conn: &mut SqliteConnection,
    id: i64,
) -> StorageResult<Option<K::Item>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", K::COLUMNS, K::TABLE);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(K::from_row))
}

async fn count_in_scope<K: OrderedKind>(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> StorageResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE event_id = ?", K::TABLE);
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(event_id.0)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Opens a write transaction that takes the database write lock up front, so
/// concurrent writers queue on the busy timeout instead of failing when a
/// deferred read lock cannot be upgraded.
pub(crate) async fn begin_write(
    pool: &Pool<Sqlite>,
) -> StorageResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

pub(crate) async fn ensure_event(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> StorageResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM events WHERE id = ?")
        .bind(event_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    exists
        .map(|_| ())
        .ok_or(StorageError::EventNotFound(event_id))
}

#[cfg(test)]
#[path = "tests/ordered_tests.rs"]
mod tests;
