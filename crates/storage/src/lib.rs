use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::info;
use uuid::Uuid;

use shared::domain::{AttendeeId, AwardId, DemoId, Event, EventId, Phase, Vote, VoteId};

mod error;
mod ordered;

pub use error::{StorageError, StorageResult};
pub use ordered::{AwardKind, DemoKind, OrderedCollection, OrderedKind};

use ordered::{begin_write, ensure_event, not_found, position_of};

const EVENT_COLUMNS: &str =
    "id, name, phase, current_demo_id, current_award_id, is_live, created_at";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const VOTE_COLUMNS: &str = "id, event_id, attendee_id, award_id, demo_id, updated_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        // Every pooled connection to `:memory:` would get its own empty database.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub fn demos(&self) -> OrderedCollection<DemoKind> {
        OrderedCollection::new(self.pool.clone())
    }

    pub fn awards(&self) -> OrderedCollection<AwardKind> {
        OrderedCollection::new(self.pool.clone())
    }

    pub async fn create_event(&self, name: &str) -> StorageResult<Event> {
        let sql = format!("INSERT INTO events (name) VALUES (?) RETURNING {EVENT_COLUMNS}");
        let row = sqlx::query(&sql).bind(name).fetch_one(&self.pool).await?;
        event_from_row(&row)
    }

    pub async fn get_event(&self, event_id: EventId) -> StorageResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(event_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    pub async fn require_event(&self, event_id: EventId) -> StorageResult<Event> {
        self.get_event(event_id)
            .await?
            .ok_or(StorageError::EventNotFound(event_id))
    }

    pub async fn list_events(&self) -> StorageResult<Vec<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(event_from_row).collect()
    }

    pub async fn rename_event(&self, event_id: EventId, name: &str) -> StorageResult<Event> {
        let sql = format!("UPDATE events SET name = ? WHERE id = ? RETURNING {EVENT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(event_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::EventNotFound(event_id))?;
        event_from_row(&row)
    }

    /// Deletes the event and, through cascades, its demos, awards and votes.
    pub async fn delete_event(&self, event_id: EventId) -> StorageResult<Event> {
        let sql = format!("DELETE FROM events WHERE id = ? RETURNING {EVENT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(event_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::EventNotFound(event_id))?;
        let event = event_from_row(&row)?;
        info!(%event_id, "deleted event");
        Ok(event)
    }

    pub async fn live_event(&self) -> StorageResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE is_live = 1");
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(event_from_row).transpose()
    }

    /// Marks the event live. Fails while a different event is live.
    pub async fn set_live(&self, event_id: EventId) -> StorageResult<Event> {
        let mut tx = begin_write(&self.pool).await?;
        let live: Option<i64> = sqlx::query_scalar("SELECT id FROM events WHERE is_live = 1")
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(other) = live.map(EventId).filter(|other| *other != event_id) {
            return Err(StorageError::AlreadyLive(other));
        }

        let sql = format!("UPDATE events SET is_live = 1 WHERE id = ? RETURNING {EVENT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(event_id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StorageError::EventNotFound(event_id))?;
        let event = event_from_row(&row)?;
        tx.commit().await?;
        Ok(event)
    }

    /// Unsets the live flag everywhere. Returns the events that were live.
    pub async fn clear_live(&self) -> StorageResult<Vec<EventId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("UPDATE events SET is_live = 0 WHERE is_live = 1 RETURNING id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(EventId).collect())
    }

    pub async fn set_phase(&self, event_id: EventId, phase: Phase) -> StorageResult<Event> {
        let sql = format!("UPDATE events SET phase = ? WHERE id = ? RETURNING {EVENT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(phase.as_str())
            .bind(event_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::EventNotFound(event_id))?;
        event_from_row(&row)
    }

    /// Points the event at one of its own demos, or at nothing.
    pub async fn set_current_demo(
        &self,
        event_id: EventId,
        demo_id: Option<DemoId>,
    ) -> StorageResult<Event> {
        let mut tx = begin_write(&self.pool).await?;
        ensure_event(&mut tx, event_id).await?;
        if let Some(demo_id) = demo_id {
            let (owner, _) = position_of::<DemoKind>(&mut tx, demo_id.0).await?;
            if owner != event_id {
                return Err(not_found::<DemoKind>(demo_id.0));
            }
        }

        let sql = format!(
            "UPDATE events SET current_demo_id = ? WHERE id = ? RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(demo_id.map(|d| d.0))
            .bind(event_id.0)
            .fetch_one(&mut *tx)
            .await?;
        let event = event_from_row(&row)?;
        tx.commit().await?;
        Ok(event)
    }

    /// Points the event at one of its own awards, or at nothing.
    pub async fn set_current_award(
        &self,
        event_id: EventId,
        award_id: Option<AwardId>,
    ) -> StorageResult<Event> {
        let mut tx = begin_write(&self.pool).await?;
        ensure_event(&mut tx, event_id).await?;
        if let Some(award_id) = award_id {
            let (owner, _) = position_of::<AwardKind>(&mut tx, award_id.0).await?;
            if owner != event_id {
                return Err(not_found::<AwardKind>(award_id.0));
            }
        }

        let sql = format!(
            "UPDATE events SET current_award_id = ? WHERE id = ? RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(award_id.map(|a| a.0))
            .bind(event_id.0)
            .fetch_one(&mut *tx)
            .await?;
        let event = event_from_row(&row)?;
        tx.commit().await?;
        Ok(event)
    }

    /// Moves the revealed-award pointer only if it still equals `expected`.
    /// Returns `None` when another writer moved it first.
    pub async fn swap_current_award(
        &self,
        event_id: EventId,
        expected: Option<AwardId>,
        next: Option<AwardId>,
    ) -> StorageResult<Option<Event>> {
        let sql = format!(
            "UPDATE events SET current_award_id = ?
             WHERE id = ? AND current_award_id IS ?
             RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(next.map(|a| a.0))
            .bind(event_id.0)
            .bind(expected.map(|a| a.0))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    /// Records the attendee's choice for an award, replacing any earlier one.
    /// `demo_id = None` retracts the vote but keeps the row.
    pub async fn upsert_vote(
        &self,
        event_id: EventId,
        attendee_id: AttendeeId,
        award_id: AwardId,
        demo_id: Option<DemoId>,
    ) -> StorageResult<Vote> {
        let sql = format!(
            "INSERT INTO votes (event_id, attendee_id, award_id, demo_id, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(attendee_id, award_id)
             DO UPDATE SET demo_id = excluded.demo_id, updated_at = excluded.updated_at
             RETURNING {VOTE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(event_id.0)
            .bind(attendee_id.0.to_string())
            .bind(award_id.0)
            .bind(demo_id.map(|d| d.0))
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        vote_from_row(&row)
    }

    pub async fn votes_for_award(&self, award_id: AwardId) -> StorageResult<Vec<Vote>> {
        let sql = format!("SELECT {VOTE_COLUMNS} FROM votes WHERE award_id = ? ORDER BY id ASC");
        let rows = sqlx::query(&sql)
            .bind(award_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(vote_from_row).collect()
    }

    pub async fn votes_by_attendee(
        &self,
        event_id: EventId,
        attendee_id: AttendeeId,
    ) -> StorageResult<Vec<Vote>> {
        let sql = format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE event_id = ? AND attendee_id = ? ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(event_id.0)
            .bind(attendee_id.0.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(vote_from_row).collect()
    }
}

fn event_from_row(row: &SqliteRow) -> StorageResult<Event> {
    let phase = row.get::<String, _>("phase");
    let phase = phase
        .parse::<Phase>()
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
    Ok(Event {
        id: EventId(row.get::<i64, _>("id")),
        name: row.get::<String, _>("name"),
        phase,
        current_demo_id: row.get::<Option<i64>, _>("current_demo_id").map(DemoId),
        current_award_id: row.get::<Option<i64>, _>("current_award_id").map(AwardId),
        is_live: row.get::<bool, _>("is_live"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn vote_from_row(row: &SqliteRow) -> StorageResult<Vote> {
    let attendee = row.get::<String, _>("attendee_id");
    let attendee = Uuid::parse_str(&attendee)
        .map_err(|e| StorageError::Corrupt(format!("attendee id '{attendee}': {e}")))?;
    Ok(Vote {
        id: VoteId(row.get::<i64, _>("id")),
        event_id: EventId(row.get::<i64, _>("event_id")),
        attendee_id: AttendeeId(attendee),
        award_id: AwardId(row.get::<i64, _>("award_id")),
        demo_id: row.get::<Option<i64>, _>("demo_id").map(DemoId),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
