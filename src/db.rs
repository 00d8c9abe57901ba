//! Database module for the gift exchange
//!
//! Provides persistence for participants and per-participant session state.

mod schema;

pub use schema::*;

use crate::session::throttle;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Participant not found: {0}")]
    ParticipantNotFound(ParticipantId),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Participant Operations ====================

    /// Insert a participant unless one with the same id exists.
    /// Returns `true` when a record was created.
    pub fn create_participant(&self, profile: &ParticipantProfile) -> DbResult<bool> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO participants (id, first_name, last_name, username, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                profile.id,
                profile.first_name,
                profile.last_name,
                profile.username,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn participant_exists(&self, id: ParticipantId) -> DbResult<bool> {
        let conn = self.conn();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM participants WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Get participant by id
    #[allow(dead_code)] // Used in tests
    pub fn get_participant(&self, id: ParticipantId) -> DbResult<Participant> {
        self.find_participant(id)?
            .ok_or(DbError::ParticipantNotFound(id))
    }

    pub fn find_participant(&self, id: ParticipantId) -> DbResult<Option<Participant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?1"
        ))?;
        stmt.query_row(params![id], parse_participant_row)
            .optional()
            .map_err(DbError::from)
    }

    /// All participants in registration order
    pub fn list_participants(&self) -> DbResult<Vec<Participant>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map([], parse_participant_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Apply a patch. Returns the number of matched records.
    pub fn update_participant(&self, id: ParticipantId, patch: &ParticipantPatch) -> DbResult<usize> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE participants SET
                wish_list = COALESCE(?1, wish_list),
                recipient_id = COALESCE(?2, recipient_id),
                santa_id = COALESCE(?3, santa_id)
             WHERE id = ?4",
            params![patch.wish_list, patch.recipient_id, patch.santa_id, id],
        )?;
        Ok(updated)
    }

    /// Set `santa_id` on the candidate only if it is still unset.
    /// Returns the number of matched records (0 when someone else got there first).
    pub fn claim_santa(&self, candidate_id: ParticipantId, santa_id: ParticipantId) -> DbResult<usize> {
        let conn = self.conn();
        let claimed = conn.execute(
            "UPDATE participants SET santa_id = ?1 WHERE id = ?2 AND santa_id IS NULL",
            params![santa_id, candidate_id],
        )?;
        Ok(claimed)
    }

    /// Claim the candidate and link the requester in one transaction.
    /// Returns `false` (and changes nothing) when the candidate was already claimed.
    pub fn commit_assignment(
        &self,
        requester_id: ParticipantId,
        candidate_id: ParticipantId,
    ) -> DbResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let claimed = tx.execute(
            "UPDATE participants SET santa_id = ?1 WHERE id = ?2 AND santa_id IS NULL",
            params![requester_id, candidate_id],
        )?;
        if claimed == 0 {
            return Ok(false);
        }

        let linked = tx.execute(
            "UPDATE participants SET recipient_id = ?1 WHERE id = ?2",
            params![candidate_id, requester_id],
        )?;
        if linked == 0 {
            // Dropping the transaction rolls the claim back
            return Err(DbError::ParticipantNotFound(requester_id));
        }

        tx.commit()?;
        Ok(true)
    }

    /// Remove every participant. Returns the number of deleted records.
    pub fn delete_all_participants(&self) -> DbResult<usize> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM participants", [])?;
        Ok(deleted)
    }

    /// Repair half-committed assignments: a candidate whose `santa_id` points
    /// at a giver without a matching `recipient_id`.
    ///
    /// If the giver exists and has no recipient yet the link is completed,
    /// otherwise the dangling `santa_id` is cleared.
    pub fn reconcile_pairs(&self) -> DbResult<ReconcileReport> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut report = ReconcileReport::default();

        let claimed: Vec<(ParticipantId, ParticipantId)> = {
            let mut stmt = tx.prepare(
                "SELECT id, santa_id FROM participants WHERE santa_id IS NOT NULL ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for (candidate_id, santa_id) in claimed {
            let giver_recipient: Option<Option<ParticipantId>> = tx
                .query_row(
                    "SELECT recipient_id FROM participants WHERE id = ?1",
                    params![santa_id],
                    |row| row.get(0),
                )
                .optional()?;

            match giver_recipient {
                Some(Some(recipient)) if recipient == candidate_id => {}
                Some(None) => {
                    tx.execute(
                        "UPDATE participants SET recipient_id = ?1 WHERE id = ?2",
                        params![candidate_id, santa_id],
                    )?;
                    report.completed += 1;
                }
                _ => {
                    tx.execute(
                        "UPDATE participants SET santa_id = NULL WHERE id = ?1",
                        params![candidate_id],
                    )?;
                    report.cleared += 1;
                }
            }
        }

        tx.commit()?;
        Ok(report)
    }

    // ==================== Session Operations ====================

    /// Session state for a participant; a missing row reads as the default state
    pub fn get_session(&self, participant_id: ParticipantId) -> DbResult<ConversationState> {
        let conn = self.conn();
        let state = conn
            .query_row(
                "SELECT pending_intent, last_throttled_at FROM sessions WHERE participant_id = ?1",
                params![participant_id],
                |row| {
                    let intent: String = row.get(0)?;
                    let throttled: Option<String> = row.get(1)?;
                    Ok(ConversationState {
                        pending_intent: PendingIntent::parse(&intent),
                        last_throttled_at: throttled.as_deref().and_then(parse_datetime),
                    })
                },
            )
            .optional()?;
        Ok(state.unwrap_or_default())
    }

    pub fn set_pending_intent(
        &self,
        participant_id: ParticipantId,
        intent: PendingIntent,
    ) -> DbResult<()> {
        let conn = self.conn();
        upsert_intent(&conn, participant_id, intent)?;
        Ok(())
    }

    /// Return the pending intent and reset it to idle in one step
    pub fn take_pending_intent(&self, participant_id: ParticipantId) -> DbResult<PendingIntent> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row(
                "SELECT pending_intent FROM sessions WHERE participant_id = ?1",
                params![participant_id],
                |row| row.get(0),
            )
            .optional()?;
        let intent = current.as_deref().map_or(PendingIntent::Idle, PendingIntent::parse);

        if intent != PendingIntent::Idle {
            upsert_intent(&tx, participant_id, PendingIntent::Idle)?;
        }

        tx.commit()?;
        Ok(intent)
    }

    /// Overwrite the throttle timestamp
    pub fn record_throttle(&self, participant_id: ParticipantId, now: DateTime<Utc>) -> DbResult<()> {
        let conn = self.conn();
        upsert_throttle(&conn, participant_id, now)?;
        Ok(())
    }

    /// Check the cooldown and, when the action is allowed, record `now`.
    /// Returns whether the action is allowed.
    pub fn try_record_throttle(
        &self,
        participant_id: ParticipantId,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> DbResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let last: Option<Option<String>> = tx
            .query_row(
                "SELECT last_throttled_at FROM sessions WHERE participant_id = ?1",
                params![participant_id],
                |row| row.get(0),
            )
            .optional()?;
        let last = last.flatten().as_deref().and_then(parse_datetime);

        let allowed = throttle::allows(last, now, cooldown);
        if allowed {
            upsert_throttle(&tx, participant_id, now)?;
        }

        tx.commit()?;
        Ok(allowed)
    }
}

fn upsert_intent(
    conn: &Connection,
    participant_id: ParticipantId,
    intent: PendingIntent,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO sessions (participant_id, pending_intent, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(participant_id) DO UPDATE SET
            pending_intent = excluded.pending_intent,
            updated_at = excluded.updated_at",
        params![participant_id, intent.as_str(), Utc::now().to_rfc3339()],
    )
}

fn upsert_throttle(
    conn: &Connection,
    participant_id: ParticipantId,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO sessions (participant_id, last_throttled_at, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(participant_id) DO UPDATE SET
            last_throttled_at = excluded.last_throttled_at,
            updated_at = excluded.updated_at",
        params![participant_id, now.to_rfc3339(), Utc::now().to_rfc3339()],
    )
}

/// Parse a participant row selected with `PARTICIPANT_COLUMNS`
fn parse_participant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        username: row.get(3)?,
        wish_list: row.get(4)?,
        recipient_id: row.get(5)?,
        santa_id: row.get(6)?,
        registered_at: parse_datetime(&row.get::<_, String>(7)?).unwrap_or_else(Utc::now),
    })
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
