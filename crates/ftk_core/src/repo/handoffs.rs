//! Handoff ledger rows (`handoff_records`).
//!
//! Ledger order is `created_at ASC, id ASC`; `created_at` is fixed-width UTC so the
//! lexical order matches time order.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::domain::{HandoffKind, HandoffRecord};
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct NewHandoff {
    pub incident_id: i64,
    pub department_id: Option<i64>,
    pub novelty_note: Option<String>,
    pub opening_verifier_id: Option<i64>,
    pub closing_verifier_id: Option<i64>,
    pub last_editor_id: Option<i64>,
    pub closing_responsible_id: Option<i64>,
    pub supervising_user_id: Option<i64>,
    pub created_at: String,
}

/// Ledger row with user and department references resolved to display names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandoffEntryView {
    pub id: i64,
    pub kind: HandoffKind,
    pub created_at: String,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub novelty_note: Option<String>,
    pub opening_verifier: Option<String>,
    pub closing_verifier: Option<String>,
    pub closing_responsible: Option<String>,
    pub last_editor: Option<String>,
    pub supervising_user: Option<String>,
}

/// Most recent ledger row, as surfaced on the incident view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntrySummary {
    pub handoff_id: i64,
    pub kind: HandoffKind,
    pub novelty_note: Option<String>,
    pub editor: Option<String>,
    pub created_at: String,
}

pub fn insert_handoff(conn: &Connection, kind: HandoffKind, new: &NewHandoff) -> Result<i64, AppError> {
    conn.execute(
        r#"
      INSERT INTO handoff_records(
        incident_id, kind, department_id, novelty_note,
        opening_verifier_id, closing_verifier_id, last_editor_id,
        closing_responsible_id, supervising_user_id, created_at
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
      "#,
        params![
            new.incident_id,
            kind.as_str(),
            new.department_id,
            new.novelty_note,
            new.opening_verifier_id,
            new.closing_verifier_id,
            new.last_editor_id,
            new.closing_responsible_id,
            new.supervising_user_id,
            new.created_at,
        ],
    )
    .map_err(|e| AppError::store("DB_WRITE_FAILED", "Failed to append handoff record").with_sqlite(&e))?;
    Ok(conn.last_insert_rowid())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(HandoffRecord, String)> {
    let kind: String = row.get(2)?;
    Ok((
        HandoffRecord {
            id: row.get(0)?,
            incident_id: row.get(1)?,
            kind: HandoffKind::Note,
            department_id: row.get(3)?,
            novelty_note: row.get(4)?,
            opening_verifier_id: row.get(5)?,
            closing_verifier_id: row.get(6)?,
            last_editor_id: row.get(7)?,
            closing_responsible_id: row.get(8)?,
            supervising_user_id: row.get(9)?,
            created_at: row.get(10)?,
        },
        kind,
    ))
}

/// Full ledger for one incident in ledger order.
pub fn list_handoffs(conn: &Connection, incident_id: i64) -> Result<Vec<HandoffRecord>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT
        id, incident_id, kind, department_id, novelty_note,
        opening_verifier_id, closing_verifier_id, last_editor_id,
        closing_responsible_id, supervising_user_id, created_at
      FROM handoff_records
      WHERE incident_id = ?1
      ORDER BY created_at ASC, id ASC
      "#,
        )
        .map_err(|e| {
            AppError::store("DB_QUERY_FAILED", "Failed to prepare handoff ledger query").with_sqlite(&e)
        })?;

    let rows = stmt
        .query_map([incident_id], record_from_row)
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to query handoff ledger").with_sqlite(&e))?;

    rows.into_iter()
        .map(|(mut record, kind)| {
            record.kind = HandoffKind::parse(&kind)?;
            Ok(record)
        })
        .collect()
}

pub fn count_handoffs(conn: &Connection, incident_id: i64) -> Result<i64, AppError> {
    conn.query_row(
        "SELECT COUNT(*) FROM handoff_records WHERE incident_id = ?1",
        [incident_id],
        |row| row.get(0),
    )
    .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to count handoff records").with_sqlite(&e))
}

/// Department carried by the most recent department-bearing row, if any.
pub fn last_department(conn: &Connection, incident_id: i64) -> Result<Option<i64>, AppError> {
    conn.query_row(
        r#"
      SELECT department_id FROM handoff_records
      WHERE incident_id = ?1 AND department_id IS NOT NULL
      ORDER BY created_at DESC, id DESC
      LIMIT 1
      "#,
        [incident_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| {
        AppError::store("DB_QUERY_FAILED", "Failed to read last ledger department").with_sqlite(&e)
    })
}

pub fn latest_handoff_id(conn: &Connection, incident_id: i64) -> Result<Option<i64>, AppError> {
    conn.query_row(
        r#"
      SELECT id FROM handoff_records
      WHERE incident_id = ?1
      ORDER BY created_at DESC, id DESC
      LIMIT 1
      "#,
        [incident_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to read latest ledger row").with_sqlite(&e))
}

/// Attach a novelty note and edit provenance to an existing row; absent values keep what
/// the row already holds.
pub fn annotate_handoff(
    conn: &Connection,
    handoff_id: i64,
    novelty_note: Option<&str>,
    last_editor_id: Option<i64>,
    supervising_user_id: Option<i64>,
) -> Result<usize, AppError> {
    conn.execute(
        r#"
      UPDATE handoff_records
         SET novelty_note = COALESCE(?1, novelty_note),
             last_editor_id = COALESCE(?2, last_editor_id),
             supervising_user_id = COALESCE(?3, supervising_user_id)
       WHERE id = ?4
      "#,
        params![novelty_note, last_editor_id, supervising_user_id, handoff_id],
    )
    .map_err(|e| AppError::store("DB_WRITE_FAILED", "Failed to annotate handoff record").with_sqlite(&e))
}

pub fn delete_handoffs(conn: &Connection, incident_id: i64) -> Result<usize, AppError> {
    conn.execute("DELETE FROM handoff_records WHERE incident_id = ?1", [incident_id])
        .map_err(|e| AppError::store("DB_WRITE_FAILED", "Failed to delete handoff records").with_sqlite(&e))
}

const USER_NAME: &str = "COALESCE(u.display_name, u.username)";

fn user_name_sql(alias: &str, column: &str) -> String {
    format!(
        "(SELECT {} FROM users u WHERE u.id = h.{column}) AS {alias}",
        USER_NAME
    )
}

pub fn list_handoff_entries(conn: &Connection, incident_id: i64) -> Result<Vec<HandoffEntryView>, AppError> {
    let sql = format!(
        r#"
      SELECT
        h.id, h.kind, h.created_at, h.department_id, d.name, h.novelty_note,
        {}, {}, {}, {}, {}
      FROM handoff_records h
      LEFT JOIN departments d ON d.id = h.department_id
      WHERE h.incident_id = ?1
      ORDER BY h.created_at ASC, h.id ASC
      "#,
        user_name_sql("opening_verifier", "opening_verifier_id"),
        user_name_sql("closing_verifier", "closing_verifier_id"),
        user_name_sql("closing_responsible", "closing_responsible_id"),
        user_name_sql("last_editor", "last_editor_id"),
        user_name_sql("supervising_user", "supervising_user_id"),
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| {
        AppError::store("DB_QUERY_FAILED", "Failed to prepare ledger entries query").with_sqlite(&e)
    })?;
    let rows = stmt
        .query_map([incident_id], |row| {
            let kind: String = row.get(1)?;
            Ok((
                kind,
                HandoffEntryView {
                    id: row.get(0)?,
                    kind: HandoffKind::Note,
                    created_at: row.get(2)?,
                    department_id: row.get(3)?,
                    department_name: row.get(4)?,
                    novelty_note: row.get(5)?,
                    opening_verifier: row.get(6)?,
                    closing_verifier: row.get(7)?,
                    closing_responsible: row.get(8)?,
                    last_editor: row.get(9)?,
                    supervising_user: row.get(10)?,
                },
            ))
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to query ledger entries").with_sqlite(&e))?;

    rows.into_iter()
        .map(|(kind, mut entry)| {
            entry.kind = HandoffKind::parse(&kind)?;
            Ok(entry)
        })
        .collect()
}

pub fn latest_entry_summary(
    conn: &Connection,
    incident_id: i64,
) -> Result<Option<LedgerEntrySummary>, AppError> {
    let sql = format!(
        r#"
      SELECT h.id, h.kind, h.novelty_note, {}, h.created_at
      FROM handoff_records h
      WHERE h.incident_id = ?1
      ORDER BY h.created_at DESC, h.id DESC
      LIMIT 1
      "#,
        user_name_sql("editor", "last_editor_id"),
    );
    let row = conn
        .query_row(&sql, [incident_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .optional()
        .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to read latest ledger entry").with_sqlite(&e))?;

    row.map(|(handoff_id, kind, novelty_note, editor, created_at)| {
        Ok(LedgerEntrySummary {
            handoff_id,
            kind: HandoffKind::parse(&kind)?,
            novelty_note,
            editor,
            created_at,
        })
    })
    .transpose()
}

/// Display name of the most recent actor recorded in `column` (a `*_verifier_id` column).
pub(crate) fn latest_verifier_name(
    conn: &Connection,
    incident_id: i64,
    column: &str,
) -> Result<Option<String>, AppError> {
    let sql = format!(
        r#"
      SELECT {USER_NAME}
      FROM handoff_records h
      JOIN users u ON u.id = h.{column}
      WHERE h.incident_id = ?1
      ORDER BY h.created_at DESC, h.id DESC
      LIMIT 1
      "#
    );
    conn.query_row(&sql, [incident_id], |row| row.get(0))
        .optional()
        .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to read verifier name").with_sqlite(&e))
}
