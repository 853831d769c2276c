use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::Incident;
use crate::error::AppError;
use crate::repo::handoffs::{latest_entry_summary, latest_verifier_name, LedgerEntrySummary};
use crate::repo::{incident_not_found, IncidentRow, INCIDENT_COLUMNS, INCIDENT_COLUMN_COUNT};
use crate::status::{status_of, IncidentStatus};

/// Incident joined with the display names it references and the latest ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentView {
    pub incident: Incident,
    pub status: IncidentStatus,
    pub status_text: String,
    pub department_name: Option<String>,
    pub responsible_name: Option<String>,
    pub problem_type_description: Option<String>,
    pub console_name: Option<String>,
    pub site_name: Option<String>,
    pub opening_verifier: Option<String>,
    pub closing_verifier: Option<String>,
    pub last_entry: Option<LedgerEntrySummary>,
}

struct JoinedNames {
    department: Option<String>,
    responsible: Option<String>,
    problem_type: Option<String>,
    console: Option<String>,
    site: Option<String>,
}

fn joined_sql(filter: &str) -> String {
    format!(
        r#"
      SELECT {INCIDENT_COLUMNS},
        d.name, COALESCE(u.display_name, u.username), pt.description, c.name, s.name
      FROM incidents i
      LEFT JOIN departments d ON d.id = i.department_id
      LEFT JOIN users u ON u.id = i.responsible_user_id
      LEFT JOIN problem_types pt ON pt.id = i.problem_type_id
      LEFT JOIN consoles c ON c.id = i.console_id
      LEFT JOIN sites s ON s.id = i.site_id
      {filter}
      "#
    )
}

fn joined_from_row(row: &Row<'_>) -> rusqlite::Result<(IncidentRow, JoinedNames)> {
    let base = INCIDENT_COLUMN_COUNT;
    Ok((
        IncidentRow::from_row(row)?,
        JoinedNames {
            department: row.get(base)?,
            responsible: row.get(base + 1)?,
            problem_type: row.get(base + 2)?,
            console: row.get(base + 3)?,
            site: row.get(base + 4)?,
        },
    ))
}

fn assemble(
    conn: &Connection,
    row: IncidentRow,
    names: JoinedNames,
    now: OffsetDateTime,
) -> Result<IncidentView, AppError> {
    let incident = row.into_incident()?;
    let status = status_of(&incident, now)?;
    let opening_verifier = latest_verifier_name(conn, incident.id, "opening_verifier_id")?;
    let closing_verifier = latest_verifier_name(conn, incident.id, "closing_verifier_id")?;
    let last_entry = latest_entry_summary(conn, incident.id)?;

    Ok(IncidentView {
        status,
        status_text: status.display_text(),
        department_name: names.department,
        responsible_name: names.responsible,
        problem_type_description: names.problem_type,
        console_name: names.console,
        site_name: names.site,
        opening_verifier,
        closing_verifier,
        last_entry,
        incident,
    })
}

pub fn get_incident_view(conn: &Connection, id: i64, now: OffsetDateTime) -> Result<IncidentView, AppError> {
    let row = conn
        .query_row(&joined_sql("WHERE i.id = ?1"), [id], joined_from_row)
        .optional()
        .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to query incident view").with_sqlite(&e))?;
    let (row, names) = row.ok_or_else(|| incident_not_found(id))?;
    assemble(conn, row, names, now)
}

/// All incidents, newest occurrence first.
pub fn list_incident_views(conn: &Connection, now: OffsetDateTime) -> Result<Vec<IncidentView>, AppError> {
    let sql = joined_sql(
        "ORDER BY i.opened_date DESC, COALESCE(i.opened_time, '') DESC, i.id DESC",
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| {
        AppError::store("DB_QUERY_FAILED", "Failed to prepare incident views query").with_sqlite(&e)
    })?;
    let rows = stmt
        .query_map([], joined_from_row)
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to query incident views").with_sqlite(&e))?;

    rows.into_iter()
        .map(|(row, names)| assemble(conn, row, names, now))
        .collect()
}
