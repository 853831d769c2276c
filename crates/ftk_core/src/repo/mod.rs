use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Affectation, AffectationColumns, Incident};
use crate::error::AppError;

pub mod handoffs;
pub mod views;

/// Incident columns in decode order; queries alias `incidents` as `i`.
pub(crate) const INCIDENT_COLUMNS: &str = r#"
        i.id, i.opened_date, i.opened_time, i.equipment_affected, i.description,
        i.affectation_kind, i.affectation_detail,
        i.camera_id, i.encoder_id, i.ip_speaker_id, i.alarm_input_id, i.node_id,
        i.responsible_user_id, i.department_id, i.problem_type_id, i.console_id, i.site_id,
        i.resolved_date, i.resolved_time, i.created_at, i.updated_at"#;

pub(crate) const INCIDENT_COLUMN_COUNT: usize = 21;

/// Undecoded incident row; affectation columns are validated in [`IncidentRow::into_incident`].
pub(crate) struct IncidentRow {
    incident: Incident,
    affectation: AffectationColumns,
}

impl IncidentRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(IncidentRow {
            affectation: AffectationColumns {
                kind: row.get(5)?,
                detail: row.get(6)?,
                camera_id: row.get(7)?,
                encoder_id: row.get(8)?,
                ip_speaker_id: row.get(9)?,
                alarm_input_id: row.get(10)?,
                node_id: row.get(11)?,
            },
            incident: Incident {
                id: row.get(0)?,
                opened_date: row.get(1)?,
                opened_time: row.get(2)?,
                equipment_affected: row.get(3)?,
                description: row.get(4)?,
                affectation: Affectation::Equipment { device: None },
                responsible_user_id: row.get(12)?,
                department_id: row.get(13)?,
                problem_type_id: row.get(14)?,
                console_id: row.get(15)?,
                site_id: row.get(16)?,
                resolved_date: row.get(17)?,
                resolved_time: row.get(18)?,
                created_at: row.get(19)?,
                updated_at: row.get(20)?,
            },
        })
    }

    pub(crate) fn into_incident(self) -> Result<Incident, AppError> {
        let mut incident = self.incident;
        incident.affectation = Affectation::from_columns(self.affectation)
            .map_err(|e| e.with_details(format!("incident_id={}", incident.id)))?;
        Ok(incident)
    }
}

/// Values for a fresh `incidents` row. `resolved_*` always start empty.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub opened_date: String,
    pub opened_time: Option<String>,
    pub equipment_affected: String,
    pub description: String,
    pub affectation: AffectationColumns,
    pub responsible_user_id: i64,
    pub department_id: Option<i64>,
    pub problem_type_id: Option<i64>,
    pub console_id: Option<i64>,
    pub site_id: Option<i64>,
    pub created_at: String,
}

pub fn insert_incident(conn: &Connection, new: &NewIncident) -> Result<i64, AppError> {
    conn.execute(
        r#"
      INSERT INTO incidents(
        opened_date, opened_time, equipment_affected, description,
        affectation_kind, affectation_detail,
        camera_id, encoder_id, ip_speaker_id, alarm_input_id, node_id,
        responsible_user_id, department_id, problem_type_id, console_id, site_id,
        resolved_date, resolved_time, created_at, updated_at
      ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
        NULL, NULL, ?17, ?17
      )
      "#,
        params![
            new.opened_date,
            new.opened_time,
            new.equipment_affected,
            new.description,
            new.affectation.kind,
            new.affectation.detail,
            new.affectation.camera_id,
            new.affectation.encoder_id,
            new.affectation.ip_speaker_id,
            new.affectation.alarm_input_id,
            new.affectation.node_id,
            new.responsible_user_id,
            new.department_id,
            new.problem_type_id,
            new.console_id,
            new.site_id,
            new.created_at,
        ],
    )
    .map_err(|e| AppError::store("DB_WRITE_FAILED", "Failed to insert incident").with_sqlite(&e))?;
    Ok(conn.last_insert_rowid())
}

pub fn incident_not_found(id: i64) -> AppError {
    AppError::not_found("INCIDENT_NOT_FOUND", "Incident not found").with_details(format!("incident_id={id}"))
}

pub fn get_incident(conn: &Connection, id: i64) -> Result<Incident, AppError> {
    let sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents i WHERE i.id = ?1");
    let row = conn
        .query_row(&sql, [id], IncidentRow::from_row)
        .optional()
        .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to query incident").with_sqlite(&e))?;
    row.ok_or_else(|| incident_not_found(id))?.into_incident()
}

pub fn incident_exists(conn: &Connection, id: i64) -> Result<bool, AppError> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM incidents WHERE id = ?1", [id], |row| row.get(0))
        .optional()
        .map_err(|e| {
            AppError::store("DB_QUERY_FAILED", "Failed to check incident existence").with_sqlite(&e)
        })?;
    Ok(hit.is_some())
}

pub fn count_incidents(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
        .map_err(|e| AppError::store("DB_QUERY_FAILED", "Failed to count incidents").with_sqlite(&e))
}

/// Compare-and-swap department change. Returns the affected row count; zero means the
/// incident is missing or already closed.
pub fn assign_department_if_open(
    conn: &Connection,
    id: i64,
    department_id: Option<i64>,
    updated_at: &str,
) -> Result<usize, AppError> {
    conn.execute(
        r#"
      UPDATE incidents
         SET department_id = ?1, updated_at = ?2
       WHERE id = ?3 AND resolved_date IS NULL
      "#,
        params![department_id, updated_at, id],
    )
    .map_err(|e| {
        AppError::store("DB_WRITE_FAILED", "Failed to update incident department").with_sqlite(&e)
    })
}

/// Compare-and-swap close. Returns the affected row count; zero means the incident is
/// missing or already closed.
pub fn resolve_if_open(
    conn: &Connection,
    id: i64,
    resolved_date: &str,
    resolved_time: Option<&str>,
    department_id: i64,
    updated_at: &str,
) -> Result<usize, AppError> {
    conn.execute(
        r#"
      UPDATE incidents
         SET resolved_date = ?1, resolved_time = ?2, department_id = ?3, updated_at = ?4
       WHERE id = ?5 AND resolved_date IS NULL
      "#,
        params![resolved_date, resolved_time, department_id, updated_at, id],
    )
    .map_err(|e| AppError::store("DB_WRITE_FAILED", "Failed to close incident").with_sqlite(&e))
}

pub fn delete_incident(conn: &Connection, id: i64) -> Result<usize, AppError> {
    conn.execute("DELETE FROM incidents WHERE id = ?1", [id])
        .map_err(|e| AppError::store("DB_WRITE_FAILED", "Failed to delete incident").with_sqlite(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog, db};

    #[test]
    fn guarded_updates_stop_matching_once_resolved() {
        let mut conn = db::open_in_memory().unwrap();
        db::migrate(&mut conn).unwrap();
        let user = catalog::insert_user(&conn, "jdoe", None, true).unwrap();
        let noc = catalog::insert_department(&conn, "NOC").unwrap();
        let id = insert_incident(
            &conn,
            &NewIncident {
                opened_date: "2024-03-01".into(),
                opened_time: None,
                equipment_affected: "Camera-12".into(),
                description: "No signal".into(),
                affectation: Affectation::Node { node_id: None }.to_columns(),
                responsible_user_id: user,
                department_id: None,
                problem_type_id: None,
                console_id: None,
                site_id: None,
                created_at: "2024-03-01T00:00:00.000000Z".into(),
            },
        )
        .unwrap();

        let ts = "2024-03-02T00:00:00.000000Z";
        assert_eq!(assign_department_if_open(&conn, id, Some(noc), ts).unwrap(), 1);
        assert_eq!(resolve_if_open(&conn, id, "2024-03-02", Some("10:00:00"), noc, ts).unwrap(), 1);
        assert_eq!(resolve_if_open(&conn, id, "2024-03-03", None, noc, ts).unwrap(), 0);
        assert_eq!(assign_department_if_open(&conn, id, None, ts).unwrap(), 0);
        assert_eq!(assign_department_if_open(&conn, id + 1, None, ts).unwrap(), 0);

        let incident = get_incident(&conn, id).unwrap();
        assert_eq!(incident.resolved_date.as_deref(), Some("2024-03-02"));
        assert_eq!(incident.department_id, Some(noc));
        assert!(incident_exists(&conn, id).unwrap());
        assert!(!incident_exists(&conn, id + 1).unwrap());
    }
}
