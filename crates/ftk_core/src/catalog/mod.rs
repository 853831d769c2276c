//! Read-only reference data owned by other parts of the operations backend.
//!
//! The incident ledger only reads these tables. The insert helpers exist for seeding
//! demo workspaces and tests.

use std::collections::HashMap;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalogs {
    pub departments: Vec<CatalogEntry>,
    pub problem_types: Vec<CatalogEntry>,
    pub responsible_users: Vec<CatalogEntry>,
}

fn insert(conn: &Connection, what: &str, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<i64, AppError> {
    conn.execute(sql, params).map_err(|e| {
        AppError::store("DB_WRITE_FAILED", format!("Failed to insert {what}")).with_sqlite(&e)
    })?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_user(
    conn: &Connection,
    username: &str,
    display_name: Option<&str>,
    active: bool,
) -> Result<i64, AppError> {
    insert(
        conn,
        "user",
        "INSERT INTO users(username, display_name, active) VALUES (?1, ?2, ?3)",
        params![username, display_name, active],
    )
}

pub fn insert_department(conn: &Connection, name: &str) -> Result<i64, AppError> {
    insert(conn, "department", "INSERT INTO departments(name) VALUES (?1)", params![name])
}

pub fn insert_problem_type(conn: &Connection, description: &str) -> Result<i64, AppError> {
    insert(
        conn,
        "problem type",
        "INSERT INTO problem_types(description) VALUES (?1)",
        params![description],
    )
}

pub fn insert_console(conn: &Connection, name: &str) -> Result<i64, AppError> {
    insert(conn, "console", "INSERT INTO consoles(name) VALUES (?1)", params![name])
}

pub fn insert_client(conn: &Connection, name: &str) -> Result<i64, AppError> {
    insert(conn, "client", "INSERT INTO clients(name) VALUES (?1)", params![name])
}

pub fn insert_site(
    conn: &Connection,
    name: &str,
    client_id: Option<i64>,
    estate_ref: Option<&str>,
) -> Result<i64, AppError> {
    insert(
        conn,
        "site",
        "INSERT INTO sites(name, client_id, estate_ref) VALUES (?1, ?2, ?3)",
        params![name, client_id, estate_ref],
    )
}

pub fn insert_node(conn: &Connection, name: &str, site_id: Option<i64>) -> Result<i64, AppError> {
    insert(
        conn,
        "node",
        "INSERT INTO nodes(name, site_id) VALUES (?1, ?2)",
        params![name, site_id],
    )
}

fn list_entries(conn: &Connection, what: &str, sql: &str) -> Result<Vec<CatalogEntry>, AppError> {
    let mut stmt = conn.prepare(sql).map_err(|e| {
        AppError::store("DB_QUERY_FAILED", format!("Failed to prepare {what} query")).with_sqlite(&e)
    })?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CatalogEntry {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| {
            AppError::store("DB_QUERY_FAILED", format!("Failed to query {what}")).with_sqlite(&e)
        })?;
    Ok(rows)
}

/// Lookup lists a client needs to fill in an incident form.
pub fn list_catalogs(conn: &Connection) -> Result<Catalogs, AppError> {
    Ok(Catalogs {
        departments: list_entries(
            conn,
            "departments",
            "SELECT id, name FROM departments ORDER BY name ASC, id ASC",
        )?,
        problem_types: list_entries(
            conn,
            "problem types",
            "SELECT id, description FROM problem_types ORDER BY description ASC, id ASC",
        )?,
        responsible_users: list_entries(
            conn,
            "active users",
            r#"
      SELECT id, COALESCE(display_name, username) AS name
      FROM users
      WHERE active = 1
      ORDER BY name ASC, id ASC
      "#,
        )?,
    })
}

pub fn department_names(conn: &Connection) -> Result<HashMap<i64, String>, AppError> {
    Ok(list_entries(conn, "departments", "SELECT id, name FROM departments")?
        .into_iter()
        .map(|entry| (entry.id, entry.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn catalogs_list_active_users_by_display_name() {
        let mut conn = db::open_in_memory().unwrap();
        db::migrate(&mut conn).unwrap();
        insert_user(&conn, "zoe", Some("Ana Zambrano"), true).unwrap();
        insert_user(&conn, "bob", None, true).unwrap();
        insert_user(&conn, "gone", Some("Aaron Retired"), false).unwrap();
        insert_department(&conn, "NOC").unwrap();

        let catalogs = list_catalogs(&conn).unwrap();
        let names: Vec<_> = catalogs.responsible_users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Ana Zambrano", "bob"]);
        assert_eq!(catalogs.departments.len(), 1);
        assert!(catalogs.problem_types.is_empty());
    }
}
