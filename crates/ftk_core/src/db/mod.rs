use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::AppError;

const MIGRATION_0001: (&str, &str) = (
    "0001_reference_catalogs.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0001_reference_catalogs.sql"
    )),
);

const MIGRATION_0002: (&str, &str) = (
    "0002_incidents_and_handoffs.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0002_incidents_and_handoffs.sql"
    )),
);

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

fn migrations() -> Vec<(&'static str, &'static str)> {
    vec![MIGRATION_0001, MIGRATION_0002]
}

fn configure(conn: &Connection) -> Result<(), AppError> {
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT).map_err(|e| {
        AppError::store("DB_OPEN_FAILED", "Failed to set busy timeout").with_sqlite(&e)
    })?;
    conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(|e| {
        AppError::store("DB_OPEN_FAILED", "Failed to enable foreign keys").with_sqlite(&e)
    })
}

pub fn open(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path).map_err(|e| {
        AppError::store("DB_OPEN_FAILED", "Failed to open SQLite database").with_sqlite(&e)
    })?;
    configure(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    let conn = Connection::open_in_memory().map_err(|e| {
        AppError::store("DB_OPEN_FAILED", "Failed to open in-memory SQLite database")
            .with_sqlite(&e)
    })?;
    configure(&conn)?;
    Ok(conn)
}

pub fn set_busy_timeout(conn: &Connection, timeout: Duration) -> Result<(), AppError> {
    conn.busy_timeout(timeout).map_err(|e| {
        AppError::store("DB_CONFIG_FAILED", "Failed to set busy timeout").with_sqlite(&e)
    })
}

fn applied_migrations(conn: &Connection) -> Result<HashSet<String>, AppError> {
    let mut stmt = conn.prepare("SELECT name FROM _migrations").map_err(|e| {
        AppError::store("DB_MIGRATIONS_QUERY_FAILED", "Failed to query applied migrations")
            .with_sqlite(&e)
    })?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<Result<HashSet<_>, _>>())
        .map_err(|e| {
            AppError::store("DB_MIGRATIONS_QUERY_FAILED", "Failed to read applied migrations")
                .with_sqlite(&e)
        })?;
    Ok(names)
}

/// Apply every embedded migration not yet recorded in `_migrations`, each in its own
/// transaction, in file order.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    conn.execute_batch(
        r#"
      CREATE TABLE IF NOT EXISTS _migrations (
        name TEXT PRIMARY KEY NOT NULL,
        applied_at TEXT NOT NULL
      );
    "#,
    )
    .map_err(|e| {
        AppError::store("DB_MIGRATIONS_TABLE_FAILED", "Failed to ensure migrations table exists")
            .with_sqlite(&e)
    })?;

    let applied = applied_migrations(conn)?;

    for (name, sql) in migrations() {
        if applied.contains(name) {
            continue;
        }
        tracing::debug!(migration = name, "applying migration");

        let tx = conn.transaction().map_err(|e| {
            AppError::store("DB_TX_FAILED", "Failed to start migration transaction").with_sqlite(&e)
        })?;
        tx.execute_batch(sql).map_err(|e| {
            AppError::store("DB_MIGRATION_FAILED", format!("Migration {name} failed")).with_sqlite(&e)
        })?;
        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [name],
        )
        .map_err(|e| {
            AppError::store("DB_MIGRATION_FAILED", format!("Failed to record migration {name}"))
                .with_sqlite(&e)
        })?;
        tx.commit().map_err(|e| {
            AppError::store("DB_TX_FAILED", "Failed to commit migration transaction").with_sqlite(&e)
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::OptionalExtension;

    #[test]
    fn migrations_create_expected_tables() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");
        migrate(&mut conn).expect("second migrate is a no-op");

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name = ?1")
            .unwrap();
        for table in ["incidents", "handoff_records", "users", "departments", "sites"] {
            let name: Option<String> = stmt.query_row([table], |row| row.get(0)).optional().unwrap();
            assert_eq!(name.as_deref(), Some(table));
        }
    }
}
