use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;
use crate::repo::count_incidents;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct WorkspaceMetadata {
    pub db_path: String,
    pub is_empty: bool,
}

fn invalid_path(message: &str, path: &Path) -> AppError {
    AppError::validation("WORKSPACE_INVALID_PATH", message)
        .with_field("db_path")
        .with_details(path.display().to_string())
}

fn validate_db_path(path: &Path) -> Result<(), AppError> {
    if path.as_os_str().is_empty() {
        return Err(invalid_path("Workspace DB path is empty", path));
    }
    if path.is_dir() {
        return Err(invalid_path("Workspace DB path must be a file (not a directory)", path));
    }
    Ok(())
}

fn is_empty_conn(conn: &Connection) -> Result<bool, AppError> {
    let handoffs: i64 = conn
        .query_row("SELECT COUNT(*) FROM handoff_records", [], |row| row.get(0))
        .map_err(|e| {
            AppError::store("DB_QUERY_FAILED", "Failed to count ledger rows for emptiness check")
                .with_sqlite(&e)
        })?;
    Ok(count_incidents(conn)? == 0 && handoffs == 0)
}

/// Re-label a db-layer failure with a workspace code, keeping its details.
fn remap(code: &'static str, message: &'static str) -> impl Fn(AppError) -> AppError {
    move |e| {
        let details = e.details.clone().unwrap_or_else(|| e.to_string());
        AppError::store(code, message)
            .with_details(details)
            .with_retryable(e.retryable)
    }
}

fn open_and_migrate(db_path: &Path, open_code: &'static str) -> Result<Connection, AppError> {
    let mut conn =
        crate::db::open(db_path).map_err(remap(open_code, "Failed to open workspace database"))?;
    crate::db::migrate(&mut conn).map_err(remap(
        "WORKSPACE_MIGRATION_FAILED",
        "Failed to migrate workspace database",
    ))?;
    Ok(conn)
}

pub fn open_workspace_connection(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;
    if !db_path.is_file() {
        return Err(AppError::not_found(
            "WORKSPACE_DB_NOT_FOUND",
            "Workspace database file not found",
        )
        .with_details(db_path.display().to_string()));
    }
    open_and_migrate(db_path, "WORKSPACE_OPEN_FAILED")
}

pub fn create_workspace_connection(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;
    if db_path.exists() {
        return Err(AppError::conflict(
            "WORKSPACE_ALREADY_EXISTS",
            "Workspace DB file already exists",
        )
        .with_details(db_path.display().to_string()));
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::store("WORKSPACE_CREATE_FAILED", "Failed to create workspace directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }

    // SQLite creates the file on first open.
    open_and_migrate(db_path, "WORKSPACE_CREATE_FAILED")
}

fn metadata(db_path: &Path, conn: &Connection) -> Result<WorkspaceMetadata, AppError> {
    Ok(WorkspaceMetadata {
        db_path: db_path.to_string_lossy().to_string(),
        is_empty: is_empty_conn(conn)?,
    })
}

pub fn open_workspace(db_path: &Path) -> Result<WorkspaceMetadata, AppError> {
    let conn = open_workspace_connection(db_path)?;
    metadata(db_path, &conn)
}

pub fn create_workspace(db_path: &Path) -> Result<WorkspaceMetadata, AppError> {
    let conn = create_workspace_connection(db_path)?;
    metadata(db_path, &conn)
}

pub fn db_is_empty(db_path: &Path) -> Result<bool, AppError> {
    let conn = open_workspace_connection(db_path)?;
    is_empty_conn(&conn)
}
