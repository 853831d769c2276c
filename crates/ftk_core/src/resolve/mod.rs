//! Free-text to foreign-key resolution against the reference catalogs.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    User,
    Department,
    ProblemType,
    Console,
    Site,
    Node,
}

impl RefKind {
    fn label(self) -> &'static str {
        match self {
            RefKind::User => "user",
            RefKind::Department => "department",
            RefKind::ProblemType => "problem type",
            RefKind::Console => "console",
            RefKind::Site => "site",
            RefKind::Node => "node",
        }
    }

    /// Rows are `(id, candidate_name, alternate_name)`; users match on username or display name.
    fn lookup_sql(self) -> &'static str {
        match self {
            RefKind::User => "SELECT id, username, display_name FROM users WHERE active = 1",
            RefKind::Department => "SELECT id, name, NULL FROM departments",
            RefKind::ProblemType => "SELECT id, description, NULL FROM problem_types",
            RefKind::Console => "SELECT id, name, NULL FROM consoles",
            RefKind::Site => "SELECT id, name, NULL FROM sites",
            RefKind::Node => "SELECT id, name, NULL FROM nodes",
        }
    }

    fn exists_sql(self) -> &'static str {
        match self {
            RefKind::User => "SELECT 1 FROM users WHERE id = ?1 AND active = 1",
            RefKind::Department => "SELECT 1 FROM departments WHERE id = ?1",
            RefKind::ProblemType => "SELECT 1 FROM problem_types WHERE id = ?1",
            RefKind::Console => "SELECT 1 FROM consoles WHERE id = ?1",
            RefKind::Site => "SELECT 1 FROM sites WHERE id = ?1",
            RefKind::Node => "SELECT 1 FROM nodes WHERE id = ?1",
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Resolves names to reference ids. "Not found" is `Ok(None)`; callers decide whether that
/// is fatal for their field.
pub trait ReferenceResolver {
    fn resolve(&self, kind: RefKind, text: &str) -> Result<Option<i64>, AppError>;

    fn exists(&self, kind: RefKind, id: i64) -> Result<bool, AppError>;

    /// Accept either a numeric id that exists or a name.
    fn resolve_id_or_name(&self, kind: RefKind, text: &str) -> Result<Option<i64>, AppError> {
        if let Ok(id) = text.trim().parse::<i64>() {
            if self.exists(kind, id)? {
                return Ok(Some(id));
            }
        }
        self.resolve(kind, text)
    }
}

/// Resolver over the SQLite reference tables. Each call re-reads the table, so renames
/// and deactivations are visible immediately.
pub struct CatalogResolver<'c> {
    conn: &'c Connection,
}

impl<'c> CatalogResolver<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl ReferenceResolver for CatalogResolver<'_> {
    fn resolve(&self, kind: RefKind, text: &str) -> Result<Option<i64>, AppError> {
        let needle = normalize(text);
        if needle.is_empty() {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(kind.lookup_sql()).map_err(|e| {
            AppError::store("DB_QUERY_FAILED", format!("Failed to prepare {} lookup", kind.label()))
                .with_sqlite(&e)
        })?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| {
                AppError::store("DB_QUERY_FAILED", format!("Failed to read {} lookup", kind.label()))
                    .with_sqlite(&e)
            })?;

        let found = rows.into_iter().find_map(|(id, name, alternate)| {
            [name, alternate]
                .into_iter()
                .flatten()
                .any(|candidate| normalize(&candidate) == needle)
                .then_some(id)
        });
        if found.is_none() {
            tracing::debug!(kind = kind.label(), text, "reference did not resolve");
        }
        Ok(found)
    }

    fn exists(&self, kind: RefKind, id: i64) -> Result<bool, AppError> {
        let hit: Option<i64> = self
            .conn
            .query_row(kind.exists_sql(), [id], |row| row.get(0))
            .optional()
            .map_err(|e| {
                AppError::store("DB_QUERY_FAILED", format!("Failed to check {} existence", kind.label()))
                    .with_sqlite(&e)
            })?;
        Ok(hit.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog, db};

    fn conn() -> Connection {
        let mut conn = db::open_in_memory().unwrap();
        db::migrate(&mut conn).unwrap();
        conn
    }

    #[test]
    fn users_match_username_or_display_name_case_insensitively() {
        let conn = conn();
        let id = catalog::insert_user(&conn, "jdoe", Some("John Doe"), true).unwrap();
        let resolver = CatalogResolver::new(&conn);

        assert_eq!(resolver.resolve(RefKind::User, "JDOE").unwrap(), Some(id));
        assert_eq!(resolver.resolve(RefKind::User, "  john doe ").unwrap(), Some(id));
        assert_eq!(resolver.resolve(RefKind::User, "john").unwrap(), None);
        assert_eq!(resolver.resolve(RefKind::User, "").unwrap(), None);
    }

    #[test]
    fn inactive_users_do_not_resolve() {
        let conn = conn();
        let id = catalog::insert_user(&conn, "retired", None, false).unwrap();
        let resolver = CatalogResolver::new(&conn);
        assert_eq!(resolver.resolve(RefKind::User, "retired").unwrap(), None);
        assert!(!resolver.exists(RefKind::User, id).unwrap());
    }

    #[test]
    fn lookups_see_changes_between_calls() {
        let conn = conn();
        let resolver = CatalogResolver::new(&conn);
        assert_eq!(resolver.resolve(RefKind::Department, "noc").unwrap(), None);
        let id = catalog::insert_department(&conn, "NOC").unwrap();
        assert_eq!(resolver.resolve(RefKind::Department, "noc").unwrap(), Some(id));
    }

    #[test]
    fn id_or_name_prefers_existing_ids() {
        let conn = conn();
        let id = catalog::insert_problem_type(&conn, "Sin video").unwrap();
        let resolver = CatalogResolver::new(&conn);
        assert_eq!(
            resolver.resolve_id_or_name(RefKind::ProblemType, &id.to_string()).unwrap(),
            Some(id)
        );
        assert_eq!(
            resolver.resolve_id_or_name(RefKind::ProblemType, "SIN VIDEO").unwrap(),
            Some(id)
        );
        assert_eq!(resolver.resolve_id_or_name(RefKind::ProblemType, "999").unwrap(), None);
    }
}
