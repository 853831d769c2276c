//! Incident lifecycle: create, reassign, close and delete.
//!
//! Every write runs in one IMMEDIATE transaction. Reassign and Close are guarded by a
//! conditional update on `resolved_date IS NULL`; zero affected rows rolls the whole
//! operation back and is reported as NotFound or Conflict.

use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use time::OffsetDateTime;

use crate::access::Actor;
use crate::catalog::{list_catalogs, Catalogs};
use crate::clock::{Clock, SystemClock};
use crate::config::{AttributionSource, EngineConfig};
use crate::db;
use crate::duration::{incident_duration, ElapsedDuration};
use crate::error::AppError;
use crate::normalize::timestamps::format_instant;
use crate::repo::views::{get_incident_view, list_incident_views, IncidentView};
use crate::repo::{incident_exists, incident_not_found};
use crate::resolve::{RefKind, ReferenceResolver};
use crate::timeline::{incident_history, incident_timeline, IncidentHistory, TimelineSegment};

mod close;
mod create;
mod delete;
mod reassign;

pub use close::CloseIncident;
pub use create::CreateIncident;
pub use delete::DeletedIncident;
pub use reassign::ReassignIncident;

pub struct LifecycleEngine<C: Clock = SystemClock> {
    config: EngineConfig,
    clock: C,
}

impl LifecycleEngine<SystemClock> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> LifecycleEngine<C> {
    pub fn with_clock(config: EngineConfig, clock: C) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn now(&self) -> OffsetDateTime {
        self.clock.now_utc()
    }

    fn begin<'c>(&self, conn: &'c mut Connection) -> Result<Transaction<'c>, AppError> {
        db::set_busy_timeout(conn, Duration::from_millis(self.config.busy_timeout_ms))?;
        conn.transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AppError::store("DB_TX_FAILED", "Failed to start transaction").with_sqlite(&e))
    }

    fn stamp(&self) -> Result<(OffsetDateTime, String), AppError> {
        let now = self.now();
        Ok((now, format_instant(now)?))
    }

    /// Opening verifier for a new incident: first configured source that yields a user.
    fn opening_verifier(
        &self,
        resolver: &dyn ReferenceResolver,
        actor_id: Option<i64>,
        requested: Option<&str>,
        responsible_id: i64,
    ) -> Result<Option<i64>, AppError> {
        for source in &self.config.opening_attribution {
            let candidate = match source {
                AttributionSource::AuthenticatedActor => actor_id,
                AttributionSource::RequestVerifier => match requested {
                    Some(name) => resolver.resolve_id_or_name(RefKind::User, name)?,
                    None => None,
                },
                AttributionSource::ResponsibleUser => Some(responsible_id),
            };
            if candidate.is_some() {
                tracing::debug!(?source, user_id = candidate, "opening verifier attributed");
                return Ok(candidate);
            }
        }
        Ok(None)
    }

    pub fn get_incident(&self, conn: &Connection, incident_id: i64) -> Result<IncidentView, AppError> {
        get_incident_view(conn, incident_id, self.now())
    }

    pub fn list_incidents(&self, conn: &Connection) -> Result<Vec<IncidentView>, AppError> {
        list_incident_views(conn, self.now())
    }

    pub fn timeline(&self, conn: &Connection, incident_id: i64) -> Result<Vec<TimelineSegment>, AppError> {
        incident_timeline(conn, incident_id, self.now())
    }

    pub fn history(&self, conn: &Connection, incident_id: i64) -> Result<IncidentHistory, AppError> {
        incident_history(conn, incident_id, self.now())
    }

    pub fn duration(&self, conn: &Connection, incident_id: i64) -> Result<ElapsedDuration, AppError> {
        incident_duration(conn, incident_id)
    }

    pub fn catalogs(&self, conn: &Connection) -> Result<Catalogs, AppError> {
        list_catalogs(conn)
    }
}

/// Ledger user id for the acting user, by id first and username second.
fn actor_user_id(resolver: &dyn ReferenceResolver, actor: &Actor) -> Result<Option<i64>, AppError> {
    if let Some(id) = actor.user_id {
        if resolver.exists(RefKind::User, id)? {
            return Ok(Some(id));
        }
    }
    let resolved = match actor.username.as_deref() {
        Some(name) => resolver.resolve(RefKind::User, name)?,
        None => None,
    };
    if resolved.is_none() && (actor.user_id.is_some() || actor.username.is_some()) {
        tracing::warn!(
            user_id = actor.user_id,
            username = actor.username.as_deref(),
            "acting user is not an active user; ledger attribution left empty"
        );
    }
    Ok(resolved)
}

/// Resolve an optional reference by name. Unknown names are dropped with a warning.
fn optional_reference(
    resolver: &dyn ReferenceResolver,
    kind: RefKind,
    text: Option<&str>,
) -> Result<Option<i64>, AppError> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    let resolved = resolver.resolve_id_or_name(kind, text)?;
    if resolved.is_none() {
        tracing::warn!(?kind, text, "optional reference did not resolve; stored as empty");
    }
    Ok(resolved)
}

/// Classify a guarded update that touched no rows.
fn guard_failure(conn: &Connection, incident_id: i64, actor: &Actor, operation: &str) -> AppError {
    match incident_exists(conn, incident_id) {
        Ok(false) => incident_not_found(incident_id),
        Ok(true) => {
            tracing::warn!(incident_id, operation, role = actor.role.as_str(), "incident already closed");
            AppError::conflict("INCIDENT_CLOSED", "Incident is already closed")
                .with_details(format!("incident_id={incident_id}; operation={operation}"))
                .with_actor_role(actor.role)
        }
        Err(e) => e,
    }
}

fn commit(tx: Transaction<'_>) -> Result<(), AppError> {
    tx.commit()
        .map_err(|e| AppError::store("DB_TX_FAILED", "Failed to commit transaction").with_sqlite(&e))
}
