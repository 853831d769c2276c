use std::path::PathBuf;

use clap::Args;
use rusqlite::Connection;
use serde::Serialize;

use ftk_core::access::{Actor, ActorRole};
use ftk_core::config::EngineConfig;
use ftk_core::demo::seed_demo_dataset;
use ftk_core::domain::{Affectation, DeviceRef, AFFECTATION_EQUIPMENT, AFFECTATION_NODE};
use ftk_core::error::{AppError, ErrorKind};
use ftk_core::lifecycle::{CloseIncident, CreateIncident, LifecycleEngine, ReassignIncident};
use ftk_core::workspace::{create_workspace, open_workspace_connection};

pub struct Context {
    pub db: PathBuf,
    pub config: Option<PathBuf>,
    pub actor: Actor,
}

impl Context {
    fn engine(&self) -> Result<LifecycleEngine, AppError> {
        let config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        Ok(LifecycleEngine::new(config))
    }

    fn open(&self) -> Result<Connection, AppError> {
        open_workspace_connection(&self.db)
    }
}

#[derive(Args)]
pub struct CreateArgs {
    /// Occurrence date (YYYY-MM-DD) or combined timestamp
    #[arg(long)]
    date: String,

    /// Occurrence time (HH:MM[:SS])
    #[arg(long)]
    time: Option<String>,

    #[arg(long)]
    equipment: String,

    #[arg(long)]
    description: String,

    /// Responsible user id or name
    #[arg(long)]
    responsible: String,

    #[arg(long)]
    department: Option<String>,

    /// Problem type id or description
    #[arg(long)]
    problem_type: Option<String>,

    #[arg(long)]
    console: Option<String>,

    #[arg(long)]
    site_id: Option<i64>,

    /// EQUIPMENT, NODE or a free-text label
    #[arg(long, default_value = AFFECTATION_EQUIPMENT)]
    affectation: String,

    #[arg(long, group = "device")]
    camera: Option<i64>,

    #[arg(long, group = "device")]
    encoder: Option<i64>,

    #[arg(long, group = "device")]
    ip_speaker: Option<i64>,

    #[arg(long, group = "device")]
    alarm_input: Option<i64>,

    #[arg(long)]
    node_id: Option<i64>,

    /// Opening verifier named in the request
    #[arg(long)]
    verifier: Option<String>,

    #[arg(long)]
    note: Option<String>,
}

impl CreateArgs {
    fn affectation(&self) -> Affectation {
        let kind = self.affectation.trim();
        if kind.eq_ignore_ascii_case(AFFECTATION_EQUIPMENT) {
            let device = self
                .camera
                .map(DeviceRef::Camera)
                .or(self.encoder.map(DeviceRef::Encoder))
                .or(self.ip_speaker.map(DeviceRef::IpSpeaker))
                .or(self.alarm_input.map(DeviceRef::AlarmInput));
            Affectation::Equipment { device }
        } else if kind.eq_ignore_ascii_case(AFFECTATION_NODE) {
            Affectation::Node {
                node_id: self.node_id,
            }
        } else {
            Affectation::Other {
                label: kind.to_string(),
            }
        }
    }

    fn into_request(self) -> CreateIncident {
        CreateIncident {
            affectation: self.affectation(),
            opened_date: Some(self.date),
            opened_time: self.time,
            equipment_affected: self.equipment,
            description: self.description,
            responsible: self.responsible,
            department: self.department,
            problem_type: self.problem_type,
            console: self.console,
            site_id: self.site_id,
            opening_verifier: self.verifier,
            novelty_note: self.note,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|e| {
        AppError::store("OUTPUT_ENCODE_FAILED", "Failed to encode output").with_details(e.to_string())
    })
}

pub fn init(ctx: &Context) -> Result<String, AppError> {
    to_json(&create_workspace(&ctx.db)?)
}

pub fn seed_demo(ctx: &Context) -> Result<String, AppError> {
    let mut conn = ctx.open()?;
    to_json(&seed_demo_dataset(&mut conn)?)
}

pub fn create(ctx: &Context, args: CreateArgs) -> Result<String, AppError> {
    let engine = ctx.engine()?;
    let mut conn = ctx.open()?;
    to_json(&engine.create_incident(&mut conn, &ctx.actor, &args.into_request())?)
}

pub fn reassign(
    ctx: &Context,
    id: i64,
    department: Option<String>,
    note: Option<String>,
) -> Result<String, AppError> {
    let engine = ctx.engine()?;
    let mut conn = ctx.open()?;
    let req = ReassignIncident {
        department,
        novelty_note: note,
    };
    to_json(&engine.reassign_incident(&mut conn, &ctx.actor, id, &req)?)
}

pub fn close(
    ctx: &Context,
    id: i64,
    date: String,
    time: Option<String>,
    department: String,
    note: String,
    responsible: Option<String>,
) -> Result<String, AppError> {
    let engine = ctx.engine()?;
    let mut conn = ctx.open()?;
    let req = CloseIncident {
        resolved_date: Some(date),
        resolved_time: time,
        department: Some(department),
        novelty_note: Some(note),
        closing_responsible: responsible,
    };
    to_json(&engine.close_incident(&mut conn, &ctx.actor, id, &req)?)
}

pub fn delete(ctx: &Context, id: i64) -> Result<String, AppError> {
    let engine = ctx.engine()?;
    let mut conn = ctx.open()?;
    to_json(&engine.delete_incident(&mut conn, &ctx.actor, id)?)
}

pub fn show(ctx: &Context, id: i64) -> Result<String, AppError> {
    to_json(&ctx.engine()?.get_incident(&ctx.open()?, id)?)
}

pub fn list(ctx: &Context) -> Result<String, AppError> {
    to_json(&ctx.engine()?.list_incidents(&ctx.open()?)?)
}

pub fn timeline(ctx: &Context, id: i64) -> Result<String, AppError> {
    to_json(&ctx.engine()?.timeline(&ctx.open()?, id)?)
}

pub fn history(ctx: &Context, id: i64) -> Result<String, AppError> {
    to_json(&ctx.engine()?.history(&ctx.open()?, id)?)
}

pub fn duration(ctx: &Context, id: i64) -> Result<String, AppError> {
    to_json(&ctx.engine()?.duration(&ctx.open()?, id)?)
}

pub fn catalogs(ctx: &Context) -> Result<String, AppError> {
    to_json(&ctx.engine()?.catalogs(&ctx.open()?)?)
}

/// Failure as printed by the CLI. `status` is the HTTP-style classification a request
/// layer would answer with.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub status: u16,
    pub error: AppError,
    #[serde(skip)]
    pub exit_code: u8,
}

impl ErrorReport {
    pub fn from_error(error: AppError, actor: &Actor) -> Self {
        let (status, exit_code) = match error.kind {
            ErrorKind::Validation => (400, 2),
            ErrorKind::NotFound => (404, 3),
            ErrorKind::Authorization => (403, 4),
            // Administrators see the lock as a plain conflict; everyone else is told the
            // record is locked for them.
            ErrorKind::Conflict => match error.actor_role.unwrap_or(actor.role) {
                ActorRole::Admin => (409, 5),
                ActorRole::Supervisor | ActorRole::Operator => (423, 5),
            },
            ErrorKind::Store if error.retryable => (503, 6),
            ErrorKind::Store => (500, 1),
        };
        if error.retryable {
            tracing::warn!(code = %error.code, "operation failed with a retryable store error");
        }
        Self {
            status,
            error,
            exit_code,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| {
            format!(
                "{{\"status\":{},\"error\":{{\"code\":\"{}\"}}}}",
                self.status, self.error.code
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn closed_for(role: ActorRole) -> AppError {
        AppError::conflict("INCIDENT_CLOSED", "Incident is already closed").with_actor_role(role)
    }

    #[test]
    fn closed_incident_is_a_conflict_for_admins_and_locked_for_others() {
        let admin = Actor::new(Some(1), Some("root".into()), ActorRole::Admin);
        let report = ErrorReport::from_error(closed_for(ActorRole::Admin), &admin);
        assert_eq!((report.status, report.exit_code), (409, 5));

        for role in [ActorRole::Supervisor, ActorRole::Operator] {
            let actor = Actor::new(Some(2), None, role);
            let report = ErrorReport::from_error(closed_for(role), &actor);
            assert_eq!((report.status, report.exit_code), (423, 5));
        }
    }

    #[test]
    fn conflict_without_role_falls_back_to_the_caller() {
        let err = AppError::conflict("INCIDENT_CLOSED", "Incident is already closed");
        let operator = Actor::new(None, None, ActorRole::Operator);
        assert_eq!(ErrorReport::from_error(err.clone(), &operator).status, 423);
        let admin = Actor::new(None, None, ActorRole::Admin);
        assert_eq!(ErrorReport::from_error(err, &admin).status, 409);
    }

    #[test]
    fn other_kinds_map_to_distinct_statuses() {
        let actor = Actor::new(None, None, ActorRole::Operator);
        let cases = [
            (AppError::validation("V", "v"), 400, 2),
            (AppError::not_found("N", "n"), 404, 3),
            (AppError::authorization("A", "a"), 403, 4),
            (AppError::store("S", "s").with_retryable(true), 503, 6),
            (AppError::store("S", "s"), 500, 1),
        ];
        for (err, status, exit_code) in cases {
            let report = ErrorReport::from_error(err, &actor);
            assert_eq!((report.status, report.exit_code), (status, exit_code));
        }
    }

    #[test]
    fn report_serializes_status_and_error_but_not_exit_code() {
        let actor = Actor::new(None, None, ActorRole::Operator);
        let json = ErrorReport::from_error(closed_for(ActorRole::Operator), &actor).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], 423);
        assert_eq!(value["error"]["code"], "INCIDENT_CLOSED");
        assert!(value.get("exit_code").is_none());
    }
}
