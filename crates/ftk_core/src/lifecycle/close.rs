use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::{actor_user_id, commit, guard_failure, optional_reference, LifecycleEngine};
use crate::access::Actor;
use crate::clock::Clock;
use crate::domain::HandoffKind;
use crate::error::AppError;
use crate::repo::handoffs::{insert_handoff, last_department, NewHandoff};
use crate::repo::views::{get_incident_view, IncidentView};
use crate::repo::{get_incident, resolve_if_open};
use crate::resolve::{CatalogResolver, RefKind, ReferenceResolver};
use crate::status::opened_at;
use crate::validate;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseIncident {
    /// `YYYY-MM-DD`, or a combined timestamp carrying the time as well.
    pub resolved_date: Option<String>,
    #[serde(default)]
    pub resolved_time: Option<String>,
    pub department: Option<String>,
    pub novelty_note: Option<String>,
    #[serde(default)]
    pub closing_responsible: Option<String>,
}

impl<C: Clock> LifecycleEngine<C> {
    /// Resolve an open incident, recording the final department and a closing ledger row.
    pub fn close_incident(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        incident_id: i64,
        req: &CloseIncident,
    ) -> Result<IncidentView, AppError> {
        let (now, stamp) = self.stamp()?;
        let resolved = validate::past_date_time(
            "resolved_date",
            req.resolved_date.as_deref(),
            req.resolved_time.as_deref(),
            now,
        )?;
        if resolved.time.is_none() {
            return Err(AppError::validation("VALIDATION_REQUIRED_FIELD", "resolved_time is required")
                .with_field("resolved_time"));
        }
        let department = validate::required_text("department", req.department.as_deref().unwrap_or(""))?;
        let note = validate::required_text("novelty_note", req.novelty_note.as_deref().unwrap_or(""))?;

        let tx = self.begin(conn)?;
        let resolver = CatalogResolver::new(&tx);
        let Some(department_id) = resolver.resolve_id_or_name(RefKind::Department, &department)? else {
            return Err(AppError::validation(
                "VALIDATION_DEPARTMENT_UNRESOLVED",
                "Closing department does not exist",
            )
            .with_field("department")
            .with_details(format!("value={department}")));
        };

        let incident = get_incident(&tx, incident_id)?;
        if incident.is_closed() {
            return Err(guard_failure(&tx, incident_id, actor, "close"));
        }
        validate::resolution_after_opening(&opened_at(&incident)?, &resolved)?;

        let closed = resolve_if_open(
            &tx,
            incident_id,
            &resolved.date_string()?,
            resolved.time_string()?.as_deref(),
            department_id,
            &stamp,
        )?;
        if closed == 0 {
            return Err(guard_failure(&tx, incident_id, actor, "close"));
        }

        let actor_id = actor_user_id(&resolver, actor)?;
        let closing_responsible_id =
            optional_reference(&resolver, RefKind::User, req.closing_responsible.as_deref())?;

        let previous = last_department(&tx, incident_id)?;
        if previous != Some(department_id) {
            insert_handoff(
                &tx,
                HandoffKind::Reassignment,
                &NewHandoff {
                    incident_id,
                    department_id: Some(department_id),
                    last_editor_id: actor_id,
                    supervising_user_id: actor_id,
                    created_at: stamp.clone(),
                    ..NewHandoff::default()
                },
            )?;
            tracing::debug!(incident_id, ?previous, department_id, "final department change recorded");
        }
        insert_handoff(
            &tx,
            HandoffKind::Closing,
            &NewHandoff {
                incident_id,
                novelty_note: Some(note),
                closing_verifier_id: actor_id,
                closing_responsible_id,
                last_editor_id: actor_id,
                created_at: stamp,
                ..NewHandoff::default()
            },
        )?;

        let view = get_incident_view(&tx, incident_id, now)?;
        commit(tx)?;
        tracing::info!(incident_id, department_id, "incident closed");
        Ok(view)
    }
}
