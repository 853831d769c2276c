use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::{actor_user_id, commit, guard_failure, optional_reference, LifecycleEngine};
use crate::access::Actor;
use crate::clock::Clock;
use crate::domain::HandoffKind;
use crate::error::AppError;
use crate::repo::assign_department_if_open;
use crate::repo::handoffs::{annotate_handoff, insert_handoff, last_department, latest_handoff_id, NewHandoff};
use crate::repo::views::{get_incident_view, IncidentView};
use crate::resolve::{CatalogResolver, RefKind};
use crate::validate;

/// Supervisor edit of an open incident. `department: None` clears the owning department.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReassignIncident {
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub novelty_note: Option<String>,
}

impl<C: Clock> LifecycleEngine<C> {
    /// Move an open incident to another department.
    ///
    /// A ledger row is appended only when the department differs from the last
    /// department-bearing row. Otherwise a novelty note is attached to the latest row.
    pub fn reassign_incident(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        incident_id: i64,
        req: &ReassignIncident,
    ) -> Result<IncidentView, AppError> {
        let (now, stamp) = self.stamp()?;
        let note = validate::optional_text(req.novelty_note.as_deref());

        let tx = self.begin(conn)?;
        let resolver = CatalogResolver::new(&tx);
        let department_id = optional_reference(&resolver, RefKind::Department, req.department.as_deref())?;

        if assign_department_if_open(&tx, incident_id, department_id, &stamp)? == 0 {
            return Err(guard_failure(&tx, incident_id, actor, "reassign"));
        }

        let actor_id = actor_user_id(&resolver, actor)?;
        let previous = last_department(&tx, incident_id)?;
        match department_id {
            Some(department_id) if previous != Some(department_id) => {
                let handoff_id = insert_handoff(
                    &tx,
                    HandoffKind::Reassignment,
                    &NewHandoff {
                        incident_id,
                        department_id: Some(department_id),
                        novelty_note: note,
                        last_editor_id: actor_id,
                        supervising_user_id: actor_id,
                        created_at: stamp,
                        ..NewHandoff::default()
                    },
                )?;
                tracing::debug!(incident_id, handoff_id, ?previous, department_id, "department change recorded");
            }
            _ => match (note, latest_handoff_id(&tx, incident_id)?) {
                (Some(note), Some(handoff_id)) => {
                    annotate_handoff(&tx, handoff_id, Some(&note), actor_id, actor_id)?;
                    tracing::debug!(incident_id, handoff_id, "department unchanged; note attached to latest row");
                }
                (Some(note), None) => {
                    insert_handoff(
                        &tx,
                        HandoffKind::Note,
                        &NewHandoff {
                            incident_id,
                            novelty_note: Some(note),
                            last_editor_id: actor_id,
                            supervising_user_id: actor_id,
                            created_at: stamp,
                            ..NewHandoff::default()
                        },
                    )?;
                }
                (None, _) => {
                    tracing::debug!(incident_id, ?department_id, "department unchanged; ledger untouched");
                }
            },
        }

        let view = get_incident_view(&tx, incident_id, now)?;
        commit(tx)?;
        tracing::info!(incident_id, ?department_id, "incident reassigned");
        Ok(view)
    }
}
