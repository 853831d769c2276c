use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::{commit, LifecycleEngine};
use crate::access::Actor;
use crate::clock::Clock;
use crate::error::AppError;
use crate::repo::handoffs::delete_handoffs;
use crate::repo::{delete_incident, incident_not_found};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedIncident {
    pub incident_id: i64,
    pub handoffs_removed: usize,
}

impl<C: Clock> LifecycleEngine<C> {
    /// Remove an incident and its whole ledger. Admins and supervisors only.
    pub fn delete_incident(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        incident_id: i64,
    ) -> Result<DeletedIncident, AppError> {
        if !actor.can_delete() {
            tracing::warn!(incident_id, role = actor.role.as_str(), "delete refused");
            return Err(AppError::authorization(
                "DELETE_NOT_PERMITTED",
                "Only administrators or supervisors may delete incidents",
            )
            .with_details(format!("incident_id={incident_id}; role={}", actor.role.as_str())));
        }

        let tx = self.begin(conn)?;
        let handoffs_removed = delete_handoffs(&tx, incident_id)?;
        if delete_incident(&tx, incident_id)? == 0 {
            return Err(incident_not_found(incident_id));
        }
        commit(tx)?;

        tracing::info!(incident_id, handoffs_removed, "incident deleted");
        Ok(DeletedIncident {
            incident_id,
            handoffs_removed,
        })
    }
}
