use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::{actor_user_id, commit, optional_reference, LifecycleEngine};
use crate::access::Actor;
use crate::clock::Clock;
use crate::domain::{Affectation, HandoffKind};
use crate::error::AppError;
use crate::repo::handoffs::{insert_handoff, NewHandoff};
use crate::repo::views::{get_incident_view, IncidentView};
use crate::repo::{insert_incident, NewIncident};
use crate::resolve::{CatalogResolver, RefKind, ReferenceResolver};
use crate::validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateIncident {
    /// `YYYY-MM-DD`, or a combined ISO/RFC3339 timestamp when `opened_time` is absent.
    pub opened_date: Option<String>,
    pub opened_time: Option<String>,
    pub equipment_affected: String,
    pub description: String,
    /// Responsible user id or name.
    pub responsible: String,
    #[serde(default)]
    pub department: Option<String>,
    /// Problem type id or description. Falls back to matching `description`.
    #[serde(default)]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub console: Option<String>,
    #[serde(default)]
    pub site_id: Option<i64>,
    pub affectation: Affectation,
    #[serde(default)]
    pub opening_verifier: Option<String>,
    #[serde(default)]
    pub novelty_note: Option<String>,
}

fn require_existing(
    resolver: &dyn ReferenceResolver,
    kind: RefKind,
    field: &str,
    id: Option<i64>,
) -> Result<(), AppError> {
    let Some(id) = id else { return Ok(()) };
    if resolver.exists(kind, id)? {
        return Ok(());
    }
    Err(AppError::validation("VALIDATION_REFERENCE_UNKNOWN", format!("{field} does not exist"))
        .with_field(field)
        .with_details(format!("id={id}")))
}

impl<C: Clock> LifecycleEngine<C> {
    /// Open an incident and its opening ledger row.
    pub fn create_incident(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        req: &CreateIncident,
    ) -> Result<IncidentView, AppError> {
        let (now, stamp) = self.stamp()?;
        let opened = validate::past_date_time(
            "opened_at",
            req.opened_date.as_deref(),
            req.opened_time.as_deref(),
            now,
        )?;
        let equipment_affected = validate::required_text("equipment_affected", &req.equipment_affected)?;
        let description = validate::required_text("description", &req.description)?;
        let responsible = validate::required_text("responsible", &req.responsible)?;
        let affectation = validate::affectation(&req.affectation)?;

        let tx = self.begin(conn)?;
        let resolver = CatalogResolver::new(&tx);

        let Some(responsible_id) = resolver.resolve_id_or_name(RefKind::User, &responsible)? else {
            return Err(AppError::validation(
                "VALIDATION_RESPONSIBLE_UNRESOLVED",
                "Responsible user does not match an active user",
            )
            .with_field("responsible")
            .with_details(format!("value={responsible}")));
        };
        let department_id = optional_reference(&resolver, RefKind::Department, req.department.as_deref())?;
        let problem_type_id = match validate::optional_text(req.problem_type.as_deref()) {
            Some(text) => optional_reference(&resolver, RefKind::ProblemType, Some(&text))?,
            None => resolver.resolve(RefKind::ProblemType, &description)?,
        };
        let console_id = optional_reference(&resolver, RefKind::Console, req.console.as_deref())?;
        require_existing(&resolver, RefKind::Site, "site_id", req.site_id)?;
        if let Affectation::Node { node_id } = &affectation {
            require_existing(&resolver, RefKind::Node, "node_id", *node_id)?;
        }

        let incident_id = insert_incident(
            &tx,
            &NewIncident {
                opened_date: opened.date_string()?,
                opened_time: opened.time_string()?,
                equipment_affected,
                description,
                affectation: affectation.to_columns(),
                responsible_user_id: responsible_id,
                department_id,
                problem_type_id,
                console_id,
                site_id: req.site_id,
                created_at: stamp.clone(),
            },
        )?;

        let actor_id = actor_user_id(&resolver, actor)?;
        let verifier_id = self.opening_verifier(
            &resolver,
            actor_id,
            validate::optional_text(req.opening_verifier.as_deref()).as_deref(),
            responsible_id,
        )?;
        insert_handoff(
            &tx,
            HandoffKind::Opening,
            &NewHandoff {
                incident_id,
                department_id,
                novelty_note: validate::optional_text(req.novelty_note.as_deref()),
                opening_verifier_id: verifier_id,
                last_editor_id: verifier_id,
                created_at: stamp,
                ..NewHandoff::default()
            },
        )?;

        let view = get_incident_view(&tx, incident_id, now)?;
        commit(tx)?;
        tracing::info!(incident_id, department_id, responsible_id, "incident created");
        Ok(view)
    }
}
