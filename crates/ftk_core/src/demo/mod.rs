use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::macros::datetime;
use time::Duration;

use crate::access::{Actor, ActorRole};
use crate::catalog;
use crate::clock::FixedClock;
use crate::config::EngineConfig;
use crate::domain::{Affectation, DeviceRef};
use crate::error::AppError;
use crate::lifecycle::{CloseIncident, CreateIncident, LifecycleEngine, ReassignIncident};
use crate::repo::count_incidents;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DemoSeedSummary {
    /// True when the workspace already held incidents and nothing was written.
    pub skipped: bool,
    pub incident_ids: Vec<i64>,
}

struct DemoCatalog {
    supervisor_id: i64,
    node_id: i64,
    site_id: i64,
}

fn seed_catalogs(conn: &mut Connection) -> Result<DemoCatalog, AppError> {
    let tx = conn.transaction().map_err(|e| {
        AppError::store("DB_TX_FAILED", "Failed to start demo catalog transaction").with_sqlite(&e)
    })?;

    catalog::insert_user(&tx, "jdoe", Some("Juan Doe"), true)?;
    let supervisor_id = catalog::insert_user(&tx, "mrivas", Some("Marta Rivas"), true)?;
    catalog::insert_user(&tx, "lgomez", Some("Lucía Gómez"), true)?;
    catalog::insert_user(&tx, "pvera", Some("Pablo Vera"), false)?;
    for name in ["NOC", "Field Ops", "Soporte TI"] {
        catalog::insert_department(&tx, name)?;
    }
    for description in ["Sin señal", "Falla de energía", "Enlace caído"] {
        catalog::insert_problem_type(&tx, description)?;
    }
    catalog::insert_console(&tx, "Consola Central")?;
    let client_id = catalog::insert_client(&tx, "Cliente Demo")?;
    let site_id = catalog::insert_site(&tx, "Sede Norte", Some(client_id), Some("EST-001"))?;
    let node_id = catalog::insert_node(&tx, "Nodo Norte 1", Some(site_id))?;

    tx.commit().map_err(|e| {
        AppError::store("DB_TX_FAILED", "Failed to commit demo catalog transaction").with_sqlite(&e)
    })?;
    Ok(DemoCatalog {
        supervisor_id,
        node_id,
        site_id,
    })
}

fn create(
    opened_date: &str,
    equipment: &str,
    description: &str,
    department: &str,
    affectation: Affectation,
) -> CreateIncident {
    CreateIncident {
        opened_date: Some(opened_date.to_string()),
        opened_time: None,
        equipment_affected: equipment.to_string(),
        description: description.to_string(),
        responsible: "jdoe".to_string(),
        department: Some(department.to_string()),
        problem_type: None,
        console: Some("Consola Central".to_string()),
        site_id: None,
        affectation,
        opening_verifier: None,
        novelty_note: None,
    }
}

fn close(resolved_at: &str, department: &str, note: &str) -> CloseIncident {
    CloseIncident {
        resolved_date: Some(resolved_at.to_string()),
        resolved_time: None,
        department: Some(department.to_string()),
        novelty_note: Some(note.to_string()),
        closing_responsible: Some("lgomez".to_string()),
    }
}

/// Seed reference catalogs and three incidents (two closed, one open). Incidents go
/// through the lifecycle engine on a scripted clock, so the ledger is well formed.
pub fn seed_demo_dataset(conn: &mut Connection) -> Result<DemoSeedSummary, AppError> {
    if count_incidents(conn)? > 0 {
        tracing::info!("workspace already has incidents; demo seed skipped");
        return Ok(DemoSeedSummary {
            skipped: true,
            incident_ids: Vec::new(),
        });
    }

    let refs = seed_catalogs(conn)?;
    let actor = Actor::new(
        Some(refs.supervisor_id),
        Some("mrivas".to_string()),
        ActorRole::Supervisor,
    );
    let engine = LifecycleEngine::with_clock(
        EngineConfig::default(),
        FixedClock::new(datetime!(2025-10-06 08:00 UTC)),
    );
    let clock = engine.clock();
    let mut incident_ids = Vec::with_capacity(3);

    let mut camera = create(
        "2025-10-06T08:00",
        "Cámara acceso principal",
        "Sin señal",
        "NOC",
        Affectation::Equipment {
            device: Some(DeviceRef::Camera(101)),
        },
    );
    camera.site_id = Some(refs.site_id);
    let id = engine.create_incident(conn, &actor, &camera)?.incident.id;
    clock.advance(Duration::hours(3));
    engine.reassign_incident(
        conn,
        &actor,
        id,
        &ReassignIncident {
            department: Some("Field Ops".to_string()),
            novelty_note: Some("Se requiere visita en sitio".to_string()),
        },
    )?;
    clock.advance(Duration::hours(34));
    let resolved = close("2025-10-07T18:00", "Field Ops", "Cámara reemplazada");
    engine.close_incident(conn, &actor, id, &resolved)?;
    incident_ids.push(id);

    clock.set(datetime!(2025-10-08 14:30 UTC));
    let node = create(
        "2025-10-08T14:30",
        "Nodo Norte 1",
        "Falla de energía",
        "Soporte TI",
        Affectation::Node {
            node_id: Some(refs.node_id),
        },
    );
    let id = engine.create_incident(conn, &actor, &node)?.incident.id;
    clock.advance(Duration::hours(2));
    let resolved = close("2025-10-08T16:15", "NOC", "UPS restablecida");
    engine.close_incident(conn, &actor, id, &resolved)?;
    incident_ids.push(id);

    clock.set(datetime!(2025-10-10 07:15 UTC));
    let link = create(
        "2025-10-10T07:15",
        "Enlace sede norte",
        "Enlace caído",
        "NOC",
        Affectation::Other {
            label: "ENLACE".to_string(),
        },
    );
    incident_ids.push(engine.create_incident(conn, &actor, &link)?.incident.id);

    tracing::info!(incidents = incident_ids.len(), "demo dataset seeded");
    Ok(DemoSeedSummary {
        skipped: false,
        incident_ids,
    })
}
