use std::sync::Barrier;
use std::thread;

use tempfile::tempdir;
use time::macros::datetime;

use ftk_core::access::{Actor, ActorRole};
use ftk_core::catalog;
use ftk_core::clock::FixedClock;
use ftk_core::config::EngineConfig;
use ftk_core::domain::{Affectation, HandoffKind};
use ftk_core::error::ErrorKind;
use ftk_core::lifecycle::{CloseIncident, CreateIncident, LifecycleEngine};
use ftk_core::repo::handoffs::list_handoffs;
use ftk_core::workspace::{create_workspace_connection, open_workspace_connection};

const CLOSERS: usize = 8;

#[test]
fn concurrent_closes_resolve_exactly_once() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("race.sqlite");
    let mut conn = create_workspace_connection(&path).expect("create");
    let user_id = catalog::insert_user(&conn, "jdoe", Some("John Doe"), true).unwrap();
    catalog::insert_department(&conn, "NOC").unwrap();
    catalog::insert_department(&conn, "Field Ops").unwrap();

    let engine = LifecycleEngine::with_clock(
        EngineConfig {
            busy_timeout_ms: 30_000,
            ..EngineConfig::default()
        },
        FixedClock::new(datetime!(2024-03-03 09:00 UTC)),
    );
    let actor = Actor::new(Some(user_id), Some("jdoe".into()), ActorRole::Operator);
    let id = engine
        .create_incident(
            &mut conn,
            &actor,
            &CreateIncident {
                opened_date: Some("2024-03-01".into()),
                opened_time: Some("08:00".into()),
                equipment_affected: "Encoder-3".into(),
                description: "Frozen stream".into(),
                responsible: "jdoe".into(),
                department: Some("NOC".into()),
                problem_type: None,
                console: None,
                site_id: None,
                affectation: Affectation::Equipment { device: None },
                opening_verifier: None,
                novelty_note: None,
            },
        )
        .expect("create")
        .incident
        .id;

    // Connections are opened up front so only the closes race.
    let connections: Vec<_> = (0..CLOSERS)
        .map(|_| open_workspace_connection(&path).expect("open"))
        .collect();
    let barrier = Barrier::new(CLOSERS);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = connections
            .into_iter()
            .enumerate()
            .map(|(n, mut conn)| {
                let (engine, actor, barrier) = (&engine, &actor, &barrier);
                scope.spawn(move || {
                    let req = CloseIncident {
                        resolved_date: Some("2024-03-02".into()),
                        resolved_time: Some(format!("10:{n:02}")),
                        department: Some("Field Ops".into()),
                        novelty_note: Some(format!("closer {n}")),
                        closing_responsible: None,
                    };
                    barrier.wait();
                    engine.close_incident(&mut conn, actor, id, &req)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("closer thread")).collect()
    });

    let successes: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(successes.len(), 1, "exactly one close must win: {results:?}");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind, ErrorKind::Conflict, "unexpected failure: {err:?}");
    }

    let winner = &successes[0].incident;
    let conn = open_workspace_connection(&path).unwrap();
    let stored = engine.get_incident(&conn, id).unwrap().incident;
    assert_eq!(stored.resolved_time, winner.resolved_time);

    let ledger = list_handoffs(&conn, id).unwrap();
    let closings = ledger.iter().filter(|r| r.kind == HandoffKind::Closing).count();
    let reassignments = ledger.iter().filter(|r| r.kind == HandoffKind::Reassignment).count();
    assert_eq!(closings, 1);
    assert_eq!(reassignments, 1);
}
