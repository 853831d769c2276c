//! Department ownership timeline, rebuilt from the handoff ledger on every read.
//!
//! A segment starts at the `created_at` of a department-bearing row and ends at the
//! `created_at` of the next row in the full ledger. A closing row ends the segment at the
//! incident's declared resolution instead of at the moment the close was recorded. On a
//! closed incident no segment extends past the resolution, even when rows were recorded
//! after it. The last segment of an open incident runs until `now`.

use std::collections::HashMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::catalog::department_names;
use crate::domain::{HandoffKind, HandoffRecord};
use crate::duration::{format_elapsed, resolution_duration, ElapsedDuration};
use crate::error::AppError;
use crate::normalize::timestamps::{format_instant, parse_instant};
use crate::repo::get_incident;
use crate::repo::handoffs::{list_handoff_entries, list_handoffs, HandoffEntryView};
use crate::status::{opened_at, resolved_at, status_of, IncidentStatus};

/// Interval during which one department owned the incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipSpan {
    pub handoff_id: i64,
    pub department_id: i64,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    /// True when the span is still running and `end` is the read time.
    pub open_ended: bool,
}

impl OwnershipSpan {
    pub fn duration_seconds(&self) -> i64 {
        (self.end - self.start).whole_seconds()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineSegment {
    pub handoff_id: i64,
    pub department_id: i64,
    pub department_name: Option<String>,
    pub start: String,
    pub end: String,
    pub duration_seconds: i64,
    pub duration_text: String,
    pub open_ended: bool,
}

/// Slice a ledger (already in ledger order) into ownership spans.
///
/// `close_boundary` is the resolution instant of a closed incident; starts and ends are
/// capped at it. Ends earlier than their start are clamped to the start.
pub fn reconstruct_spans(
    ledger: &[HandoffRecord],
    close_boundary: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Result<Vec<OwnershipSpan>, AppError> {
    let mut spans = Vec::new();
    for (idx, record) in ledger.iter().enumerate() {
        let Some(department_id) = record.department_id else {
            continue;
        };
        let mut start = parse_instant(&record.created_at)?;
        let (mut end, open_ended) = match ledger.get(idx + 1) {
            Some(next) if next.kind == HandoffKind::Closing => {
                (close_boundary.unwrap_or(parse_instant(&next.created_at)?), false)
            }
            Some(next) => (parse_instant(&next.created_at)?, false),
            None => match close_boundary {
                Some(resolved) => (resolved, false),
                None => (now, true),
            },
        };
        if let Some(resolved) = close_boundary {
            start = start.min(resolved);
            end = end.min(resolved);
        }
        spans.push(OwnershipSpan {
            handoff_id: record.id,
            department_id,
            start,
            end: end.max(start),
            open_ended,
        });
    }
    Ok(spans)
}

fn to_segment(span: &OwnershipSpan, names: &HashMap<i64, String>) -> Result<TimelineSegment, AppError> {
    let seconds = span.duration_seconds();
    Ok(TimelineSegment {
        handoff_id: span.handoff_id,
        department_id: span.department_id,
        department_name: names.get(&span.department_id).cloned(),
        start: format_instant(span.start)?,
        end: format_instant(span.end)?,
        duration_seconds: seconds,
        duration_text: format_elapsed(seconds.saturating_mul(1_000)).text,
        open_ended: span.open_ended,
    })
}

pub fn incident_timeline(
    conn: &Connection,
    incident_id: i64,
    now: OffsetDateTime,
) -> Result<Vec<TimelineSegment>, AppError> {
    let incident = get_incident(conn, incident_id)?;
    let close_boundary = resolved_at(&incident)?.map(|r| r.instant());
    let ledger = list_handoffs(conn, incident_id)?;
    let spans = reconstruct_spans(&ledger, close_boundary, now)?;
    if spans.is_empty() {
        return Ok(Vec::new());
    }
    let names = department_names(conn)?;
    spans.iter().map(|span| to_segment(span, &names)).collect()
}

/// Everything the incident history screen shows: header, duration, ownership segments
/// and the full ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentHistory {
    pub incident_id: i64,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub opened_date: String,
    pub opened_time: Option<String>,
    pub resolved_date: Option<String>,
    pub resolved_time: Option<String>,
    pub status: IncidentStatus,
    pub duration: Option<ElapsedDuration>,
    pub segments: Vec<TimelineSegment>,
    pub entries: Vec<HandoffEntryView>,
}

pub fn incident_history(
    conn: &Connection,
    incident_id: i64,
    now: OffsetDateTime,
) -> Result<IncidentHistory, AppError> {
    let incident = get_incident(conn, incident_id)?;
    let opened = opened_at(&incident)?;
    let resolved = resolved_at(&incident)?;
    let duration = match resolved.as_ref() {
        Some(r) => Some(resolution_duration(&opened, Some(r))?),
        None => None,
    };
    let names = department_names(conn)?;
    let ledger = list_handoffs(conn, incident_id)?;
    let segments = reconstruct_spans(&ledger, resolved.map(|r| r.instant()), now)?
        .iter()
        .map(|span| to_segment(span, &names))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IncidentHistory {
        incident_id,
        department_id: incident.department_id,
        department_name: incident.department_id.and_then(|id| names.get(&id).cloned()),
        status: status_of(&incident, now)?,
        duration,
        segments,
        entries: list_handoff_entries(conn, incident_id)?,
        opened_date: incident.opened_date,
        opened_time: incident.opened_time,
        resolved_date: incident.resolved_date,
        resolved_time: incident.resolved_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    fn row(id: i64, kind: HandoffKind, department_id: Option<i64>, at: OffsetDateTime) -> HandoffRecord {
        HandoffRecord {
            id,
            incident_id: 1,
            kind,
            department_id,
            novelty_note: None,
            opening_verifier_id: None,
            closing_verifier_id: None,
            last_editor_id: None,
            closing_responsible_id: None,
            supervising_user_id: None,
            created_at: format_instant(at).unwrap(),
        }
    }

    #[test]
    fn open_incident_runs_until_now() {
        let t0 = datetime!(2024-03-01 08:00 UTC);
        let ledger = vec![
            row(1, HandoffKind::Opening, Some(10), t0),
            row(2, HandoffKind::Reassignment, Some(20), t0 + Duration::hours(3)),
        ];
        let now = t0 + Duration::hours(5);
        let spans = reconstruct_spans(&ledger, None, now).unwrap();

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].end, spans[1].start);
        assert_eq!(spans[0].duration_seconds(), 3 * 3600);
        assert_eq!(spans[1].end, now);
        assert!(spans[1].open_ended);
        assert!(!spans[0].open_ended);
    }

    #[test]
    fn closing_row_ends_segment_at_declared_resolution() {
        let t0 = datetime!(2024-03-01 00:00 UTC);
        let resolved = datetime!(2024-03-02 10:00 UTC);
        let recorded_close = datetime!(2024-03-05 09:00 UTC);
        let ledger = vec![
            row(1, HandoffKind::Opening, Some(10), t0),
            row(2, HandoffKind::Reassignment, Some(20), t0 + Duration::hours(2)),
            row(3, HandoffKind::Closing, None, recorded_close),
        ];
        let spans = reconstruct_spans(&ledger, Some(resolved), recorded_close).unwrap();

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].end, resolved);
        let total: i64 = spans.iter().map(OwnershipSpan::duration_seconds).sum();
        assert_eq!(total, (spans[1].end - spans[0].start).whole_seconds());
    }

    #[test]
    fn resolution_before_last_handoff_clamps_to_zero() {
        let t0 = datetime!(2024-03-01 12:00 UTC);
        let ledger = vec![
            row(1, HandoffKind::Opening, Some(10), t0),
            row(2, HandoffKind::Closing, None, t0 + Duration::hours(1)),
        ];
        let spans = reconstruct_spans(&ledger, Some(t0 - Duration::hours(2)), t0).unwrap();
        assert_eq!(spans[0].end, spans[0].start);
        assert_eq!(spans[0].duration_seconds(), 0);
    }

    #[test]
    fn rows_recorded_after_resolution_are_capped_at_it() {
        let t0 = datetime!(2024-03-01 00:00 UTC);
        let resolved = datetime!(2024-03-02 10:00 UTC);
        let recorded_close = datetime!(2024-03-05 00:00 UTC);
        let ledger = vec![
            row(1, HandoffKind::Opening, Some(10), t0),
            row(2, HandoffKind::Reassignment, Some(20), recorded_close),
            row(3, HandoffKind::Closing, None, recorded_close),
        ];
        let spans = reconstruct_spans(&ledger, Some(resolved), recorded_close).unwrap();

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].end, resolved);
        assert_eq!(spans[1].start, resolved);
        assert_eq!(spans[1].end, resolved);
        let total: i64 = spans.iter().map(OwnershipSpan::duration_seconds).sum();
        assert_eq!(total, (resolved - t0).whole_seconds());
    }

    #[test]
    fn rows_without_department_do_not_open_segments() {
        let t0 = datetime!(2024-03-01 12:00 UTC);
        let ledger = vec![row(1, HandoffKind::Opening, None, t0)];
        assert!(reconstruct_spans(&ledger, None, t0).unwrap().is_empty());
        assert!(reconstruct_spans(&[], None, t0).unwrap().is_empty());
    }
}
