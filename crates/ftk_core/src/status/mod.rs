use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::Incident;
use crate::error::AppError;
use crate::normalize::timestamps::DateTimePair;

/// Open/closed state, always derived from `resolved_date`; never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IncidentStatus {
    Open { pending_days: i64 },
    Closed,
}

impl IncidentStatus {
    pub fn is_closed(self) -> bool {
        matches!(self, IncidentStatus::Closed)
    }

    pub fn display_text(self) -> String {
        match self {
            IncidentStatus::Closed => "RESUELTO".to_string(),
            IncidentStatus::Open { pending_days: 1 } => "1 día pendiente".to_string(),
            IncidentStatus::Open { pending_days } => format!("{pending_days} días pendiente"),
        }
    }
}

pub fn derive_status(
    opened: &DateTimePair,
    resolved: Option<&DateTimePair>,
    now: OffsetDateTime,
) -> IncidentStatus {
    if resolved.is_some() {
        return IncidentStatus::Closed;
    }
    let pending_days = (now - opened.instant()).whole_days().max(0);
    IncidentStatus::Open { pending_days }
}

pub fn opened_at(incident: &Incident) -> Result<DateTimePair, AppError> {
    DateTimePair::from_stored(&incident.opened_date, incident.opened_time.as_deref())
}

pub fn resolved_at(incident: &Incident) -> Result<Option<DateTimePair>, AppError> {
    incident
        .resolved_date
        .as_deref()
        .map(|d| DateTimePair::from_stored(d, incident.resolved_time.as_deref()))
        .transpose()
}

pub fn status_of(incident: &Incident, now: OffsetDateTime) -> Result<IncidentStatus, AppError> {
    let opened = opened_at(incident)?;
    let resolved = resolved_at(incident)?;
    Ok(derive_status(&opened, resolved.as_ref(), now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::timestamps::parse_date_time;
    use time::Duration;

    fn at(date: &str, time: Option<&str>) -> DateTimePair {
        parse_date_time("t", date, time).unwrap()
    }

    #[test]
    fn pending_days_floor_and_clamp() {
        let opened = at("2024-03-01", Some("10:00"));
        let now = opened.instant() + Duration::hours(47);
        assert_eq!(derive_status(&opened, None, now), IncidentStatus::Open { pending_days: 1 });

        let earlier = opened.instant() - Duration::hours(5);
        assert_eq!(derive_status(&opened, None, earlier), IncidentStatus::Open { pending_days: 0 });
    }

    #[test]
    fn resolution_closes_regardless_of_clock() {
        let opened = at("2024-03-01", None);
        let resolved = at("2024-03-02", Some("10:00"));
        let status = derive_status(&opened, Some(&resolved), opened.instant());
        assert!(status.is_closed());
        assert_eq!(status.display_text(), "RESUELTO");
    }

    #[test]
    fn display_text_pluralizes() {
        assert_eq!(IncidentStatus::Open { pending_days: 1 }.display_text(), "1 día pendiente");
        assert_eq!(IncidentStatus::Open { pending_days: 0 }.display_text(), "0 días pendiente");
        assert_eq!(IncidentStatus::Open { pending_days: 12 }.display_text(), "12 días pendiente");
    }
}
