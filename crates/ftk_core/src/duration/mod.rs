use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::normalize::timestamps::DateTimePair;
use crate::repo::get_incident;
use crate::status::{opened_at, resolved_at};

const MILLIS_PER_MINUTE: i64 = 60_000;
const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;

/// Open-to-close elapsed time, floored to whole minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElapsedDuration {
    pub text: String,
    pub total_minutes: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

fn unit(value: i64, singular: &str, plural: &str) -> String {
    if value == 1 {
        format!("{value} {singular}")
    } else {
        format!("{value} {plural}")
    }
}

/// Break a millisecond span into days/hours/minutes. Negative spans count as zero.
/// Days and hours are shown only when non-zero; minutes always are.
pub fn format_elapsed(millis: i64) -> ElapsedDuration {
    let total_minutes = millis.max(0) / MILLIS_PER_MINUTE;
    let days = total_minutes / MINUTES_PER_DAY;
    let hours = (total_minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
    let minutes = total_minutes % MINUTES_PER_HOUR;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(unit(days, "día", "días"));
    }
    if hours > 0 {
        parts.push(unit(hours, "hora", "horas"));
    }
    parts.push(unit(minutes, "minuto", "minutos"));

    ElapsedDuration {
        text: parts.join(" "),
        total_minutes,
        days,
        hours,
        minutes,
    }
}

pub fn resolution_duration(
    opened: &DateTimePair,
    resolved: Option<&DateTimePair>,
) -> Result<ElapsedDuration, AppError> {
    let Some(resolved) = resolved else {
        return Err(AppError::conflict(
            "INCIDENT_NOT_RESOLVED",
            "Duration is not available until the incident is resolved",
        ));
    };
    let span = resolved.instant() - opened.instant();
    let millis = i64::try_from(span.whole_milliseconds()).unwrap_or(i64::MAX);
    Ok(format_elapsed(millis))
}

pub fn incident_duration(conn: &Connection, incident_id: i64) -> Result<ElapsedDuration, AppError> {
    let incident = get_incident(conn, incident_id)?;
    let opened = opened_at(&incident)?;
    let resolved = resolved_at(&incident)?;
    resolution_duration(&opened, resolved.as_ref())
        .map_err(|e| e.with_details(format!("incident_id={incident_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::timestamps::parse_date_time;

    fn at(date: &str, time: Option<&str>) -> DateTimePair {
        parse_date_time("t", date, time).unwrap()
    }

    #[test]
    fn twenty_five_hours_floor_to_whole_minutes() {
        let exact = format_elapsed(25 * 60 * MILLIS_PER_MINUTE);
        let almost = format_elapsed(25 * 60 * MILLIS_PER_MINUTE + 59_999);
        assert_eq!(exact.total_minutes, 1500);
        assert_eq!(almost.total_minutes, 1500);
        assert_eq!(exact.text, "1 día 1 hora 0 minutos");
        assert_eq!(exact, almost);
    }

    #[test]
    fn zero_and_negative_spans_show_minutes_only() {
        assert_eq!(format_elapsed(0).text, "0 minutos");
        assert_eq!(format_elapsed(-5_000).total_minutes, 0);
        assert_eq!(format_elapsed(61 * MILLIS_PER_MINUTE).text, "1 hora 1 minuto");
        assert_eq!(format_elapsed(2 * MINUTES_PER_DAY * MILLIS_PER_MINUTE).text, "2 días 0 minutos");
    }

    #[test]
    fn missing_time_means_midnight() {
        let d = resolution_duration(&at("2024-03-01", None), Some(&at("2024-03-02", Some("10:00"))))
            .unwrap();
        assert_eq!(d.text, "1 día 10 horas 0 minutos");
        assert_eq!(d.total_minutes, 34 * 60);
    }

    #[test]
    fn open_incidents_have_no_duration() {
        let err = resolution_duration(&at("2024-03-01", None), None).expect_err("open");
        assert_eq!(err.code, "INCIDENT_NOT_RESOLVED");
    }
}
