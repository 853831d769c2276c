use time::format_description::well_known::Rfc3339;
use time::{format_description, Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::AppError;

const DATE_FMT: &str = "[year]-[month]-[day]";
const TIME_FMTS: [&str; 2] = ["[hour]:[minute]:[second]", "[hour]:[minute]"];
const COMBINED_FMTS: [&str; 4] = [
    "[year]-[month]-[day]T[hour]:[minute]:[second]",
    "[year]-[month]-[day]T[hour]:[minute]",
    "[year]-[month]-[day] [hour]:[minute]:[second]",
    "[year]-[month]-[day] [hour]:[minute]",
];
const TIME_OUT_FMT: &str = "[hour]:[minute]:[second]";
/// Fixed-width UTC instants, so stored values sort lexically in time order.
const INSTANT_FMT: &str = "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z";

/// Calendar date plus optional wall-clock time, the shape incidents record occurrence and
/// resolution in. A missing time means midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimePair {
    pub date: Date,
    pub time: Option<Time>,
}

impl DateTimePair {
    pub fn instant(&self) -> OffsetDateTime {
        PrimitiveDateTime::new(self.date, self.time.unwrap_or(Time::MIDNIGHT)).assume_utc()
    }

    pub fn date_string(&self) -> Result<String, AppError> {
        self.date.format(&items(DATE_FMT)?).map_err(format_failed)
    }

    pub fn time_string(&self) -> Result<Option<String>, AppError> {
        let Some(t) = self.time else { return Ok(None) };
        t.format(&items(TIME_OUT_FMT)?).map(Some).map_err(format_failed)
    }

    /// Decode the pair as persisted by this crate.
    pub fn from_stored(date: &str, time: Option<&str>) -> Result<Self, AppError> {
        parse_date_time("stored", date, time).map_err(|e| {
            AppError::store("DB_DECODE_FAILED", "Stored date/time is not canonical")
                .with_details(e.details.unwrap_or(e.message))
        })
    }
}

fn items(fmt: &str) -> Result<Vec<format_description::BorrowedFormatItem<'_>>, AppError> {
    format_description::parse(fmt).map_err(|e| {
        AppError::store("TS_FORMAT_CONFIG_FAILED", "Timestamp format config error")
            .with_details(format!("fmt={fmt}; err={e}"))
    })
}

fn format_failed(e: time::error::Format) -> AppError {
    AppError::store("TS_FORMAT_FAILED", "Failed to format timestamp").with_details(e.to_string())
}

fn invalid(field: &str, raw: &str) -> AppError {
    AppError::validation("VALIDATION_DATETIME_INVALID", format!("Unparseable date/time for {field}"))
        .with_field(field)
        .with_details(format!("value={raw}"))
}

fn parse_time(field: &str, raw: &str) -> Result<Time, AppError> {
    for fmt in TIME_FMTS {
        if let Ok(t) = Time::parse(raw, &items(fmt)?) {
            return Ok(t);
        }
    }
    Err(invalid(field, raw))
}

fn truncate_to_seconds(field: &str, t: Time) -> Result<Time, AppError> {
    Time::from_hms(t.hour(), t.minute(), t.second()).map_err(|e| {
        AppError::validation("VALIDATION_DATETIME_INVALID", format!("Invalid time for {field}"))
            .with_field(field)
            .with_details(e.to_string())
    })
}

fn parse_combined(field: &str, raw: &str) -> Result<DateTimePair, AppError> {
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        let utc = dt.to_offset(UtcOffset::UTC);
        return Ok(DateTimePair {
            date: utc.date(),
            time: Some(truncate_to_seconds(field, utc.time())?),
        });
    }
    for fmt in COMBINED_FMTS {
        if let Ok(pdt) = PrimitiveDateTime::parse(raw, &items(fmt)?) {
            return Ok(DateTimePair {
                date: pdt.date(),
                time: Some(pdt.time()),
            });
        }
    }
    Err(invalid(field, raw))
}

/// Normalize a user-supplied occurrence/resolution moment into a canonical date+time pair.
///
/// Accepts a plain date with an optional separate time, or a single combined timestamp
/// (ISO local or RFC3339, the latter converted to UTC). A combined timestamp together with a
/// separate time is rejected as ambiguous.
pub fn parse_date_time(field: &str, date: &str, time: Option<&str>) -> Result<DateTimePair, AppError> {
    let date = date.trim();
    if date.is_empty() {
        return Err(
            AppError::validation("VALIDATION_REQUIRED_FIELD", format!("{field} is required"))
                .with_field(field),
        );
    }
    let time = time.map(str::trim).filter(|t| !t.is_empty());

    if let Ok(d) = Date::parse(date, &items(DATE_FMT)?) {
        let time = time.map(|t| parse_time(field, t)).transpose()?;
        return Ok(DateTimePair { date: d, time });
    }

    if time.is_some() {
        return Err(AppError::validation(
            "VALIDATION_DATETIME_AMBIGUOUS",
            format!("{field} carries a time and a separate time was also supplied"),
        )
        .with_field(field)
        .with_details(format!("value={date}")));
    }
    parse_combined(field, date)
}

pub fn format_instant(dt: OffsetDateTime) -> Result<String, AppError> {
    dt.to_offset(UtcOffset::UTC)
        .format(&items(INSTANT_FMT)?)
        .map_err(format_failed)
}

pub fn parse_instant(raw: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| {
        AppError::store("DB_DECODE_FAILED", "Stored instant is not RFC3339")
            .with_details(format!("value={raw}; err={e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(date: &str, time: Option<&str>) -> DateTimePair {
        parse_date_time("opened_at", date, time).expect("parse")
    }

    #[test]
    fn date_only_keeps_time_unset() {
        let p = pair("2024-03-01", None);
        assert_eq!(p.time, None);
        assert_eq!(p.date_string().unwrap(), "2024-03-01");
        assert_eq!(p.instant().hour(), 0);
    }

    #[test]
    fn separate_and_combined_forms_normalize_identically() {
        let separate = pair("2024-03-01", Some("08:30"));
        let combined = pair("2024-03-01T08:30", None);
        let spaced = pair("2024-03-01 08:30:00", None);
        let rfc = pair("2024-03-01T03:30:00-05:00", None);
        assert_eq!(separate, combined);
        assert_eq!(separate, spaced);
        assert_eq!(separate, rfc);
        assert_eq!(separate.time_string().unwrap().as_deref(), Some("08:30:00"));
    }

    #[test]
    fn combined_with_separate_time_is_ambiguous() {
        let err = parse_date_time("opened_at", "2024-03-01T08:30", Some("09:00")).expect_err("ambiguous");
        assert_eq!(err.code, "VALIDATION_DATETIME_AMBIGUOUS");
    }

    #[test]
    fn garbage_and_blank_are_rejected_with_field() {
        let err = parse_date_time("opened_at", "yesterday", None).expect_err("invalid");
        assert_eq!(err.code, "VALIDATION_DATETIME_INVALID");
        assert_eq!(err.field.as_deref(), Some("opened_at"));

        let err = parse_date_time("opened_at", "  ", None).expect_err("blank");
        assert_eq!(err.code, "VALIDATION_REQUIRED_FIELD");
    }

    #[test]
    fn instants_are_fixed_width_and_round_trip() {
        let dt = pair("2024-03-01", Some("08:30:05")).instant();
        let s = format_instant(dt).unwrap();
        assert_eq!(s, "2024-03-01T08:30:05.000000Z");
        assert_eq!(parse_instant(&s).unwrap(), dt);
    }
}
