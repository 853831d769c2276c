use time::OffsetDateTime;

use crate::domain::{Affectation, AFFECTATION_EQUIPMENT, AFFECTATION_NODE};
use crate::error::AppError;
use crate::normalize::timestamps::{parse_date_time, DateTimePair};

fn required(field: &str) -> AppError {
    AppError::validation("VALIDATION_REQUIRED_FIELD", format!("{field} is required")).with_field(field)
}

/// Trimmed value of a required text field; blank counts as missing.
pub fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(required(field));
    }
    Ok(trimmed.to_string())
}

/// Trimmed value of an optional text field; blank collapses to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

pub fn not_in_future(field: &str, at: &DateTimePair, now: OffsetDateTime) -> Result<(), AppError> {
    if at.instant() > now {
        return Err(
            AppError::validation("VALIDATION_DATETIME_IN_FUTURE", format!("{field} is in the future"))
                .with_field(field)
                .with_details(format!("value={}; now={now}", at.instant())),
        );
    }
    Ok(())
}

/// Parse a required date/time and reject instants after `now`.
pub fn past_date_time(
    field: &str,
    date: Option<&str>,
    time: Option<&str>,
    now: OffsetDateTime,
) -> Result<DateTimePair, AppError> {
    let Some(date) = date.map(str::trim).filter(|d| !d.is_empty()) else {
        return Err(required(field));
    };
    let pair = parse_date_time(field, date, time)?;
    not_in_future(field, &pair, now)?;
    Ok(pair)
}

pub fn affectation(value: &Affectation) -> Result<Affectation, AppError> {
    match value {
        Affectation::Node { node_id: None } => Err(AppError::validation(
            "VALIDATION_NODE_REQUIRED",
            "A node is required when the affectation is NODE",
        )
        .with_field("node_id")),
        Affectation::Other { label } => {
            let label = required_text("affectation", label)?;
            if [AFFECTATION_EQUIPMENT, AFFECTATION_NODE]
                .iter()
                .any(|reserved| label.eq_ignore_ascii_case(reserved))
            {
                return Err(AppError::validation(
                    "VALIDATION_AFFECTATION_RESERVED",
                    format!("{label} is an affectation kind, not a free-text label"),
                )
                .with_field("affectation"));
            }
            Ok(Affectation::Other { label })
        }
        other => Ok(other.clone()),
    }
}

pub fn resolution_after_opening(opened: &DateTimePair, resolved: &DateTimePair) -> Result<(), AppError> {
    if resolved.instant() < opened.instant() {
        return Err(AppError::validation(
            "VALIDATION_RESOLUTION_BEFORE_OPENING",
            "Resolution cannot be earlier than the occurrence",
        )
        .with_field("resolved_date")
        .with_details(format!(
            "opened_at={}; resolved_at={}",
            opened.instant(),
            resolved.instant()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeviceRef;
    use time::macros::datetime;

    #[test]
    fn blank_required_text_is_missing() {
        let err = required_text("description", "   ").expect_err("blank");
        assert_eq!(err.code, "VALIDATION_REQUIRED_FIELD");
        assert_eq!(err.field.as_deref(), Some("description"));
        assert_eq!(required_text("description", " No signal ").unwrap(), "No signal");
        assert_eq!(optional_text(Some("  ")), None);
    }

    #[test]
    fn future_occurrence_is_rejected() {
        let now = datetime!(2024-03-01 09:00 UTC);
        let err = past_date_time("opened_at", Some("2024-03-01"), Some("09:01"), now).expect_err("future");
        assert_eq!(err.code, "VALIDATION_DATETIME_IN_FUTURE");
        assert!(past_date_time("opened_at", Some("2024-03-01"), Some("09:00"), now).is_ok());

        let err = past_date_time("opened_at", None, Some("09:00"), now).expect_err("missing");
        assert_eq!(err.code, "VALIDATION_REQUIRED_FIELD");
    }

    #[test]
    fn node_affectation_needs_a_node() {
        let err = affectation(&Affectation::Node { node_id: None }).expect_err("node");
        assert_eq!(err.field.as_deref(), Some("node_id"));
        assert!(affectation(&Affectation::Node { node_id: Some(4) }).is_ok());
        assert!(affectation(&Affectation::Other { label: " ".into() }).is_err());
        assert!(affectation(&Affectation::Equipment {
            device: Some(DeviceRef::Camera(1))
        })
        .is_ok());
    }

    #[test]
    fn other_affectation_cannot_reuse_a_reserved_kind() {
        for label in ["EQUIPMENT", " node ", "Equipment"] {
            let err = affectation(&Affectation::Other { label: label.into() }).expect_err(label);
            assert_eq!(err.code, "VALIDATION_AFFECTATION_RESERVED");
            assert_eq!(err.field.as_deref(), Some("affectation"));
        }
        assert_eq!(
            affectation(&Affectation::Other { label: " ENLACE ".into() }).unwrap(),
            Affectation::Other { label: "ENLACE".into() }
        );
    }

    #[test]
    fn resolution_cannot_precede_opening() {
        let opened = parse_date_time("o", "2024-03-02", Some("10:00")).unwrap();
        let resolved = parse_date_time("r", "2024-03-02", Some("09:59")).unwrap();
        assert!(resolution_after_opening(&opened, &resolved).is_err());
        assert!(resolution_after_opening(&opened, &opened).is_ok());
    }
}
