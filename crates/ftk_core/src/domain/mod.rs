use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Device an EQUIPMENT incident points at. At most one device is ever recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "device", content = "id", rename_all = "snake_case")]
pub enum DeviceRef {
    Camera(i64),
    Encoder(i64),
    IpSpeaker(i64),
    AlarmInput(i64),
}

/// What the incident affects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Affectation {
    Equipment { device: Option<DeviceRef> },
    Node { node_id: Option<i64> },
    Other { label: String },
}

pub const AFFECTATION_EQUIPMENT: &str = "EQUIPMENT";
pub const AFFECTATION_NODE: &str = "NODE";

/// Flat column projection of [`Affectation`] as stored on `incidents`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffectationColumns {
    pub kind: String,
    pub detail: Option<String>,
    pub camera_id: Option<i64>,
    pub encoder_id: Option<i64>,
    pub ip_speaker_id: Option<i64>,
    pub alarm_input_id: Option<i64>,
    pub node_id: Option<i64>,
}

impl Affectation {
    pub fn kind_label(&self) -> &str {
        match self {
            Affectation::Equipment { .. } => AFFECTATION_EQUIPMENT,
            Affectation::Node { .. } => AFFECTATION_NODE,
            Affectation::Other { label } => label.as_str(),
        }
    }

    pub fn to_columns(&self) -> AffectationColumns {
        let mut cols = AffectationColumns {
            kind: self.kind_label().to_string(),
            ..AffectationColumns::default()
        };
        match self {
            Affectation::Equipment { device } => match device {
                Some(DeviceRef::Camera(id)) => cols.camera_id = Some(*id),
                Some(DeviceRef::Encoder(id)) => cols.encoder_id = Some(*id),
                Some(DeviceRef::IpSpeaker(id)) => cols.ip_speaker_id = Some(*id),
                Some(DeviceRef::AlarmInput(id)) => cols.alarm_input_id = Some(*id),
                None => {}
            },
            Affectation::Node { node_id } => cols.node_id = *node_id,
            Affectation::Other { label } => cols.detail = Some(label.clone()),
        }
        cols
    }

    pub fn from_columns(cols: AffectationColumns) -> Result<Self, AppError> {
        match cols.kind.as_str() {
            AFFECTATION_EQUIPMENT => {
                let devices = [
                    cols.camera_id.map(DeviceRef::Camera),
                    cols.encoder_id.map(DeviceRef::Encoder),
                    cols.ip_speaker_id.map(DeviceRef::IpSpeaker),
                    cols.alarm_input_id.map(DeviceRef::AlarmInput),
                ];
                let mut present = devices.into_iter().flatten();
                let device = present.next();
                if present.next().is_some() {
                    return Err(AppError::store(
                        "DB_DECODE_FAILED",
                        "Incident references more than one device",
                    ));
                }
                Ok(Affectation::Equipment { device })
            }
            AFFECTATION_NODE => Ok(Affectation::Node {
                node_id: cols.node_id,
            }),
            _ => Ok(Affectation::Other {
                label: cols.detail.unwrap_or(cols.kind),
            }),
        }
    }
}

/// Persisted incident row. Occurrence and resolution are canonical `YYYY-MM-DD` / `HH:MM:SS`
/// strings; `resolved_date` being set is what makes an incident closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    pub id: i64,
    pub opened_date: String,
    pub opened_time: Option<String>,
    pub equipment_affected: String,
    pub description: String,
    pub affectation: Affectation,
    pub responsible_user_id: i64,
    pub department_id: Option<i64>,
    pub problem_type_id: Option<i64>,
    pub console_id: Option<i64>,
    pub site_id: Option<i64>,
    pub resolved_date: Option<String>,
    pub resolved_time: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Incident {
    pub fn is_closed(&self) -> bool {
        self.resolved_date.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffKind {
    Opening,
    Reassignment,
    Note,
    Closing,
}

impl HandoffKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HandoffKind::Opening => "opening",
            HandoffKind::Reassignment => "reassignment",
            HandoffKind::Note => "note",
            HandoffKind::Closing => "closing",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "opening" => Ok(HandoffKind::Opening),
            "reassignment" => Ok(HandoffKind::Reassignment),
            "note" => Ok(HandoffKind::Note),
            "closing" => Ok(HandoffKind::Closing),
            other => Err(AppError::store("DB_DECODE_FAILED", "Unknown handoff kind")
                .with_details(format!("kind={other}"))),
        }
    }
}

/// One ledger entry. Department-bearing rows record ownership changes; the rest carry
/// verification and novelty information only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandoffRecord {
    pub id: i64,
    pub incident_id: i64,
    pub kind: HandoffKind,
    pub department_id: Option<i64>,
    pub novelty_note: Option<String>,
    pub opening_verifier_id: Option<i64>,
    pub closing_verifier_id: Option<i64>,
    pub last_editor_id: Option<i64>,
    pub closing_responsible_id: Option<i64>,
    pub supervising_user_id: Option<i64>,
    pub created_at: String,
}
