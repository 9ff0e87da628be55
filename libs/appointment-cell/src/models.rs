// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use shared_config::AppConfig;

use crate::error::AppointmentError;

pub const APPOINTMENTS_COLLECTION: &str = "appointments";
pub const SLOTS_COLLECTION: &str = "slots";
pub const USERS_COLLECTION: &str = "users";

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Accepted,
    Rejected,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Accepted => "accepted",
            AppointmentStatus::Rejected => "rejected",
        }
    }

    /// Pending and accepted appointments occupy their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Accepted)
    }

    pub fn parse(raw: &str) -> Result<Self, AppointmentError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "accepted" => Ok(AppointmentStatus::Accepted),
            "rejected" => Ok(AppointmentStatus::Rejected),
            other => Err(AppointmentError::Validation(format!("Unknown appointment status: {}", other))),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(default)]
    pub id: String,
    pub doctor_id: String,
    pub patient_id: String,
    /// Snapshot of the doctor's display name at booking time. Later profile
    /// edits are not reflected here.
    pub doctor_name: String,
    /// Snapshot of the patient's display name at booking time.
    pub patient_name: String,
    pub appointment_type: String,
    pub preferred_date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub preferred_time: NaiveTime,
    #[serde(default)]
    pub notes: String,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub dismissed_by_admin: bool,
}

impl Appointment {
    pub fn slot(&self) -> SlotRef {
        SlotRef::new(&self.doctor_id, self.preferred_date, self.preferred_time)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.doctor_id == user_id || self.patient_id == user_id
    }
}

/// `HH:MM` on the wire; `HH:MM:SS` and `hh:mm AM` are accepted on input.
pub mod wall_clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_preferred_time(&raw).map_err(serde::de::Error::custom)
    }
}

pub fn parse_preferred_date(raw: &str) -> Result<NaiveDate, AppointmentError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppointmentError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

pub fn parse_preferred_time(raw: &str) -> Result<NaiveTime, AppointmentError> {
    let raw = raw.trim();
    ["%H:%M", "%H:%M:%S", "%I:%M %p"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| AppointmentError::Validation(format!("Invalid time '{}', expected HH:MM", raw)))
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Pending,
    Booked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Pending => "pending",
            SlotStatus::Booked => "booked",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AppointmentError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(SlotStatus::Available),
            "pending" => Ok(SlotStatus::Pending),
            "booked" => Ok(SlotStatus::Booked),
            other => Err(AppointmentError::Validation(format!("Invalid slot status: {}", other))),
        }
    }
}

/// One bookable doctor/date/time unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    pub doctor_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl SlotRef {
    pub fn new(doctor_id: &str, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            doctor_id: doctor_id.to_string(),
            date,
            time,
        }
    }

    pub fn parse(doctor_id: &str, date: &str, time: &str) -> Result<Self, AppointmentError> {
        if doctor_id.trim().is_empty() {
            return Err(AppointmentError::Validation("doctorId is required".to_string()));
        }
        Ok(Self::new(doctor_id, parse_preferred_date(date)?, parse_preferred_time(time)?))
    }

    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn time_string(&self) -> String {
        self.time.format("%H:%M").to_string()
    }

    /// `date_time` key inside the doctor's slot map, e.g. `2024-01-15_10:00`.
    pub fn slot_key(&self) -> String {
        format!("{}_{}", self.date_string(), self.time_string())
    }

    pub fn document_id(&self) -> String {
        format!("{}:{}", self.doctor_id, self.slot_key())
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.doctor_id, self.slot_key())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotDocument {
    pub doctor_id: String,
    pub slot_key: String,
    pub status: SlotStatus,
    #[serde(default)]
    pub reservation_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub reserved_at: Option<DateTime<Utc>>,
}

/// Proof of a won slot reservation, needed to attach or release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub slot: SlotRef,
    pub reservation_id: String,
}

// ==============================================================================
// ACTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionVariant {
    Finished,
    Pending,
    Declined,
    Join,
    Pay,
    None,
}

impl ActionVariant {
    pub fn label(&self) -> &'static str {
        match self {
            ActionVariant::Finished => "Finished",
            ActionVariant::Pending => "Pending",
            ActionVariant::Declined => "Declined",
            ActionVariant::Join => "Join Now",
            ActionVariant::Pay => "Pay Now",
            ActionVariant::None => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentAction {
    pub label: String,
    pub enabled: bool,
    pub variant: ActionVariant,
}

impl AppointmentAction {
    pub fn enabled(variant: ActionVariant) -> Self {
        Self {
            label: variant.label().to_string(),
            enabled: true,
            variant,
        }
    }

    pub fn disabled(variant: ActionVariant) -> Self {
        Self {
            label: variant.label().to_string(),
            enabled: false,
            variant,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LifecyclePolicy {
    pub duration_minutes: i64,
    /// Single shared deployment timezone in which preferred date/time are read.
    pub utc_offset: FixedOffset,
}

impl LifecyclePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        let utc_offset = FixedOffset::east_opt(config.deployment_utc_offset_minutes * 60)
            .unwrap_or_else(|| {
                tracing::warn!(
                    "Invalid deployment UTC offset {} minutes, falling back to UTC",
                    config.deployment_utc_offset_minutes
                );
                Utc.fix()
            });

        Self {
            duration_minutes: config.appointment_duration_minutes,
            utc_offset,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            duration_minutes: 30,
            utc_offset: Utc.fix(),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct NewAppointmentRequest {
    pub slot: SlotRef,
    pub doctor_name: String,
    pub appointment_type: String,
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentBody {
    pub doctor_id: String,
    pub doctor_name: String,
    pub appointment_type: String,
    pub preferred_date: String,
    pub preferred_time: String,
    #[serde(default)]
    pub notes: String,
}

impl BookAppointmentBody {
    pub fn into_request(self) -> Result<NewAppointmentRequest, AppointmentError> {
        Ok(NewAppointmentRequest {
            slot: SlotRef::parse(&self.doctor_id, &self.preferred_date, &self.preferred_time)?,
            doctor_name: self.doctor_name,
            appointment_type: self.appointment_type,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusBody {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatusBody {
    pub doctor_id: String,
    pub date: String,
    pub time: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotCheckQuery {
    pub doctor_id: String,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissAppointmentsBody {
    #[serde(default)]
    pub appointment_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub appointment: Appointment,
    pub action: AppointmentAction,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinTicket {
    pub appointment_id: String,
    pub room_id: String,
}
