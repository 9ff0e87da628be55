// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{debug, warn};

use shared_models::auth::UserRole;

use crate::error::AppointmentError;
use crate::models::{ActionVariant, Appointment, AppointmentAction, AppointmentStatus, LifecyclePolicy, SlotRef};

/// Pure lifecycle rules: allowed status moves, the scheduled window and the
/// action offered to each viewer. Nothing here touches the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentLifecycleService {
    policy: LifecyclePolicy,
}

impl AppointmentLifecycleService {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: current_status,
                to: new_status,
            });
        }

        debug!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current_status {
            AppointmentStatus::Pending => &[AppointmentStatus::Accepted, AppointmentStatus::Rejected],
            // Terminal states
            AppointmentStatus::Accepted | AppointmentStatus::Rejected => &[],
        }
    }

    /// Start instant of the appointment, reading its wall-clock date and time
    /// in the deployment timezone.
    pub fn scheduled_start(&self, appointment: &Appointment) -> DateTime<Utc> {
        self.slot_start(&appointment.slot())
    }

    /// Start instant of a slot in the deployment's timezone.
    pub fn slot_start(&self, slot: &SlotRef) -> DateTime<Utc> {
        let local = NaiveDateTime::new(slot.date, slot.time);
        let offset = Duration::seconds(i64::from(self.policy.utc_offset.local_minus_utc()));
        (local - offset).and_utc()
    }

    pub fn scheduled_end(&self, appointment: &Appointment) -> DateTime<Utc> {
        self.scheduled_start(appointment) + self.policy.duration()
    }

    /// True once `now` is strictly after the end of the appointment window.
    pub fn is_past(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool {
        now > self.scheduled_end(appointment)
    }

    /// Single action shown to `viewer` for this appointment. The past check
    /// takes precedence over every status and payment rule.
    pub fn compute_action(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
        viewer: UserRole,
    ) -> AppointmentAction {
        if self.is_past(appointment, now) {
            return AppointmentAction::disabled(ActionVariant::Finished);
        }

        match (appointment.status, viewer) {
            (AppointmentStatus::Pending, _) => AppointmentAction::disabled(ActionVariant::Pending),
            (AppointmentStatus::Rejected, _) => AppointmentAction::disabled(ActionVariant::Declined),
            (AppointmentStatus::Accepted, UserRole::Doctor) => AppointmentAction::enabled(ActionVariant::Join),
            (AppointmentStatus::Accepted, UserRole::Patient) if appointment.is_paid => {
                AppointmentAction::enabled(ActionVariant::Join)
            }
            (AppointmentStatus::Accepted, UserRole::Patient) => AppointmentAction::enabled(ActionVariant::Pay),
            (AppointmentStatus::Accepted, UserRole::Admin) => AppointmentAction::disabled(ActionVariant::None),
        }
    }
}
