// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DocumentStore, Filter, Subscription};
use shared_models::auth::{Identity, User, UserRole};

use crate::error::AppointmentError;
use crate::models::{
    ActionVariant, Appointment, AppointmentStatus, AppointmentView, JoinTicket, LifecyclePolicy,
    NewAppointmentRequest, APPOINTMENTS_COLLECTION,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notification::{NotificationDispatcher, Notifier};
use crate::services::slots::SlotReservationService;

/// Appointment lifecycle operations against the document store.
pub struct AppointmentService {
    store: Arc<dyn DocumentStore>,
    lifecycle: AppointmentLifecycleService,
    slots: SlotReservationService,
    notifications: NotificationDispatcher,
}

impl AppointmentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        policy: LifecyclePolicy,
        reservation_lease: Duration,
    ) -> Self {
        Self {
            lifecycle: AppointmentLifecycleService::new(policy),
            slots: SlotReservationService::new(Arc::clone(&store), reservation_lease),
            notifications: NotificationDispatcher::new(notifier, Arc::clone(&store)),
            store,
        }
    }

    pub fn from_config(config: &AppConfig, store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            store,
            notifier,
            LifecyclePolicy::from_config(config),
            Duration::seconds(config.slot_reservation_lease_seconds),
        )
    }

    pub fn lifecycle(&self) -> &AppointmentLifecycleService {
        &self.lifecycle
    }

    pub fn slots(&self) -> &SlotReservationService {
        &self.slots
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    /// Books a slot for the calling patient. The appointment starts `pending`
    /// and unpaid.
    #[instrument(skip(self, caller, request), fields(slot = %request.slot))]
    pub async fn create_appointment(
        &self,
        caller: Option<&Identity>,
        request: NewAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let caller = caller.ok_or(AppointmentError::AuthenticationRequired)?;
        let now = Utc::now();
        self.validate_booking_request(caller, &request, now)?;

        let slot = request.slot.clone();
        if self.slots.is_slot_taken(&slot).await? {
            info!("Slot {} already has an active appointment", slot);
            return Err(AppointmentError::duplicate(&slot.doctor_id, &slot.slot_key()));
        }

        let reservation = self.slots.reserve(&slot, now).await?;

        let mut appointment = Appointment {
            id: String::new(),
            doctor_id: slot.doctor_id.clone(),
            patient_id: caller.id.clone(),
            doctor_name: request.doctor_name.trim().to_string(),
            patient_name: caller
                .display_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "Patient".to_string()),
            appointment_type: request.appointment_type.trim().to_string(),
            preferred_date: slot.date,
            preferred_time: slot.time,
            notes: request.notes,
            status: AppointmentStatus::Pending,
            is_paid: false,
            created_at: now,
            room_id: None,
            dismissed_by_admin: false,
        };

        let document = serde_json::to_value(&appointment)?;
        appointment.id = match self.store.create(APPOINTMENTS_COLLECTION, document).await {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to store appointment for slot {}: {}", slot, e);
                if let Err(release_err) = self.slots.release(&reservation).await {
                    error!("Failed to release reservation on slot {}: {}", slot, release_err);
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self.slots.attach(&reservation, &appointment.id).await {
            warn!("Could not link slot {} to appointment {}: {}", slot, appointment.id, e);
        }

        info!("Appointment {} booked for slot {}", appointment.id, slot);

        let message = format!(
            "New appointment request from {} for {} at {}.",
            appointment.patient_name,
            slot.date_string(),
            slot.time_string()
        );
        self.notifications.notify_user(&appointment.doctor_id, &message).await;

        Ok(appointment)
    }

    fn validate_booking_request(
        &self,
        caller: &Identity,
        request: &NewAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if request.slot.doctor_id.trim().is_empty() {
            return Err(AppointmentError::Validation("doctorId is required".to_string()));
        }
        if request.appointment_type.trim().is_empty() {
            return Err(AppointmentError::Validation("appointmentType is required".to_string()));
        }
        if request.slot.doctor_id == caller.id {
            return Err(AppointmentError::Validation(
                "Doctors cannot book appointments with themselves".to_string(),
            ));
        }
        if self.lifecycle.slot_start(&request.slot) <= now {
            return Err(AppointmentError::Validation(format!(
                "Slot {} has already started",
                request.slot.slot_key()
            )));
        }
        Ok(())
    }

    // ==============================================================================
    // STATUS AND PAYMENT
    // ==============================================================================

    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        appointment_id: &str,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get(appointment_id).await?;
        self.lifecycle.validate_status_transition(appointment.status, new_status)?;

        let expected = json!(appointment.status.as_str());
        let applied = self
            .store
            .compare_and_set(
                APPOINTMENTS_COLLECTION,
                appointment_id,
                "status",
                Some(&expected),
                json!({ "status": new_status.as_str() }),
            )
            .await?;

        if !applied {
            let current = self.get(appointment_id).await?;
            warn!(
                "Status of appointment {} changed concurrently to {}",
                appointment_id, current.status
            );
            return Err(AppointmentError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        appointment.status = new_status;
        info!("Appointment {} is now {}", appointment_id, new_status);

        let outcome = match new_status {
            AppointmentStatus::Accepted => "accepted",
            _ => "declined",
        };
        let message = format!(
            "Your appointment with {} on {} at {} was {}.",
            appointment.doctor_name,
            appointment.preferred_date.format("%Y-%m-%d"),
            appointment.preferred_time.format("%H:%M"),
            outcome
        );
        self.notifications.notify_user(&appointment.patient_id, &message).await;

        Ok(appointment)
    }

    /// Records a confirmed payment. Safe to call repeatedly.
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        let appointment = self.get(appointment_id).await?;
        if appointment.is_paid {
            debug!("Appointment {} already paid", appointment_id);
            return Ok(appointment);
        }

        let applied = self
            .store
            .compare_and_set(
                APPOINTMENTS_COLLECTION,
                appointment_id,
                "isPaid",
                Some(&Value::Bool(false)),
                json!({ "isPaid": true }),
            )
            .await?;

        if !applied {
            // Either a concurrent payer won or the flag was never written
            let current = self.get(appointment_id).await?;
            if !current.is_paid {
                self.store
                    .update(APPOINTMENTS_COLLECTION, appointment_id, json!({ "isPaid": true }))
                    .await?;
            }
        }

        let confirmed = self.get(appointment_id).await?;
        if !confirmed.is_paid {
            error!("Payment flag for appointment {} did not persist", appointment_id);
            return Err(AppointmentError::PaymentConsistency(appointment_id.to_string()));
        }

        info!("Appointment {} marked paid", appointment_id);
        Ok(confirmed)
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get(&self, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        let document = self
            .store
            .get(APPOINTMENTS_COLLECTION, appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(appointment_id.to_string()))?;

        Ok(serde_json::from_value(document)?)
    }

    /// Appointments where the user is the doctor (doctors) or the patient
    /// (everyone else). Admins see every appointment.
    pub async fn list_for_user(&self, user_id: &str, role: UserRole) -> Result<Vec<Appointment>, AppointmentError> {
        let filter = match role {
            UserRole::Doctor => Filter::new().eq("doctorId", user_id),
            UserRole::Patient => Filter::new().eq("patientId", user_id),
            UserRole::Admin => Filter::new(),
        };

        let mut appointments = parse_appointments(self.store.query(APPOINTMENTS_COLLECTION, &filter).await?);
        appointments.sort_by(|a, b| {
            (a.preferred_date, a.preferred_time).cmp(&(b.preferred_date, b.preferred_time))
        });
        Ok(appointments)
    }

    /// Appointment together with the action currently offered to `viewer`.
    pub fn view_for(&self, appointment: Appointment, viewer: &User) -> AppointmentView {
        let action = self
            .lifecycle
            .compute_action(&appointment, Utc::now(), viewer_role(&appointment, viewer));
        AppointmentView { appointment, action }
    }

    // ==============================================================================
    // CALLS
    // ==============================================================================

    /// Admits a participant to the video call. The first admitted joiner
    /// assigns the room id; later joiners reuse it.
    #[instrument(skip(self, viewer), fields(viewer = %viewer.id))]
    pub async fn join_call(&self, appointment_id: &str, viewer: &User) -> Result<JoinTicket, AppointmentError> {
        let appointment = self.get(appointment_id).await?;

        if !appointment.is_participant(&viewer.id) {
            return Err(AppointmentError::Forbidden(
                "Only the doctor and patient of an appointment can join its call".to_string(),
            ));
        }

        let action = self
            .lifecycle
            .compute_action(&appointment, Utc::now(), viewer_role(&appointment, viewer));
        if action.variant != ActionVariant::Join || !action.enabled {
            debug!("Join refused for appointment {}: action is {:?}", appointment_id, action.variant);
            let reason = match action.variant {
                ActionVariant::Pay => "payment is required before joining".to_string(),
                _ => format!("appointment is {}", action.label.to_lowercase()),
            };
            return Err(AppointmentError::CallNotAvailable(reason));
        }

        if let Some(room_id) = appointment.room_id {
            return Ok(JoinTicket {
                appointment_id: appointment.id,
                room_id,
            });
        }

        let room_id = format!("room-{}", Uuid::new_v4().simple());
        let assigned = self
            .store
            .compare_and_set(
                APPOINTMENTS_COLLECTION,
                appointment_id,
                "roomId",
                None,
                json!({ "roomId": room_id }),
            )
            .await?;

        let room_id = if assigned {
            info!("Assigned room {} to appointment {}", room_id, appointment_id);
            room_id
        } else {
            self.get(appointment_id).await?.room_id.ok_or_else(|| {
                AppointmentError::CallNotAvailable("room assignment did not complete, please retry".to_string())
            })?
        };

        Ok(JoinTicket {
            appointment_id: appointment.id,
            room_id,
        })
    }

    // ==============================================================================
    // DOCTOR AND ADMIN FEEDS
    // ==============================================================================

    /// Live feed of a doctor's pending requests. Dropping the feed ends it.
    pub fn subscribe_pending_requests(&self, doctor_id: &str) -> PendingRequestFeed {
        let filter = Filter::new()
            .eq("doctorId", doctor_id)
            .eq("status", AppointmentStatus::Pending.as_str());

        PendingRequestFeed {
            subscription: self.store.subscribe(APPOINTMENTS_COLLECTION, filter),
        }
    }

    /// Flags appointments as dismissed from admin views. Every id must exist;
    /// nothing is written otherwise.
    #[instrument(skip(self, appointment_ids), fields(count = appointment_ids.len()))]
    pub async fn dismiss_by_admin(&self, appointment_ids: &[String]) -> Result<usize, AppointmentError> {
        for appointment_id in appointment_ids {
            if self.store.get(APPOINTMENTS_COLLECTION, appointment_id).await?.is_none() {
                return Err(AppointmentError::NotFound(appointment_id.clone()));
            }
        }

        for appointment_id in appointment_ids {
            self.store
                .update(APPOINTMENTS_COLLECTION, appointment_id, json!({ "dismissedByAdmin": true }))
                .await?;
        }

        info!("Dismissed {} appointments", appointment_ids.len());
        Ok(appointment_ids.len())
    }
}

pub struct PendingRequestFeed {
    subscription: Subscription,
}

impl PendingRequestFeed {
    /// Next snapshot of pending requests; `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Vec<Appointment>> {
        let documents = self.subscription.next().await?;
        Some(parse_appointments(documents))
    }
}

/// Role the viewer plays in this appointment. Admins keep their role; anyone
/// else is judged by whether they are its doctor.
fn viewer_role(appointment: &Appointment, viewer: &User) -> UserRole {
    if viewer.is_admin() {
        UserRole::Admin
    } else if viewer.id == appointment.doctor_id {
        UserRole::Doctor
    } else {
        UserRole::Patient
    }
}

fn parse_appointments(documents: Vec<Value>) -> Vec<Appointment> {
    documents
        .into_iter()
        .filter_map(|document| match serde_json::from_value::<Appointment>(document) {
            Ok(appointment) => Some(appointment),
            Err(e) => {
                warn!("Skipping unreadable appointment document: {}", e);
                None
            }
        })
        .collect()
}
