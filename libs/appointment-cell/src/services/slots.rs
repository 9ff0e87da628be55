// libs/appointment-cell/src/services/slots.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_database::{DocumentStore, Filter};

use crate::error::AppointmentError;
use crate::models::{
    Appointment, AppointmentStatus, Reservation, SlotDocument, SlotRef, SlotStatus,
    APPOINTMENTS_COLLECTION, SLOTS_COLLECTION,
};

/// Per-doctor slot map plus the reservation protocol that makes booking a
/// slot exclusive.
///
/// A slot document that does not exist reads as available. Reserving a slot
/// swaps its `reservationId` with compare-and-set, so only one booker can hold
/// it at a time.
#[derive(Clone)]
pub struct SlotReservationService {
    store: Arc<dyn DocumentStore>,
    lease: Duration,
}

impl SlotReservationService {
    pub fn new(store: Arc<dyn DocumentStore>, lease: Duration) -> Self {
        Self { store, lease }
    }

    pub async fn mark_pending(&self, slot: &SlotRef) -> Result<(), AppointmentError> {
        self.set_status(slot, SlotStatus::Pending).await
    }

    pub async fn mark_booked(&self, slot: &SlotRef) -> Result<(), AppointmentError> {
        self.set_status(slot, SlotStatus::Booked).await
    }

    pub async fn mark_available(&self, slot: &SlotRef) -> Result<(), AppointmentError> {
        self.set_status(slot, SlotStatus::Available).await
    }

    /// Idempotent write of a slot's status. Marking a slot available also
    /// drops any reservation held on it.
    #[instrument(skip(self), fields(slot = %slot))]
    pub async fn set_status(&self, slot: &SlotRef, status: SlotStatus) -> Result<(), AppointmentError> {
        let mut fields = json!({
            "doctorId": slot.doctor_id,
            "slotKey": slot.slot_key(),
            "status": status.as_str(),
        });

        if status == SlotStatus::Available {
            fields["reservationId"] = Value::Null;
            fields["appointmentId"] = Value::Null;
            fields["reservedAt"] = Value::Null;
        }

        let id = slot.document_id();
        let created = self
            .store
            .create_if_absent(SLOTS_COLLECTION, &id, fields.clone())
            .await?;

        if !created {
            self.store.update(SLOTS_COLLECTION, &id, fields).await?;
        }

        debug!("Slot {} marked {}", slot, status.as_str());
        Ok(())
    }

    pub async fn get_slot(&self, slot: &SlotRef) -> Result<Option<SlotDocument>, AppointmentError> {
        self.store
            .get(SLOTS_COLLECTION, &slot.document_id())
            .await?
            .map(serde_json::from_value::<SlotDocument>)
            .transpose()
            .map_err(AppointmentError::from)
    }

    /// Slot map of a doctor keyed by `date_time`. Slots never written are
    /// absent and count as available.
    pub async fn slot_map(&self, doctor_id: &str) -> Result<BTreeMap<String, SlotStatus>, AppointmentError> {
        let filter = Filter::new().eq("doctorId", doctor_id);
        let documents = self.store.query(SLOTS_COLLECTION, &filter).await?;

        let mut slots = BTreeMap::new();
        for document in documents {
            let slot: SlotDocument = serde_json::from_value(document)?;
            slots.insert(slot.slot_key, slot.status);
        }
        Ok(slots)
    }

    /// True when a non-rejected appointment already exists for the slot.
    pub async fn is_slot_taken(&self, slot: &SlotRef) -> Result<bool, AppointmentError> {
        let filter = Filter::new()
            .eq("doctorId", slot.doctor_id.as_str())
            .eq("preferredDate", slot.date_string())
            .eq("preferredTime", slot.time_string())
            .neq("status", AppointmentStatus::Rejected.as_str());

        let taken = !self.store.query(APPOINTMENTS_COLLECTION, &filter).await?.is_empty();
        debug!("Slot {} taken: {}", slot, taken);
        Ok(taken)
    }

    /// Claims the slot for a new booking. Fails with `DuplicateBooking` when
    /// the slot is held or another booker wins the race.
    #[instrument(skip(self), fields(slot = %slot))]
    pub async fn reserve(&self, slot: &SlotRef, now: DateTime<Utc>) -> Result<Reservation, AppointmentError> {
        let current = self.get_slot(slot).await?;

        if let Some(document) = &current {
            if !self.is_claimable(document, now).await? {
                info!("Slot {} is held, refusing reservation", slot);
                return Err(AppointmentError::duplicate(&slot.doctor_id, &slot.slot_key()));
            }
        }

        let reservation_id = Uuid::new_v4().to_string();

        let fields = json!({
            "doctorId": slot.doctor_id,
            "slotKey": slot.slot_key(),
            "status": SlotStatus::Pending.as_str(),
            "reservationId": reservation_id,
            "appointmentId": Value::Null,
            "reservedAt": now,
        });

        let id = slot.document_id();
        let won = match current {
            None => self.store.create_if_absent(SLOTS_COLLECTION, &id, fields).await?,
            Some(document) => {
                let observed = document.reservation_id.map(Value::String);
                self.store
                    .compare_and_set(SLOTS_COLLECTION, &id, "reservationId", observed.as_ref(), fields)
                    .await?
            }
        };

        if !won {
            warn!("Lost reservation race for slot {}", slot);
            return Err(AppointmentError::duplicate(&slot.doctor_id, &slot.slot_key()));
        }

        debug!("Reserved slot {} ({})", slot, reservation_id);
        Ok(Reservation {
            slot: slot.clone(),
            reservation_id,
        })
    }

    /// Records the appointment that now owns the reservation.
    pub async fn attach(&self, reservation: &Reservation, appointment_id: &str) -> Result<(), AppointmentError> {
        let token = json!(reservation.reservation_id);
        let attached = self
            .store
            .compare_and_set(
                SLOTS_COLLECTION,
                &reservation.slot.document_id(),
                "reservationId",
                Some(&token),
                json!({ "appointmentId": appointment_id }),
            )
            .await?;

        if !attached {
            warn!(
                "Reservation {} on slot {} was taken over before appointment {} attached",
                reservation.reservation_id, reservation.slot, appointment_id
            );
        }
        Ok(())
    }

    /// Gives a reservation back, leaving the slot available. A no-op if the
    /// reservation is no longer ours.
    pub async fn release(&self, reservation: &Reservation) -> Result<(), AppointmentError> {
        let token = json!(reservation.reservation_id);
        let released = self
            .store
            .compare_and_set(
                SLOTS_COLLECTION,
                &reservation.slot.document_id(),
                "reservationId",
                Some(&token),
                json!({
                    "status": SlotStatus::Available.as_str(),
                    "reservationId": Value::Null,
                    "appointmentId": Value::Null,
                    "reservedAt": Value::Null,
                }),
            )
            .await?;

        if released {
            info!("Released reservation on slot {}", reservation.slot);
        }
        Ok(())
    }

    async fn is_claimable(&self, slot: &SlotDocument, now: DateTime<Utc>) -> Result<bool, AppointmentError> {
        if slot.status == SlotStatus::Available {
            return Ok(true);
        }

        if let Some(appointment_id) = &slot.appointment_id {
            return Ok(!self.appointment_is_active(appointment_id).await?);
        }

        match (&slot.reservation_id, slot.reserved_at) {
            // In-flight booking; reclaimable only once its lease ran out
            (Some(_), Some(reserved_at)) => Ok(now - reserved_at > self.lease),
            (Some(_), None) => Ok(true),
            // Marked by hand: booked blocks, pending is informational
            (None, _) => Ok(slot.status == SlotStatus::Pending),
        }
    }

    async fn appointment_is_active(&self, appointment_id: &str) -> Result<bool, AppointmentError> {
        let Some(document) = self.store.get(APPOINTMENTS_COLLECTION, appointment_id).await? else {
            return Ok(false);
        };

        match serde_json::from_value::<Appointment>(document) {
            Ok(appointment) => Ok(appointment.status.is_active()),
            Err(e) => {
                error!("Unreadable appointment {} referenced by slot: {}", appointment_id, e);
                Ok(true)
            }
        }
    }
}
