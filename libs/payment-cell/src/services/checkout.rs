// libs/payment-cell/src/services/checkout.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use appointment_cell::models::{AppointmentStatus, USERS_COLLECTION};
use appointment_cell::AppointmentService;
use shared_config::AppConfig;
use shared_database::DocumentStore;
use shared_models::auth::User;

use crate::error::PaymentError;
use crate::models::{Checkout, CheckoutRequest, PaymentVerification};
use crate::services::gateway::PaymentGateway;

/// Checkout creation and payment confirmation for appointments.
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    appointments: Arc<AppointmentService>,
    store: Arc<dyn DocumentStore>,
    currency: String,
    public_base_url: String,
}

impl PaymentService {
    pub fn new(
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        appointments: Arc<AppointmentService>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            gateway,
            appointments,
            store,
            currency: config.payment_currency.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Opens a hosted checkout for the patient of an accepted, unpaid
    /// appointment.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn start_checkout(
        &self,
        caller: &User,
        appointment_id: &str,
        amount: i64,
    ) -> Result<Checkout, PaymentError> {
        if appointment_id.trim().is_empty() {
            return Err(PaymentError::Validation("appointmentId is required".to_string()));
        }
        if amount <= 0 {
            return Err(PaymentError::Validation("amount must be a positive number of cents".to_string()));
        }

        let appointment = self.appointments.get(appointment_id).await?;
        if appointment.patient_id != caller.id {
            return Err(PaymentError::Forbidden(
                "Only the appointment's patient can pay for it".to_string(),
            ));
        }
        if appointment.status != AppointmentStatus::Accepted {
            return Err(PaymentError::Validation(format!(
                "Appointment is {}, only accepted appointments can be paid",
                appointment.status
            )));
        }
        if appointment.is_paid {
            return Err(PaymentError::Validation("Appointment is already paid".to_string()));
        }

        let customer_email = self.patient_email(&appointment.patient_id).await;

        let mut metadata = BTreeMap::new();
        for (key, value) in [
            ("appointmentId", &appointment.id),
            ("patientId", &appointment.patient_id),
            ("patientName", &appointment.patient_name),
            ("doctorId", &appointment.doctor_id),
            ("doctorName", &appointment.doctor_name),
        ] {
            if !value.is_empty() {
                metadata.insert(key.to_string(), value.clone());
            }
        }

        let request = CheckoutRequest {
            appointment_id: appointment.id.clone(),
            amount,
            currency: self.currency.clone(),
            product_name: format!("Appointment Payment for {}", appointment.patient_name),
            customer_email,
            success_url: format!(
                "{}/dashboard/appointments?session_id={{CHECKOUT_SESSION_ID}}",
                self.public_base_url
            ),
            cancel_url: format!("{}/dashboard/appointments", self.public_base_url),
            metadata,
        };

        let checkout = self.gateway.create_checkout(&request).await?;
        info!("Checkout {} opened for appointment {}", checkout.session_id, appointment.id);
        Ok(checkout)
    }

    /// Asks the provider whether the appointment was paid and records it.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn verify_payment(
        &self,
        caller: &User,
        appointment_id: &str,
    ) -> Result<PaymentVerification, PaymentError> {
        if appointment_id.trim().is_empty() {
            return Err(PaymentError::Validation("appointmentId is required".to_string()));
        }

        let appointment = self.appointments.get(appointment_id).await?;
        if !caller.is_admin() && !appointment.is_participant(&caller.id) {
            return Err(PaymentError::Forbidden(
                "Not authorized to verify payment for this appointment".to_string(),
            ));
        }
        if appointment.is_paid {
            return Ok(PaymentVerification { is_paid: true });
        }

        let verification = self.gateway.verify_payment(appointment_id).await?;
        if !verification.is_paid {
            info!("No settled payment yet for appointment {}", appointment_id);
            return Ok(verification);
        }

        let updated = self.appointments.mark_paid(appointment_id).await?;
        Ok(PaymentVerification {
            is_paid: updated.is_paid,
        })
    }

    async fn patient_email(&self, patient_id: &str) -> Option<String> {
        match self.store.get(USERS_COLLECTION, patient_id).await {
            Ok(profile) => profile
                .and_then(|profile| profile.get("email").and_then(|v| v.as_str()).map(str::to_string))
                .filter(|email| !email.is_empty()),
            Err(e) => {
                warn!("Could not load patient {} for checkout: {}", patient_id, e);
                None
            }
        }
    }
}
