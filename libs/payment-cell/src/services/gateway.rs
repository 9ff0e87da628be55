// libs/payment-cell/src/services/gateway.rs
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::error::PaymentError;
use crate::models::{
    Checkout, CheckoutRequest, PaymentVerification, StripeCheckoutSession, StripeSearchResult,
};

/// External payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<Checkout, PaymentError>;

    /// Whether a successful payment exists for the appointment.
    async fn verify_payment(&self, appointment_id: &str) -> Result<PaymentVerification, PaymentError>;
}

/// Stripe Checkout client.
/// Based on: https://docs.stripe.com/api/checkout/sessions/create
pub struct StripeCheckoutGateway {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl std::fmt::Debug for StripeCheckoutGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeCheckoutGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StripeCheckoutGateway {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        if !config.is_payment_configured() {
            return Err(PaymentError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            secret_key: config.stripe_secret_key.clone(),
            base_url: config.stripe_api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("line_items[0][price_data][currency]".to_string(), request.currency.clone()),
            ("line_items[0][price_data][unit_amount]".to_string(), request.amount.to_string()),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.product_name.clone(),
            ),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("client_reference_id".to_string(), request.appointment_id.clone()),
        ];

        // Metadata goes on both the session and the payment intent so that
        // verification can search intents by appointment id.
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
            form.push((format!("payment_intent_data[metadata][{}]", key), value.clone()));
        }

        if let Some(email) = &request.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }

        form
    }
}

#[async_trait]
impl PaymentGateway for StripeCheckoutGateway {
    /// POST /v1/checkout/sessions
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<Checkout, PaymentError> {
        info!("Creating checkout session for appointment {}", request.appointment_id);

        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&Self::checkout_form(request))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Checkout session creation failed: {} - {}", status, response_text);
            return Err(PaymentError::Gateway(format!("HTTP {}: {}", status, response_text)));
        }

        let session: StripeCheckoutSession = serde_json::from_str(&response_text)
            .map_err(|e| PaymentError::Gateway(format!("Failed to parse checkout session: {}", e)))?;

        let redirect_url = session
            .url
            .ok_or_else(|| PaymentError::Gateway("Checkout session has no redirect URL".to_string()))?;

        debug!("Checkout session {} created", session.id);
        Ok(Checkout {
            session_id: session.id,
            redirect_url,
        })
    }

    /// GET /v1/payment_intents/search
    async fn verify_payment(&self, appointment_id: &str) -> Result<PaymentVerification, PaymentError> {
        let url = format!("{}/v1/payment_intents/search", self.base_url);
        let query = format!("metadata['appointmentId']:'{}'", appointment_id.replace('\'', "\\'"));

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .query(&[("query", query.as_str())])
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Payment intent search failed: {} - {}", status, response_text);
            return Err(PaymentError::Gateway(format!("HTTP {}: {}", status, response_text)));
        }

        let result: StripeSearchResult = serde_json::from_str(&response_text)
            .map_err(|e| PaymentError::Gateway(format!("Failed to parse payment intents: {}", e)))?;

        let succeeded = result.data.iter().find(|intent| intent.status == "succeeded");
        if let Some(intent) = succeeded {
            debug!("Payment intent {} settled appointment {}", intent.id, appointment_id);
        }

        Ok(PaymentVerification {
            is_paid: succeeded.is_some(),
        })
    }
}
