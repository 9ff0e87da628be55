use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub stripe_secret_key: String,
    pub stripe_api_base_url: String,
    pub payment_currency: String,
    pub public_base_url: String,
    pub sms_gateway_url: String,
    pub sms_gateway_token: String,
    pub appointment_duration_minutes: i64,
    pub deployment_utc_offset_minutes: i32,
    pub slot_reservation_lease_seconds: i64,
    pub idle_timeout_minutes: u64,
    pub store_poll_interval_seconds: u64,
    pub production: bool,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .unwrap_or_else(|_| {
                    warn!("STRIPE_SECRET_KEY not set, using empty value");
                    String::new()
                }),
            stripe_api_base_url: env::var("STRIPE_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            payment_currency: env::var("PAYMENT_CURRENCY")
                .unwrap_or_else(|_| "usd".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("PUBLIC_BASE_URL not set, using default");
                    "http://localhost:3000".to_string()
                }),
            sms_gateway_url: env::var("SMS_GATEWAY_URL").unwrap_or_default(),
            sms_gateway_token: env::var("SMS_GATEWAY_TOKEN").unwrap_or_default(),
            appointment_duration_minutes: parse_var("APPOINTMENT_DURATION_MINUTES", 30),
            deployment_utc_offset_minutes: parse_var("DEPLOYMENT_UTC_OFFSET_MINUTES", 0),
            slot_reservation_lease_seconds: parse_var("SLOT_RESERVATION_LEASE_SECONDS", 120),
            idle_timeout_minutes: parse_var("IDLE_TIMEOUT_MINUTES", 30),
            store_poll_interval_seconds: parse_var("STORE_POLL_INTERVAL_SECONDS", 5),
            production: env::var("APP_ENV").map(|v| v == "production").unwrap_or(false),
            port: parse_var("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payment_configured(&self) -> bool {
        !self.stripe_secret_key.is_empty() && !self.stripe_api_base_url.is_empty()
    }

    pub fn is_sms_configured(&self) -> bool {
        !self.sms_gateway_url.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            stripe_secret_key: String::new(),
            stripe_api_base_url: "https://api.stripe.com".to_string(),
            payment_currency: "usd".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            sms_gateway_url: String::new(),
            sms_gateway_token: String::new(),
            appointment_duration_minutes: 30,
            deployment_utc_offset_minutes: 0,
            slot_reservation_lease_seconds: 120,
            idle_timeout_minutes: 30,
            store_poll_interval_seconds: 5,
            production: false,
            port: 3000,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_not_configured() {
        let config = AppConfig::default();
        assert!(!config.is_configured());
        assert!(!config.is_payment_configured());
        assert!(!config.is_sms_configured());
        assert_eq!(config.appointment_duration_minutes, 30);
        assert_eq!(config.idle_timeout_minutes, 30);
    }

    #[test]
    fn parse_var_falls_back_on_garbage() {
        env::set_var("SHARED_CONFIG_TEST_GARBAGE", "not-a-number");
        let value: i64 = parse_var("SHARED_CONFIG_TEST_GARBAGE", 42);
        assert_eq!(value, 42);
        env::remove_var("SHARED_CONFIG_TEST_GARBAGE");
    }
}
