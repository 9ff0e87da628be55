use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{AppointmentService, LogNotifier, Notifier, SmsGatewayNotifier};
use payment_cell::{PaymentGateway, PaymentService, StripeCheckoutGateway};
use router::AppServices;
use shared_config::AppConfig;
use shared_database::{DocumentStore, MemoryDocumentStore, SupabaseDocumentStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Telecare API server");

    let config = Arc::new(AppConfig::from_env());
    let services = build_services(config.clone());

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(services)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn build_services(config: Arc<AppConfig>) -> AppServices {
    let store: Arc<dyn DocumentStore> = if config.is_configured() {
        Arc::new(SupabaseDocumentStore::new(&config))
    } else {
        warn!("Supabase is not configured, using the in-memory document store");
        Arc::new(MemoryDocumentStore::new())
    };

    let notifier: Arc<dyn Notifier> = match SmsGatewayNotifier::new(&config) {
        Ok(sms) => Arc::new(sms),
        Err(_) => {
            warn!("SMS gateway is not configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    let appointments = Arc::new(AppointmentService::from_config(&config, store.clone(), notifier));

    let payments = match StripeCheckoutGateway::new(&config) {
        Ok(gateway) => {
            let gateway: Arc<dyn PaymentGateway> = Arc::new(gateway);
            Some(Arc::new(PaymentService::new(
                &config,
                gateway,
                appointments.clone(),
                store.clone(),
            )))
        }
        Err(_) => {
            warn!("Stripe is not configured, payment routes are disabled");
            None
        }
    };

    AppServices {
        config,
        store,
        appointments,
        payments,
    }
}
