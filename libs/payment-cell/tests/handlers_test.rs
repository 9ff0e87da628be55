use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{LifecyclePolicy, APPOINTMENTS_COLLECTION, USERS_COLLECTION};
use appointment_cell::{AppointmentService, LogNotifier};
use payment_cell::{payment_routes, PaymentCellState, PaymentService, StripeCheckoutGateway};
use shared_database::{DocumentStore, MemoryDocumentStore};
use shared_utils::test_utils::{JwtTestUtils, MockDocuments, TestConfig, TestUser};

struct TestApp {
    router: Router,
    store: Arc<MemoryDocumentStore>,
    patient: TestUser,
    doctor: TestUser,
}

async fn create_test_app(stripe: &MockServer, status: &str) -> TestApp {
    let mut config = TestConfig::default().to_app_config();
    config.stripe_secret_key = "sk_test_123".to_string();
    config.stripe_api_base_url = stripe.uri();
    let config = Arc::new(config);

    let patient = TestUser::patient("pat@example.com");
    let doctor = TestUser::doctor("doc@example.com");

    let store = Arc::new(MemoryDocumentStore::new());
    store
        .insert(
            APPOINTMENTS_COLLECTION,
            "apt-1",
            MockDocuments::appointment(&doctor.id, &patient.id, "2099-01-15", "10:00", status),
        )
        .await
        .unwrap();
    store
        .insert(USERS_COLLECTION, &patient.id, MockDocuments::user_profile(&patient.id, "Pat", "patient", None))
        .await
        .unwrap();

    let appointments = Arc::new(AppointmentService::new(
        store.clone(),
        Arc::new(LogNotifier),
        LifecyclePolicy::default(),
        Duration::seconds(120),
    ));
    let gateway = Arc::new(StripeCheckoutGateway::new(&config).unwrap());
    let payments = PaymentService::new(&config, gateway, appointments, store.clone());

    let router = payment_routes(Arc::new(PaymentCellState {
        config,
        payments: Arc::new(payments),
    }));

    TestApp {
        router,
        store,
        patient,
        doctor,
    }
}

async fn post(router: &Router, uri: &str, user: &TestUser, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("authorization", JwtTestUtils::bearer(user))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn is_paid(store: &MemoryDocumentStore) -> bool {
    store.get(APPOINTMENTS_COLLECTION, "apt-1").await.unwrap().unwrap()["isPaid"] == json!(true)
}

#[tokio::test]
async fn patient_receives_checkout_redirect() {
    let stripe = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_1",
            "url": "https://checkout.stripe.test/cs_test_1"
        })))
        .expect(1)
        .mount(&stripe)
        .await;
    let app = create_test_app(&stripe, "accepted").await;

    let (status, body) = post(
        &app.router,
        "/checkout",
        &app.patient,
        json!({ "appointmentId": "apt-1", "amount": 5000 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["redirectUrl"], "https://checkout.stripe.test/cs_test_1");
}

#[tokio::test]
async fn checkout_validation_happens_before_the_provider_call() {
    let stripe = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&stripe)
        .await;
    let app = create_test_app(&stripe, "pending").await;

    let (status, body) = post(&app.router, "/checkout", &app.patient, json!({ "appointmentId": "apt-1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    let (status, _) = post(
        &app.router,
        "/checkout",
        &app.doctor,
        json!({ "appointmentId": "apt-1", "amount": 5000 }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(
        &app.router,
        "/checkout",
        &app.patient,
        json!({ "appointmentId": "apt-1", "amount": 5000 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &app.router,
        "/checkout",
        &app.patient,
        json!({ "appointmentId": "missing", "amount": 5000 }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verified_payment_marks_the_appointment_paid() {
    let stripe = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "pi_1", "status": "succeeded" }]
        })))
        .expect(1)
        .mount(&stripe)
        .await;
    let app = create_test_app(&stripe, "accepted").await;

    let (status, body) = post(&app.router, "/verify", &app.patient, json!({ "appointmentId": "apt-1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isPaid"], true);
    assert!(is_paid(&app.store).await);

    // Already paid: answered from the store without asking the provider again
    let (_, body) = post(&app.router, "/verify", &app.patient, json!({ "appointmentId": "apt-1" })).await;
    assert_eq!(body["isPaid"], true);
}

#[tokio::test]
async fn unsettled_payment_leaves_appointment_unpaid() {
    let stripe = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&stripe)
        .await;
    let app = create_test_app(&stripe, "accepted").await;

    let (status, body) = post(&app.router, "/verify", &app.patient, json!({ "appointmentId": "apt-1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isPaid"], false);
    assert!(!is_paid(&app.store).await);
}

#[tokio::test]
async fn provider_outage_is_bad_gateway() {
    let stripe = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&stripe)
        .await;
    let app = create_test_app(&stripe, "accepted").await;

    let (status, body) = post(&app.router, "/verify", &app.patient, json!({ "appointmentId": "apt-1" })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["ok"], false);
    assert!(!is_paid(&app.store).await);
}
