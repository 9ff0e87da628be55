use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::sleep;

use session_cell::error::SessionError;
use session_cell::models::{
    ActivityEvent, IdlePolicy, MonitorState, LAST_ACTIVITY_COOKIE, LOGGED_IN_COOKIE, USER_ROLE_COOKIE,
};
use session_cell::services::identity::IdentityProvider;
use session_cell::services::markers::{MemorySessionMarkers, SessionMarkers};
use session_cell::services::monitor::{Navigator, SessionIdleMonitor};
use shared_models::auth::Identity;

struct FakeIdentity {
    sign_outs: AtomicUsize,
    fail: bool,
    state: watch::Sender<Option<Identity>>,
}

impl FakeIdentity {
    fn new(fail: bool) -> Self {
        let (state, _) = watch::channel(Some(Identity {
            id: "patient-1".to_string(),
            display_name: Some("Pat".to_string()),
        }));
        Self {
            sign_outs: AtomicUsize::new(0),
            fail,
            state,
        }
    }

    fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn current_user(&self) -> Option<Identity> {
        self.state.borrow().clone()
    }

    fn auth_state(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SessionError::Identity("offline".to_string()));
        }
        self.state.send_replace(None);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Redirect {
    location: String,
    signed_out: bool,
    markers_cleared: bool,
}

struct RecordingNavigator {
    path: String,
    identity: Arc<FakeIdentity>,
    markers: Arc<MemorySessionMarkers>,
    redirects: Mutex<Vec<Redirect>>,
}

impl RecordingNavigator {
    fn redirects(&self) -> Vec<Redirect> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.path.clone()
    }

    fn redirect(&self, location: &str) {
        self.redirects.lock().unwrap().push(Redirect {
            location: location.to_string(),
            signed_out: self.identity.sign_outs() > 0,
            markers_cleared: self.markers.is_empty(),
        });
    }
}

struct Harness {
    identity: Arc<FakeIdentity>,
    markers: Arc<MemorySessionMarkers>,
    navigator: Arc<RecordingNavigator>,
    monitor: SessionIdleMonitor,
}

fn harness_at(path: &str, failing_sign_out: bool) -> Harness {
    let identity = Arc::new(FakeIdentity::new(failing_sign_out));
    let markers = Arc::new(MemorySessionMarkers::new());
    markers.set(LOGGED_IN_COOKIE, "1", Duration::from_secs(5));
    markers.set(USER_ROLE_COOKIE, "patient", Duration::from_secs(5));

    let navigator = Arc::new(RecordingNavigator {
        path: path.to_string(),
        identity: identity.clone(),
        markers: markers.clone(),
        redirects: Mutex::new(Vec::new()),
    });
    let monitor = SessionIdleMonitor::new(
        identity.clone(),
        markers.clone(),
        navigator.clone(),
        IdlePolicy::default(),
    );

    Harness {
        identity,
        markers,
        navigator,
        monitor,
    }
}

fn harness() -> Harness {
    harness_at("/dashboard", false)
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn start_primes_session_markers() {
    let mut h = harness();
    h.monitor.start();
    settle().await;

    assert_eq!(h.monitor.state(), MonitorState::Monitoring);
    assert!(h.markers.get(LAST_ACTIVITY_COOKIE).is_some());
    let logged_in = h.markers.marker(LOGGED_IN_COOKIE).unwrap();
    assert_eq!(logged_in.value, "1");
    assert_eq!(logged_in.max_age, Duration::from_secs(30 * 60));
    assert_eq!(h.markers.marker(USER_ROLE_COOKIE).unwrap().max_age, Duration::from_secs(30 * 60));
}

#[tokio::test(start_paused = true)]
async fn idle_session_is_logged_out_once() {
    let mut h = harness();
    h.monitor.start();
    settle().await;

    sleep(Duration::from_secs(29 * 60)).await;
    settle().await;
    assert!(h.navigator.redirects().is_empty());
    assert_eq!(h.identity.sign_outs(), 0);

    sleep(Duration::from_secs(2 * 60)).await;
    settle().await;
    let redirects = h.navigator.redirects();
    assert_eq!(redirects.len(), 1);
    assert_eq!(redirects[0].location, "/login?reason=idle-timeout");
    assert_eq!(h.identity.sign_outs(), 1);
    assert!(h.identity.current_user().is_none());

    sleep(Duration::from_secs(2 * 60 * 60)).await;
    settle().await;
    assert_eq!(h.navigator.redirects().len(), 1);
    assert_eq!(h.identity.sign_outs(), 1);
    assert_eq!(h.monitor.state(), MonitorState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn idle_logout_signs_out_and_clears_markers_before_redirect() {
    let mut h = harness();
    h.monitor.start();

    sleep(Duration::from_secs(31 * 60)).await;
    settle().await;

    assert_eq!(
        h.navigator.redirects(),
        vec![Redirect {
            location: "/login?reason=idle-timeout".to_string(),
            signed_out: true,
            markers_cleared: true,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn accepted_activity_postpones_logout() {
    let mut h = harness();
    let activity = h.monitor.start();
    settle().await;

    sleep(Duration::from_secs(20 * 60)).await;
    assert!(activity.record(ActivityEvent::KeyDown));
    settle().await;

    sleep(Duration::from_secs(25 * 60)).await;
    settle().await;
    assert!(h.navigator.redirects().is_empty());

    sleep(Duration::from_secs(6 * 60)).await;
    settle().await;
    assert_eq!(h.navigator.redirects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn activity_inside_throttle_window_is_ignored() {
    let mut h = harness();
    let activity = h.monitor.start();
    settle().await;

    sleep(Duration::from_secs(30)).await;
    activity.record(ActivityEvent::PointerMove);
    settle().await;

    sleep(Duration::from_secs(30 * 60 + 10)).await;
    settle().await;
    assert_eq!(h.navigator.redirects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent_while_monitoring() {
    let mut h = harness();
    h.monitor.start();
    h.monitor.start();
    settle().await;

    sleep(Duration::from_secs(40 * 60)).await;
    settle().await;
    assert_eq!(h.identity.sign_outs(), 1);
    assert_eq!(h.navigator.redirects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stopped_monitor_never_logs_out() {
    let mut h = harness();
    h.monitor.start();
    settle().await;
    h.monitor.stop().await;

    assert_eq!(h.monitor.state(), MonitorState::Inactive);
    assert!(h.monitor.activity_sender().is_none());

    sleep(Duration::from_secs(2 * 60 * 60)).await;
    settle().await;
    assert_eq!(h.identity.sign_outs(), 0);
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn activity_after_idle_logout_is_rejected() {
    let mut h = harness();
    let activity = h.monitor.start();

    sleep(Duration::from_secs(31 * 60)).await;
    settle().await;

    assert!(!activity.record(ActivityEvent::Scroll));
    assert_eq!(h.monitor.state(), MonitorState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn idle_logout_on_login_page_does_not_redirect() {
    let mut h = harness_at("/login", false);
    h.monitor.start();

    sleep(Duration::from_secs(31 * 60)).await;
    settle().await;

    assert_eq!(h.identity.sign_outs(), 1);
    assert!(h.markers.is_empty());
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_sign_out_still_clears_and_redirects() {
    let mut h = harness_at("/dashboard", true);
    h.monitor.start();

    sleep(Duration::from_secs(31 * 60)).await;
    settle().await;

    assert_eq!(h.identity.sign_outs(), 1);
    let redirects = h.navigator.redirects();
    assert_eq!(redirects.len(), 1);
    assert!(redirects[0].markers_cleared);
}

#[tokio::test(start_paused = true)]
async fn logout_with_reason_encodes_it() {
    let mut h = harness();
    h.monitor.start();
    settle().await;

    h.monitor.logout(Some("session expired")).await;

    assert_eq!(h.monitor.state(), MonitorState::Inactive);
    assert_eq!(h.identity.sign_outs(), 1);
    assert!(h.markers.is_empty());
    assert_eq!(h.navigator.redirects()[0].location, "/login?reason=session%20expired");

    sleep(Duration::from_secs(2 * 60 * 60)).await;
    settle().await;
    assert_eq!(h.identity.sign_outs(), 1);
}

#[tokio::test(start_paused = true)]
async fn logout_without_reason_goes_to_login() {
    let mut h = harness();

    h.monitor.logout(None).await;

    assert_eq!(h.identity.sign_outs(), 1);
    assert_eq!(h.navigator.redirects()[0].location, "/login");
}
