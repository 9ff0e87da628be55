// libs/session-cell/src/services/monitor.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::models::{
    ActivityEvent, IdlePolicy, MonitorState, IDLE_TIMEOUT_REASON, LAST_ACTIVITY_COOKIE, LOGGED_IN_COOKIE,
    LOGIN_PATH, USER_ROLE_COOKIE,
};
use crate::services::identity::IdentityProvider;
use crate::services::markers::SessionMarkers;

/// Where the client currently is, and how to send it elsewhere.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    fn redirect(&self, location: &str);
}

enum MonitorMessage {
    Activity(ActivityEvent),
    Stop,
}

/// Cloneable handle for event sources feeding the running monitor.
#[derive(Clone)]
pub struct ActivitySender {
    tx: mpsc::Sender<MonitorMessage>,
}

impl ActivitySender {
    /// Returns false when the monitor is gone or its queue is full. Dropped
    /// events are harmless since activity is throttled anyway.
    pub fn record(&self, event: ActivityEvent) -> bool {
        self.tx.try_send(MonitorMessage::Activity(event)).is_ok()
    }
}

struct SessionContext {
    identity: Arc<dyn IdentityProvider>,
    markers: Arc<dyn SessionMarkers>,
    navigator: Arc<dyn Navigator>,
    policy: IdlePolicy,
}

impl SessionContext {
    /// Sliding renewal of the client markers. `loggedIn` and `userRole` are
    /// only renewed when present.
    fn refresh_markers(&self) {
        let max_age = self.policy.marker_max_age();
        let now = Utc::now().timestamp_millis().to_string();
        self.markers.set(LAST_ACTIVITY_COOKIE, &now, max_age);

        for name in [LOGGED_IN_COOKIE, USER_ROLE_COOKIE] {
            if let Some(value) = self.markers.get(name) {
                self.markers.set(name, &value, max_age);
            }
        }
    }

    fn clear_markers(&self) {
        for name in [USER_ROLE_COOKIE, LAST_ACTIVITY_COOKIE, LOGGED_IN_COOKIE] {
            self.markers.remove(name);
        }
    }

    async fn sign_out(&self) {
        if let Err(e) = self.identity.sign_out().await {
            warn!("Sign-out failed, clearing local session anyway: {}", e);
        }
    }

    async fn logout_for_idle(&self) {
        self.sign_out().await;
        self.clear_markers();

        if self.navigator.current_path() != LOGIN_PATH {
            self.navigator
                .redirect(&format!("{}?reason={}", LOGIN_PATH, IDLE_TIMEOUT_REASON));
        }
    }

    async fn logout(&self, reason: Option<&str>) {
        self.sign_out().await;
        self.clear_markers();

        let location = match reason {
            Some(reason) => format!("{}?reason={}", LOGIN_PATH, urlencoding::encode(reason)),
            None => LOGIN_PATH.to_string(),
        };
        self.navigator.redirect(&location);
    }
}

struct RunningMonitor {
    tx: mpsc::Sender<MonitorMessage>,
    task: JoinHandle<()>,
}

/// Idle-session watchdog for one signed-in client.
///
/// `start` spawns the monitoring task; activity reaches it through
/// [`ActivitySender`]. After `idle_threshold` without accepted activity the
/// task signs the user out, clears the markers, redirects to the login page
/// and ends.
pub struct SessionIdleMonitor {
    context: Arc<SessionContext>,
    running: Option<RunningMonitor>,
}

impl SessionIdleMonitor {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        markers: Arc<dyn SessionMarkers>,
        navigator: Arc<dyn Navigator>,
        policy: IdlePolicy,
    ) -> Self {
        Self {
            context: Arc::new(SessionContext {
                identity,
                markers,
                navigator,
                policy,
            }),
            running: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        match &self.running {
            Some(running) if !running.task.is_finished() => MonitorState::Monitoring,
            _ => MonitorState::Inactive,
        }
    }

    /// Starts monitoring and primes the markers. No-op while already
    /// monitoring.
    pub fn start(&mut self) -> ActivitySender {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                debug!("Idle monitor already running");
                return ActivitySender {
                    tx: running.tx.clone(),
                };
            }
        }

        let (tx, rx) = mpsc::channel(64);
        let context = Arc::clone(&self.context);
        let task = tokio::spawn(run_monitor(context, rx));

        info!(
            "Idle monitor started (threshold {}s)",
            self.context.policy.idle_threshold.as_secs()
        );

        self.running = Some(RunningMonitor { tx: tx.clone(), task });
        ActivitySender { tx }
    }

    /// Handle for feeding activity, if monitoring.
    pub fn activity_sender(&self) -> Option<ActivitySender> {
        self.running
            .as_ref()
            .filter(|running| !running.task.is_finished())
            .map(|running| ActivitySender {
                tx: running.tx.clone(),
            })
    }

    /// Returns to `Inactive` without logging out.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        // The task may already have ended after an idle logout
        let _ = running.tx.send(MonitorMessage::Stop).await;
        if let Err(e) = running.task.await {
            warn!("Idle monitor task ended abnormally: {}", e);
        }
        debug!("Idle monitor stopped");
    }

    /// User-initiated logout: stops monitoring, signs out, clears markers and
    /// redirects to the login page tagged with `reason`.
    #[instrument(skip(self))]
    pub async fn logout(&mut self, reason: Option<&str>) {
        self.stop().await;
        self.context.logout(reason).await;
        info!("Logged out");
    }
}

async fn run_monitor(context: Arc<SessionContext>, mut rx: mpsc::Receiver<MonitorMessage>) {
    let policy = context.policy;

    context.refresh_markers();
    let mut last_activity = Instant::now();
    let mut last_refresh = last_activity;

    let mut checks = interval_at(Instant::now() + policy.check_interval, policy.check_interval);

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(MonitorMessage::Activity(event)) => {
                    let now = Instant::now();
                    if now.duration_since(last_refresh) < policy.activity_throttle {
                        continue;
                    }
                    last_refresh = now;
                    last_activity = now;
                    context.refresh_markers();
                    debug!("Activity accepted: {:?}", event);
                }
                Some(MonitorMessage::Stop) | None => return,
            },
            _ = checks.tick() => {
                let idle_for = Instant::now().duration_since(last_activity);
                if idle_for > policy.idle_threshold {
                    info!("Session idle for {}s, logging out", idle_for.as_secs());
                    context.logout_for_idle().await;
                    return;
                }
            }
        }
    }
}
