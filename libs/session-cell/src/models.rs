use std::time::Duration;

use serde::Deserialize;

use shared_config::AppConfig;

pub const SESSION_COOKIE: &str = "session";
pub const USER_ROLE_COOKIE: &str = "userRole";
pub const LAST_ACTIVITY_COOKIE: &str = "lastActivity";
pub const LOGGED_IN_COOKIE: &str = "loggedIn";

pub const USERS_COLLECTION: &str = "users";

pub const LOGIN_PATH: &str = "/login";
pub const IDLE_TIMEOUT_REASON: &str = "idle-timeout";

/// User interaction that counts as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    PointerMove,
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
    VisibilityChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Inactive,
    Monitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    pub idle_threshold: Duration,
    /// Minimum spacing between two accepted activity events.
    pub activity_throttle: Duration,
    pub check_interval: Duration,
}

impl IdlePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            idle_threshold: Duration::from_secs(config.idle_timeout_minutes * 60),
            ..Self::default()
        }
    }

    /// Max-Age for the sliding session markers.
    pub fn marker_max_age(&self) -> Duration {
        self.idle_threshold
    }
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(30 * 60),
            activity_throttle: Duration::from_secs(60),
            check_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    #[serde(default)]
    pub id_token: String,
}
