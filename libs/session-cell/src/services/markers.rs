// libs/session-cell/src/services/markers.rs
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Client-visible session markers (`lastActivity`, `loggedIn`, `userRole`).
pub trait SessionMarkers: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    fn set(&self, name: &str, value: &str, max_age: Duration);

    fn remove(&self, name: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub value: String,
    pub max_age: Duration,
}

/// Marker jar kept in process memory.
#[derive(Debug, Default)]
pub struct MemorySessionMarkers {
    markers: Mutex<HashMap<String, Marker>>,
}

impl MemorySessionMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, name: &str) -> Option<Marker> {
        self.markers.lock().ok()?.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.lock().map(|markers| markers.is_empty()).unwrap_or(true)
    }
}

impl SessionMarkers for MemorySessionMarkers {
    fn get(&self, name: &str) -> Option<String> {
        self.marker(name).map(|marker| marker.value)
    }

    fn set(&self, name: &str, value: &str, max_age: Duration) {
        if let Ok(mut markers) = self.markers.lock() {
            markers.insert(
                name.to_string(),
                Marker {
                    value: value.to_string(),
                    max_age,
                },
            );
        }
    }

    fn remove(&self, name: &str) {
        if let Ok(mut markers) = self.markers.lock() {
            markers.remove(name);
        }
    }
}
