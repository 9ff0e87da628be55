pub mod cookies;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::SessionError;
pub use router::{session_routes, SessionCellState};
pub use services::identity::{IdentityProvider, SupabaseIdentityProvider};
pub use services::markers::{MemorySessionMarkers, SessionMarkers};
pub use services::monitor::{ActivitySender, Navigator, SessionIdleMonitor};
