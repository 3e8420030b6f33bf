/// Connected sessions keyed by user.
pub mod registry;
/// State of one connected user.
pub mod session;
/// Preference state machine with plan/apply/abort transitions.
pub mod state_machine;
/// Transition runner backed by store writes.
pub mod transitions;

use std::sync::Arc;

use crate::dao::dal::Dal;

pub use self::registry::{SessionCommand, SessionHandle, SessionRegistry};
pub use self::session::UserSession;
pub use self::state_machine::{AbortError, ApplyError, Plan, PlanError, PlanId, Tracking};

/// Shared reference handed to every handler and worker.
pub type SharedState = Arc<AppState>;

/// Central application state: the data access layer and the connected users.
pub struct AppState {
    dal: Arc<Dal>,
    sessions: SessionRegistry,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(dal: Arc<Dal>) -> SharedState {
        Arc::new(Self {
            dal,
            sessions: SessionRegistry::new(),
        })
    }

    /// The data access layer.
    pub fn dal(&self) -> &Arc<Dal> {
        &self.dal
    }

    /// Registry of connected users keyed by their identity.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }
}
