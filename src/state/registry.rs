use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, Shared};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{dto::ws::MenuAction, error::ServiceError, state::session::UserSession};

/// Work queued for a session worker, processed strictly in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Load the persisted record and draw the initial display.
    Connect,
    /// Handle one menu interaction.
    Menu {
        /// The menu entry the user picked.
        action: MenuAction,
        /// Current display name, when the host reported one.
        name: Option<String>,
    },
}

/// Resolves once a session worker has stopped.
pub type WorkerDone = Shared<BoxFuture<'static, ()>>;

/// A registered session: the shared session state plus the queue feeding its worker.
///
/// Dropping the last handle closes the queue, so the worker stops once it drained
/// what was already submitted.
pub struct SessionHandle {
    session: Arc<UserSession>,
    connection_id: Uuid,
    commands: mpsc::UnboundedSender<SessionCommand>,
    finished: WorkerDone,
}

impl SessionHandle {
    /// Bundle a session with its command queue and the completion of its worker.
    pub fn new(
        session: Arc<UserSession>,
        connection_id: Uuid,
        commands: mpsc::UnboundedSender<SessionCommand>,
        finished: WorkerDone,
    ) -> Self {
        Self {
            session,
            connection_id,
            commands,
            finished,
        }
    }

    /// Shared session state.
    pub fn session(&self) -> &Arc<UserSession> {
        &self.session
    }

    /// Host connection that opened this session.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Queue a command for the session worker.
    pub fn submit(&self, command: SessionCommand) -> Result<(), ServiceError> {
        self.commands
            .send(command)
            .map_err(|_| ServiceError::HostDisconnected)
    }

    /// Completes once this session's worker has stopped.
    pub fn finished(&self) -> WorkerDone {
        self.finished.clone()
    }
}

/// Connected users keyed by their identity. Owned by [`crate::state::AppState`].
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the session built by `build`, returning the one it replaced.
    ///
    /// `build` receives the session currently registered for `user_id` and runs
    /// while the entry is locked, so a chain of replacements always sees its
    /// direct predecessor.
    pub fn insert_with<F>(&self, user_id: Uuid, build: F) -> Option<Arc<SessionHandle>>
    where
        F: FnOnce(Option<&SessionHandle>) -> SessionHandle,
    {
        match self.sessions.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let handle = build(Some(entry.get()));
                Some(entry.insert(Arc::new(handle)))
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(build(None)));
                None
            }
        }
    }

    /// The session registered for `user_id`.
    pub fn get(&self, user_id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions
            .get(user_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the user's session if it still belongs to `connection_id`.
    pub fn remove(&self, user_id: &Uuid, connection_id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions
            .remove_if(user_id, |_, handle| handle.connection_id == connection_id)
            .map(|(_, handle)| handle)
    }

    /// Remove every session opened by `connection_id`.
    pub fn remove_connection(&self, connection_id: Uuid) -> Vec<Arc<SessionHandle>> {
        let user_ids = self
            .sessions
            .iter()
            .filter(|entry| entry.value().connection_id == connection_id)
            .map(|entry| *entry.key())
            .collect::<Vec<_>>();

        user_ids
            .iter()
            .filter_map(|user_id| self.remove(user_id, connection_id))
            .collect()
    }

    /// Number of connected users.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no user is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
