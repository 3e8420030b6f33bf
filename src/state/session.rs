use std::{future::Future, sync::Arc};

use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::UserEntity,
    dto::ws::MenuView,
    error::ServiceError,
    services::presenter::Presenter,
    state::state_machine::{
        AbortError, ApplyError, ConfirmKind, ConfirmationRequest, Plan, PlanError, PlanId,
        PreferenceEvent, PreferenceStateMachine, StoreWrite, Tracking,
    },
};

/// Live state of one connected user: identity, transient UI data and the
/// preference state machine mediating every write.
pub struct UserSession {
    user_id: Uuid,
    display_name: RwLock<String>,
    live_event_id: Option<String>,
    presenter: Arc<dyn Presenter>,
    machine: RwLock<PreferenceStateMachine>,
    transition_gate: Mutex<()>,
}

impl UserSession {
    /// Fresh session; the tracking state is unknown until [`UserSession::load`].
    pub fn new(
        user_id: Uuid,
        display_name: String,
        live_event_id: Option<String>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            user_id,
            display_name: RwLock::new(display_name),
            live_event_id,
            presenter,
            machine: RwLock::new(PreferenceStateMachine::new(user_id)),
            transition_gate: Mutex::new(()),
        }
    }

    /// Identity reported by the host.
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Event the user attends right now, as reported at connection time.
    pub fn live_event_id(&self) -> Option<&str> {
        self.live_event_id.as_deref()
    }

    /// Host drawing this user's display.
    pub fn presenter(&self) -> &Arc<dyn Presenter> {
        &self.presenter
    }

    /// Latest display name reported by the host.
    pub async fn display_name(&self) -> String {
        self.display_name.read().await.clone()
    }

    /// Refresh the live display name reported by the host.
    pub async fn rename(&self, name: String) {
        *self.display_name.write().await = name;
    }

    /// Snapshot of the tracking state.
    pub async fn tracking(&self) -> Tracking {
        self.machine.read().await.tracking().clone()
    }

    /// Persisted record backing the session, if the user participates.
    pub async fn record(&self) -> Option<UserEntity> {
        self.machine.read().await.tracking().record().cloned()
    }

    /// Seed the machine with the record found at connection time.
    pub async fn load(&self, record: Option<UserEntity>) -> Tracking {
        self.machine.write().await.load(record).clone()
    }

    /// Open a confirmation prompt for opting in or out.
    pub async fn request_confirmation(
        &self,
        kind: ConfirmKind,
    ) -> Result<ConfirmationRequest, PlanError> {
        self.machine.write().await.request_confirmation(kind)
    }

    /// Drop the confirmation opened with `id`.
    pub async fn cancel_confirmation(&self, id: Uuid) {
        self.machine.write().await.cancel_confirmation(id);
    }

    /// Push the menu matching `tracking` to the host.
    pub fn show_menu(&self, tracking: &Tracking) {
        self.presenter.show_menu(self.user_id, MenuView::from(tracking));
    }

    async fn plan_transition(&self, event: PreferenceEvent) -> Result<Plan, PlanError> {
        let mut sm = self.machine.write().await;
        sm.plan(event)
    }

    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<Tracking, ApplyError> {
        let mut sm = self.machine.write().await;
        sm.apply(plan_id)
    }

    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        let mut sm = self.machine.write().await;
        sm.abort(plan_id)
    }

    /// Plan `event`, hand its store write to `work`, then apply the plan on
    /// success or abort it on failure. The store write is bounded by the data
    /// access layer, which also drops its memos when the outcome is unknown.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: PreferenceEvent,
        work: F,
    ) -> Result<(T, Tracking), ServiceError>
    where
        F: FnOnce(StoreWrite) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate.lock().await;
        let Plan {
            id: plan_id,
            action,
            write,
            pending_since,
            ..
        } = self.plan_transition(event).await?;

        match work(write).await {
            Ok(value) => {
                let next = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                Ok((value, next))
            }
            Err(err) => {
                warn!(
                    user_id = %self.user_id,
                    action = ?action,
                    plan_id = %plan_id,
                    elapsed_ms = pending_since.elapsed().as_millis() as u64,
                    error = %err,
                    "transition store write failed"
                );
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        user_id = %self.user_id,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}
