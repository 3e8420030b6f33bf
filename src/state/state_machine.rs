use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{PresentationMode, UserEntity};

/// Where a connected user stands with respect to attendance tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tracking {
    /// The persisted record has not been looked up yet.
    Unknown,
    /// No record exists: the user never opted in, or opted out in an earlier session.
    NotTracked,
    /// The user opted out during this session.
    OptedOut,
    /// The user participates; carries the persisted record.
    OptedIn(UserEntity),
}

impl Tracking {
    /// The persisted record, when participating.
    pub fn record(&self) -> Option<&UserEntity> {
        match self {
            Tracking::OptedIn(user) => Some(user),
            _ => None,
        }
    }

    fn accepts_opt_in(&self) -> bool {
        matches!(self, Tracking::NotTracked | Tracking::OptedOut)
    }
}

/// Direction of a fit adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStep {
    /// Widen the spacing by one.
    Looser,
    /// Narrow the spacing by one.
    Tighter,
}

impl FitStep {
    /// Signed change applied to the fit offset.
    pub fn delta(self) -> i32 {
        match self {
            FitStep::Looser => 1,
            FitStep::Tighter => -1,
        }
    }
}

/// Actions that need an explicit yes/no from the user before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmKind {
    /// Start attendance tracking.
    OptIn,
    /// Stop tracking and delete the record.
    OptOut,
}

impl ConfirmKind {
    /// Text shown in the confirmation prompt.
    pub fn message(self) -> &'static str {
        match self {
            ConfirmKind::OptIn => {
                "You are opting into attendance tracking. Unlock rewards for coming to lots of Rocket Party events!"
            }
            ConfirmKind::OptOut => {
                "You are opting out of attendance tracking. You will lose any rewards you've unlocked!"
            }
        }
    }
}

/// Answer of the host's confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The user accepted.
    Submitted,
    /// The user refused, or the prompt could not be answered.
    Declined,
}

/// Token issued when a confirmation prompt is opened. Resolving it with a
/// submitted outcome is the only way to obtain a [`Confirmation`].
#[derive(Debug)]
pub struct ConfirmationRequest {
    id: Uuid,
    kind: ConfirmKind,
}

impl ConfirmationRequest {
    /// Identifier of the open prompt.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// What the prompt confirms.
    pub fn kind(&self) -> ConfirmKind {
        self.kind
    }

    /// Turn the prompt answer into a confirmation, or `None` when declined.
    pub fn resolve(self, outcome: PromptOutcome) -> Option<Confirmation> {
        match outcome {
            PromptOutcome::Submitted => Some(Confirmation {
                id: self.id,
                kind: self.kind,
            }),
            PromptOutcome::Declined => None,
        }
    }
}

/// Proof that the user accepted a confirmation prompt.
#[derive(Debug)]
pub struct Confirmation {
    id: Uuid,
    kind: ConfirmKind,
}

/// Events that can be applied to the preference state machine.
#[derive(Debug)]
pub enum PreferenceEvent {
    /// Start tracking with default preferences.
    OptIn {
        /// Accepted opt-in prompt.
        confirmation: Confirmation,
        /// Display name to store.
        name: String,
    },
    /// Stop tracking and forget the record.
    OptOut {
        /// Accepted opt-out prompt.
        confirmation: Confirmation,
    },
    /// Switch presentation mode.
    SelectMode {
        /// Newly selected mode.
        mode: PresentationMode,
        /// Display name to store.
        name: String,
    },
    /// Nudge the fit offset by one step.
    AdjustFit {
        /// Direction of the change.
        step: FitStep,
        /// Display name to store.
        name: String,
    },
}

/// Payload-free description of a [`PreferenceEvent`], used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceAction {
    /// See [`PreferenceEvent::OptIn`].
    OptIn,
    /// See [`PreferenceEvent::OptOut`].
    OptOut,
    /// See [`PreferenceEvent::SelectMode`].
    SelectMode(PresentationMode),
    /// See [`PreferenceEvent::AdjustFit`].
    AdjustFit(FitStep),
}

impl PreferenceEvent {
    /// The action without its payload.
    pub fn action(&self) -> PreferenceAction {
        match self {
            PreferenceEvent::OptIn { .. } => PreferenceAction::OptIn,
            PreferenceEvent::OptOut { .. } => PreferenceAction::OptOut,
            PreferenceEvent::SelectMode { mode, .. } => PreferenceAction::SelectMode(*mode),
            PreferenceEvent::AdjustFit { step, .. } => PreferenceAction::AdjustFit(*step),
        }
    }
}

/// Store mutation a plan needs before it can be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    /// Insert or replace the user record.
    Upsert(UserEntity),
    /// Delete the user record and its joinings.
    Delete(Uuid),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {action:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The tracking state when the action was received.
    pub from: Tracking,
    /// The action that cannot be applied from this state.
    pub action: PreferenceAction,
}

/// Errors that can occur when planning a transition or opening a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition or confirmation is already pending.
    AlreadyPending,
    /// The confirmation does not belong to the prompt currently open.
    ConfirmationMismatch,
    /// The requested transition is not valid from the current state.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// The pending plan.
        expected: PlanId,
        /// The plan the caller named.
        got: PlanId,
    },
    /// Version changed since the plan was created.
    VersionMismatch {
        /// Version the plan was built for.
        expected: usize,
        /// Version the machine would reach now.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// The pending plan.
        expected: PlanId,
        /// The plan the caller named.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition waiting for its store write to succeed.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Tracking state the plan leads to once applied.
    pub to: Tracking,
    /// The action that produced the plan.
    pub action: PreferenceAction,
    /// Store mutation that must succeed before the plan is applied.
    pub write: StoreWrite,
    /// Version the machine will have after applying.
    pub version_next: usize,
    /// When the plan was created.
    pub pending_since: Instant,
}

/// Per-user preference state machine.
///
/// Every mutation is a plan: the caller persists [`Plan::write`] and only then
/// applies the plan. Opting in or out additionally needs a confirmation token
/// obtained through [`PreferenceStateMachine::request_confirmation`].
#[derive(Debug, Clone)]
pub struct PreferenceStateMachine {
    user_id: Uuid,
    tracking: Tracking,
    version: usize,
    awaiting: Option<(Uuid, ConfirmKind)>,
    pending: Option<Plan>,
}

impl PreferenceStateMachine {
    /// Machine for `user_id` whose record has not been looked up yet.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            tracking: Tracking::Unknown,
            version: 0,
            awaiting: None,
            pending: None,
        }
    }

    /// Current tracking state.
    pub fn tracking(&self) -> &Tracking {
        &self.tracking
    }

    /// Seed the state from the persisted record looked up at connection time.
    pub fn load(&mut self, record: Option<UserEntity>) -> &Tracking {
        self.tracking = match record {
            Some(user) => Tracking::OptedIn(user),
            None => Tracking::NotTracked,
        };
        self.version += 1;
        &self.tracking
    }

    /// Open a confirmation for opting in or out, if that action is valid now.
    pub fn request_confirmation(
        &mut self,
        kind: ConfirmKind,
    ) -> Result<ConfirmationRequest, PlanError> {
        if self.pending.is_some() || self.awaiting.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let valid = match kind {
            ConfirmKind::OptIn => self.tracking.accepts_opt_in(),
            ConfirmKind::OptOut => matches!(self.tracking, Tracking::OptedIn(_)),
        };
        if !valid {
            let action = match kind {
                ConfirmKind::OptIn => PreferenceAction::OptIn,
                ConfirmKind::OptOut => PreferenceAction::OptOut,
            };
            return Err(PlanError::InvalidTransition(InvalidTransition {
                from: self.tracking.clone(),
                action,
            }));
        }

        let id = Uuid::new_v4();
        self.awaiting = Some((id, kind));
        Ok(ConfirmationRequest { id, kind })
    }

    /// Drop an open confirmation (prompt declined or failed).
    pub fn cancel_confirmation(&mut self, id: Uuid) {
        if self.awaiting.is_some_and(|(awaiting, _)| awaiting == id) {
            self.awaiting = None;
        }
    }

    /// Validate `event` against the current state and reserve it as the pending plan.
    pub fn plan(&mut self, event: PreferenceEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        if let PreferenceEvent::OptIn { confirmation, .. } | PreferenceEvent::OptOut { confirmation } =
            &event
        {
            match self.awaiting {
                Some((id, kind)) if id == confirmation.id && kind == confirmation.kind => {
                    self.awaiting = None;
                }
                _ => return Err(PlanError::ConfirmationMismatch),
            }
        }

        let action = event.action();
        let (to, write) = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            to,
            action,
            write,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };
        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition once its store write succeeded.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<Tracking, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.tracking = plan.to;
        self.version = plan.version_next;

        Ok(self.tracking.clone())
    }

    /// Abort a planned transition, leaving the state untouched.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(
        &self,
        event: PreferenceEvent,
    ) -> Result<(Tracking, StoreWrite), InvalidTransition> {
        let action = event.action();
        let next = match (&self.tracking, event) {
            (from, PreferenceEvent::OptIn { name, .. }) if from.accepts_opt_in() => {
                let user = UserEntity::opted_in(self.user_id, name);
                (Tracking::OptedIn(user.clone()), StoreWrite::Upsert(user))
            }
            (Tracking::OptedIn(user), PreferenceEvent::OptOut { .. }) => {
                (Tracking::OptedOut, StoreWrite::Delete(user.id))
            }
            (Tracking::OptedIn(user), PreferenceEvent::SelectMode { mode, name }) => {
                let user = UserEntity {
                    name,
                    presentation_mode: mode,
                    ..user.clone()
                };
                (Tracking::OptedIn(user.clone()), StoreWrite::Upsert(user))
            }
            (Tracking::OptedIn(user), PreferenceEvent::AdjustFit { step, name }) => {
                let user = UserEntity {
                    name,
                    fit_offset: user.adjusted_fit(step.delta()),
                    ..user.clone()
                };
                (Tracking::OptedIn(user.clone()), StoreWrite::Upsert(user))
            }
            (from, _) => {
                return Err(InvalidTransition {
                    from: from.clone(),
                    action,
                });
            }
        };

        Ok(next)
    }
}
