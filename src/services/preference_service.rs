//! Preference interactions of one connected user.
//!
//! Every mutating action goes interaction, confirmation when required, store
//! write, then badge recompute. Nothing is shown to the host before the store
//! write succeeded.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    dao::models::PresentationMode,
    dto::{render::RenderPlan, ws::MenuAction},
    error::ServiceError,
    services::badge_engine::assign_badges,
    state::{
        SessionCommand, SharedState, UserSession,
        registry::WorkerDone,
        state_machine::{ConfirmKind, Confirmation, FitStep, PreferenceEvent, Tracking},
        transitions::run_transition_with_menu,
    },
};

/// Process a session's queued commands one at a time until its queue closes.
///
/// With a `predecessor`, nothing is processed before that worker stopped.
pub async fn run_session_worker(
    state: SharedState,
    session: Arc<UserSession>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    predecessor: Option<WorkerDone>,
) {
    if let Some(previous) = predecessor {
        debug!(user_id = %session.user_id(), "waiting for replaced session to stop");
        previous.await;
    }

    while let Some(command) = commands.recv().await {
        let result = match &command {
            SessionCommand::Connect => connect(&state, &session).await.map(|_| ()),
            SessionCommand::Menu { action, name } => {
                handle_menu_action(&state, &session, *action, name.clone()).await
            }
        };

        if let Err(err) = result {
            warn!(
                user_id = %session.user_id(),
                command = ?command,
                error = %err,
                "interaction failed"
            );
        }
    }

    disconnect(&session);
}

/// Load the user's record, draw the menu, record attendance and draw the badges.
pub async fn connect(state: &SharedState, session: &UserSession) -> Result<Tracking, ServiceError> {
    let user_id = session.user_id();
    let record = state.dal().get_user(user_id).await?;
    let tracking = session.load(record).await;
    session.show_menu(&tracking);
    info!(
        user_id = %user_id,
        participating = tracking.record().is_some(),
        "session connected"
    );

    if tracking.record().is_some() {
        record_attendance(state, session).await;
    }
    refresh_display(state, session, &tracking).await?;

    Ok(tracking)
}

/// Discard the session's transient state. The persisted record is left alone.
pub fn disconnect(session: &UserSession) {
    info!(user_id = %session.user_id(), "session disconnected");
}

/// Dispatch one menu interaction.
pub async fn handle_menu_action(
    state: &SharedState,
    session: &UserSession,
    action: MenuAction,
    name: Option<String>,
) -> Result<(), ServiceError> {
    if let Some(name) = name {
        session.rename(name).await;
    }

    match action {
        MenuAction::Participate => toggle_participation(state, session).await,
        MenuAction::ShowNone => select_mode(state, session, PresentationMode::None).await,
        MenuAction::ShowCount => select_mode(state, session, PresentationMode::Count).await,
        MenuAction::ShowBadges => select_mode(state, session, PresentationMode::Badges).await,
        MenuAction::FitLooser => adjust_fit(state, session, FitStep::Looser).await,
        MenuAction::FitTighter => adjust_fit(state, session, FitStep::Tighter).await,
    }
}

async fn toggle_participation(state: &SharedState, session: &UserSession) -> Result<(), ServiceError> {
    match session.tracking().await {
        Tracking::OptedIn(_) => opt_out(state, session).await,
        _ => opt_in(state, session).await,
    }
}

async fn opt_in(state: &SharedState, session: &UserSession) -> Result<(), ServiceError> {
    let Some(confirmation) = confirm(session, ConfirmKind::OptIn).await? else {
        return Ok(());
    };

    let name = session.display_name().await;
    let next = transition(state, session, PreferenceEvent::OptIn { confirmation, name }).await?;
    info!(user_id = %session.user_id(), "user opted in");

    record_attendance(state, session).await;
    refresh_display(state, session, &next).await
}

async fn opt_out(state: &SharedState, session: &UserSession) -> Result<(), ServiceError> {
    let Some(confirmation) = confirm(session, ConfirmKind::OptOut).await? else {
        return Ok(());
    };

    let next = transition(state, session, PreferenceEvent::OptOut { confirmation }).await?;
    info!(user_id = %session.user_id(), "user opted out");

    refresh_display(state, session, &next).await
}

/// Ask the host for a yes/no answer; `None` when the user declined.
async fn confirm(
    session: &UserSession,
    kind: ConfirmKind,
) -> Result<Option<Confirmation>, ServiceError> {
    let request = session.request_confirmation(kind).await?;
    let request_id = request.id();
    let outcome = session
        .presenter()
        .prompt(session.user_id(), kind.message())
        .await;

    match request.resolve(outcome) {
        Some(confirmation) => Ok(Some(confirmation)),
        None => {
            session.cancel_confirmation(request_id).await;
            info!(user_id = %session.user_id(), kind = ?kind, "confirmation declined");
            Ok(None)
        }
    }
}

async fn select_mode(
    state: &SharedState,
    session: &UserSession,
    mode: PresentationMode,
) -> Result<(), ServiceError> {
    let Some(name) = participant_name(session).await else {
        debug!(user_id = %session.user_id(), mode = ?mode, "ignoring mode change from untracked user");
        return Ok(());
    };
    update_preferences(state, session, PreferenceEvent::SelectMode { mode, name }).await
}

async fn adjust_fit(
    state: &SharedState,
    session: &UserSession,
    step: FitStep,
) -> Result<(), ServiceError> {
    let Some(name) = participant_name(session).await else {
        debug!(user_id = %session.user_id(), step = ?step, "ignoring fit change from untracked user");
        return Ok(());
    };
    update_preferences(state, session, PreferenceEvent::AdjustFit { step, name }).await
}

/// Live display name, only while the user participates.
async fn participant_name(session: &UserSession) -> Option<String> {
    session.record().await?;
    Some(session.display_name().await)
}

async fn update_preferences(
    state: &SharedState,
    session: &UserSession,
    event: PreferenceEvent,
) -> Result<(), ServiceError> {
    let next = transition(state, session, event).await?;
    refresh_display(state, session, &next).await
}

/// Run a preference transition. When its store write failed or timed out the
/// write may still have landed, so the session is reloaded from the store.
async fn transition(
    state: &SharedState,
    session: &UserSession,
    event: PreferenceEvent,
) -> Result<Tracking, ServiceError> {
    match run_transition_with_menu(state, session, event).await {
        Err(err @ (ServiceError::Timeout | ServiceError::Unavailable(_))) => {
            resync(state, session).await;
            Err(err)
        }
        result => result,
    }
}

async fn resync(state: &SharedState, session: &UserSession) {
    let user_id = session.user_id();
    let record = match state.dal().get_user(user_id).await {
        Ok(record) => record,
        Err(err) => {
            warn!(user_id = %user_id, error = %err, "failed to reload session after store error");
            return;
        }
    };

    let tracking = session.load(record).await;
    session.show_menu(&tracking);
    info!(
        user_id = %user_id,
        participating = tracking.record().is_some(),
        "session reloaded after store error"
    );
    if let Err(err) = refresh_display(state, session, &tracking).await {
        warn!(user_id = %user_id, error = %err, "failed to redraw after reload");
    }
}

async fn record_attendance(state: &SharedState, session: &UserSession) {
    if let Err(err) = award_attendance(state, session).await {
        warn!(user_id = %session.user_id(), error = %err, "failed to record attendance");
    }
}

/// Record a joining for the user's live event when it is a known event.
/// Returns whether a new joining was stored.
pub async fn award_attendance(
    state: &SharedState,
    session: &UserSession,
) -> Result<bool, ServiceError> {
    let Some(event_id) = session.live_event_id() else {
        return Ok(false);
    };

    let catalog = state.dal().get_events().await?;
    if catalog.get(event_id).is_none() {
        debug!(user_id = %session.user_id(), event_id, "live event is not a known event");
        return Ok(false);
    }

    let inserted = state.dal().add_joining(session.user_id(), event_id).await?;
    if inserted {
        info!(user_id = %session.user_id(), event_id, "user attended valid event");
    }
    Ok(inserted)
}

/// Recompute the user's badges and replace whatever the host shows.
pub async fn refresh_display(
    state: &SharedState,
    session: &UserSession,
    tracking: &Tracking,
) -> Result<(), ServiceError> {
    let user_id = session.user_id();
    let Some(user) = tracking.record() else {
        session.presenter().render(user_id, 0, RenderPlan::Empty);
        return Ok(());
    };

    let plan = match user.presentation_mode {
        PresentationMode::None => RenderPlan::Empty,
        mode => {
            let dal = state.dal();
            let (catalog, joinings) =
                tokio::try_join!(dal.get_events(), dal.get_joinings(user_id))?;
            assign_badges(mode, &joinings, &catalog)
        }
    };

    debug!(user_id = %user_id, cells = plan.cell_count(), "computed badge plan");
    session.presenter().render(user_id, user.fit_offset, plan);
    Ok(())
}
