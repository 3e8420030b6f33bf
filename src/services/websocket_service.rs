use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::{FutureExt, SinkExt, StreamExt, future::BoxFuture};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        render::RenderPlan,
        ws::{HostInboundMessage, HostOutboundMessage, MenuView, UserJoined},
    },
    error::ServiceError,
    services::{preference_service::run_session_worker, presenter::Presenter},
    state::{
        SessionCommand, SessionHandle, SharedState, UserSession, state_machine::PromptOutcome,
    },
};

struct PendingPrompt {
    user_id: Uuid,
    reply: oneshot::Sender<PromptOutcome>,
}

/// One presentation host socket, acting as the [`Presenter`] of every user it reported.
pub struct HostConnection {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Message>,
    prompts: DashMap<Uuid, PendingPrompt>,
    closed: AtomicBool,
}

impl HostConnection {
    /// Wrap the writer channel of a freshly accepted socket.
    pub fn new(outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbound,
            prompts: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Identifier tagging the sessions this connection opened.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Route a prompt answer to the interaction waiting on it.
    pub fn resolve_prompt(&self, prompt_id: Uuid, submitted: bool) -> Result<(), ServiceError> {
        let (_, pending) = self
            .prompts
            .remove(&prompt_id)
            .ok_or_else(|| ServiceError::NotFound(format!("prompt `{prompt_id}` is not open")))?;
        let outcome = if submitted {
            PromptOutcome::Submitted
        } else {
            PromptOutcome::Declined
        };
        let _ = pending.reply.send(outcome);
        Ok(())
    }

    /// Mark the host gone; every open and future prompt resolves as declined.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.prompts.clear();
    }

    fn send_error(&self, message: String) {
        send_message_to_websocket(
            &self.outbound,
            &HostOutboundMessage::Error { message },
            "error report",
        );
    }
}

impl Presenter for HostConnection {
    fn prompt(&self, user_id: Uuid, message: &'static str) -> BoxFuture<'static, PromptOutcome> {
        if self.closed.load(Ordering::SeqCst) {
            return Box::pin(async { PromptOutcome::Declined });
        }

        let prompt_id = Uuid::new_v4();
        let (reply, answer) = oneshot::channel();
        self.prompts
            .insert(prompt_id, PendingPrompt { user_id, reply });

        let sent = send_message_to_websocket(
            &self.outbound,
            &HostOutboundMessage::Prompt {
                prompt_id,
                user_id,
                message: message.to_string(),
            },
            "confirmation prompt",
        );
        if !sent || self.closed.load(Ordering::SeqCst) {
            self.prompts.remove(&prompt_id);
        }

        // A dropped reply sender means the prompt was cancelled.
        Box::pin(async move { answer.await.unwrap_or(PromptOutcome::Declined) })
    }

    fn render(&self, user_id: Uuid, fit_offset: i32, plan: RenderPlan) {
        send_message_to_websocket(
            &self.outbound,
            &HostOutboundMessage::Render {
                user_id,
                clear: true,
                fit_offset,
                plan,
            },
            "badge render",
        );
    }

    fn show_menu(&self, user_id: Uuid, menu: MenuView) {
        send_message_to_websocket(
            &self.outbound,
            &HostOutboundMessage::Menu {
                user_id,
                participating: menu.participating,
                mode: menu.mode,
            },
            "menu update",
        );
    }

    fn cancel_prompts(&self, user_id: Uuid) {
        self.prompts.retain(|_, pending| pending.user_id != user_id);
    }
}

/// Handle the full lifecycle of a presentation host WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let connection = Arc::new(HostConnection::new(outbound_tx.clone()));
    info!(connection_id = %connection.id(), "presentation host connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(connection_id = %connection.id(), payload = %text, "received host message");

                match HostInboundMessage::from_json_str(&text) {
                    Ok(inbound) => {
                        if let Err(err) = handle_host_message(&state, &connection, inbound) {
                            warn!(
                                connection_id = %connection.id(),
                                error = %err,
                                "failed to handle host message"
                            );
                            connection.send_error(err.to_string());
                        }
                    }
                    Err(err) => {
                        warn!(
                            connection_id = %connection.id(),
                            error = %err,
                            "failed to parse or validate host message"
                        );
                        connection.send_error(err.to_string());
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(connection_id = %connection.id(), "presentation host closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id = %connection.id(), error = %err, "websocket error");
                break;
            }
        }
    }

    disconnect_host(&state, &connection);
    finalize(writer_task, outbound_tx).await;
}

/// Apply one validated host message.
pub fn handle_host_message(
    state: &SharedState,
    connection: &Arc<HostConnection>,
    message: HostInboundMessage,
) -> Result<(), ServiceError> {
    match message {
        HostInboundMessage::UserJoined(joined) => {
            open_session(state, connection, joined);
            Ok(())
        }
        HostInboundMessage::UserLeft(left) => {
            let handle = state
                .sessions()
                .remove(&left.user_id, connection.id())
                .ok_or_else(|| unknown_user(left.user_id))?;
            connection.cancel_prompts(left.user_id);
            drop(handle);
            Ok(())
        }
        HostInboundMessage::MenuAction(action) => {
            let handle = state
                .sessions()
                .get(&action.user_id)
                .filter(|handle| handle.connection_id() == connection.id())
                .ok_or_else(|| unknown_user(action.user_id))?;
            handle.submit(SessionCommand::Menu {
                action: action.action,
                name: action.name,
            })
        }
        HostInboundMessage::PromptResult(result) => {
            connection.resolve_prompt(result.prompt_id, result.submitted)
        }
    }
}

/// Register a session for a newly reported user and start its worker.
///
/// A session replacing an earlier one for the same user only starts once the
/// earlier worker stopped, so writes for one user never overlap.
fn open_session(state: &SharedState, connection: &Arc<HostConnection>, joined: UserJoined) {
    let user_id = joined.user_id;
    let presenter: Arc<dyn Presenter> = connection.clone();
    let session = Arc::new(UserSession::new(
        user_id,
        joined.name,
        joined.live_event_id,
        presenter,
    ));
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    if let Err(err) = commands_tx.send(SessionCommand::Connect) {
        warn!(user_id = %user_id, error = %err, "failed to queue session connect");
        return;
    }

    let previous = state.sessions().insert_with(user_id, |previous| {
        let predecessor = previous.map(SessionHandle::finished);
        let worker: JoinHandle<()> = tokio::spawn(run_session_worker(
            state.clone(),
            session.clone(),
            commands_rx,
            predecessor,
        ));
        let finished = async move {
            if let Err(err) = worker.await {
                warn!(user_id = %user_id, error = %err, "session worker ended abnormally");
            }
        }
        .boxed()
        .shared();
        SessionHandle::new(session.clone(), connection.id(), commands_tx, finished)
    });

    if let Some(previous) = previous {
        info!(user_id = %user_id, "replacing existing session");
        previous.session().presenter().cancel_prompts(user_id);
    }
}

/// Tear down every session the connection opened. No store mutation happens here.
fn disconnect_host(state: &SharedState, connection: &HostConnection) {
    connection.close();
    let removed = state.sessions().remove_connection(connection.id());
    info!(
        connection_id = %connection.id(),
        sessions = removed.len(),
        "presentation host disconnected"
    );
}

fn unknown_user(user_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("no session for user `{user_id}`"))
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Returns `false` when the writer is gone. Serialization failures are logged
/// and reported as sent since retrying cannot help.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
    context: &str,
) -> bool
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, context, "failed to serialize message `{value:?}`");
            return true;
        }
    };

    if tx.send(Message::Text(payload.into())).is_err() {
        debug!(context, "host writer closed; dropping message");
        return false;
    }
    true
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    let _ = outbound_tx.send(Message::Close(None));
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::time::timeout;

    use super::*;
    use crate::{
        dao::{
            dal::{Dal, DalOptions},
            testing::{CountingStore, StaticFeed, event},
        },
        dto::ws::{MenuAction, MenuActionMessage, PromptResult, UserLeft},
        state::AppState,
    };

    fn state() -> SharedState {
        let feed = StaticFeed::new(vec![event("evt-live", "Rocket Party: Crew-9", 0)], Vec::new());
        let dal = Dal::new(
            Arc::new(CountingStore::new()),
            Arc::new(feed),
            DalOptions::default(),
        );
        AppState::new(Arc::new(dal))
    }

    fn connection() -> (Arc<HostConnection>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(HostConnection::new(tx)), rx)
    }

    async fn next_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        let message = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("outbound message in time")
            .expect("writer channel open");
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    async fn next_of_type(rx: &mut mpsc::UnboundedReceiver<Message>, kind: &str) -> Value {
        loop {
            let value = next_json(rx).await;
            if value["type"] == kind {
                return value;
            }
        }
    }

    fn joined(user_id: Uuid) -> HostInboundMessage {
        HostInboundMessage::UserJoined(UserJoined {
            user_id,
            name: "Ada".into(),
            live_event_id: Some("evt-live".into()),
        })
    }

    fn menu(user_id: Uuid, action: MenuAction) -> HostInboundMessage {
        HostInboundMessage::MenuAction(MenuActionMessage {
            user_id,
            name: None,
            action,
        })
    }

    #[tokio::test]
    async fn prompt_resolves_with_host_answer() {
        let (connection, mut rx) = connection();
        let user_id = Uuid::new_v4();

        let answer = connection.prompt(user_id, "sure?");
        let prompt = next_json(&mut rx).await;
        assert_eq!(prompt["type"], "prompt");
        assert_eq!(prompt["message"], "sure?");
        let prompt_id: Uuid = serde_json::from_value(prompt["promptId"].clone()).unwrap();

        connection.resolve_prompt(prompt_id, true).unwrap();
        assert_eq!(answer.await, PromptOutcome::Submitted);
        assert!(connection.resolve_prompt(prompt_id, true).is_err());
    }

    #[tokio::test]
    async fn closing_declines_open_and_future_prompts() {
        let (connection, _rx) = connection();
        let user_id = Uuid::new_v4();

        let open = connection.prompt(user_id, "sure?");
        connection.close();

        assert_eq!(open.await, PromptOutcome::Declined);
        assert_eq!(
            connection.prompt(user_id, "again?").await,
            PromptOutcome::Declined
        );
    }

    #[tokio::test]
    async fn cancel_prompts_only_touches_that_user() {
        let (connection, mut rx) = connection();
        let leaving = Uuid::new_v4();
        let staying = Uuid::new_v4();

        let cancelled = connection.prompt(leaving, "sure?");
        let kept = connection.prompt(staying, "sure?");
        next_json(&mut rx).await;
        let kept_prompt = next_json(&mut rx).await;
        let kept_id: Uuid = serde_json::from_value(kept_prompt["promptId"].clone()).unwrap();

        connection.cancel_prompts(leaving);
        assert_eq!(cancelled.await, PromptOutcome::Declined);

        connection.resolve_prompt(kept_id, false).unwrap();
        assert_eq!(kept.await, PromptOutcome::Declined);
    }

    #[tokio::test]
    async fn user_joined_opens_session_and_draws_display() {
        let state = state();
        let (connection, mut rx) = connection();
        let user_id = Uuid::new_v4();

        handle_host_message(&state, &connection, joined(user_id)).unwrap();

        let menu = next_of_type(&mut rx, "menu").await;
        assert_eq!(menu["participating"], false);
        let render = next_of_type(&mut rx, "render").await;
        assert_eq!(render["clear"], true);
        assert_eq!(render["plan"]["kind"], "empty");
        assert_eq!(state.sessions().len(), 1);
    }

    #[tokio::test]
    async fn opt_in_round_trip_over_the_socket() {
        let state = state();
        let (connection, mut rx) = connection();
        let user_id = Uuid::new_v4();

        handle_host_message(&state, &connection, joined(user_id)).unwrap();
        next_of_type(&mut rx, "render").await;

        handle_host_message(&state, &connection, menu(user_id, MenuAction::Participate)).unwrap();
        let prompt = next_of_type(&mut rx, "prompt").await;
        let prompt_id: Uuid = serde_json::from_value(prompt["promptId"].clone()).unwrap();

        handle_host_message(
            &state,
            &connection,
            HostInboundMessage::PromptResult(PromptResult {
                prompt_id,
                submitted: true,
            }),
        )
        .unwrap();

        let menu = next_of_type(&mut rx, "menu").await;
        assert_eq!(menu["participating"], true);
        assert_eq!(menu["mode"], "badges");
        let render = next_of_type(&mut rx, "render").await;
        assert_eq!(render["plan"]["kind"], "badges");
        assert_eq!(render["plan"]["cells"][0]["eventId"], "evt-live");
    }

    #[tokio::test]
    async fn messages_for_unknown_users_are_rejected() {
        let state = state();
        let (connection, _rx) = connection();
        let user_id = Uuid::new_v4();

        assert!(matches!(
            handle_host_message(&state, &connection, menu(user_id, MenuAction::ShowCount)),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            handle_host_message(
                &state,
                &connection,
                HostInboundMessage::UserLeft(UserLeft { user_id })
            ),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn other_connections_cannot_drive_a_session() {
        let state = state();
        let (owner, _owner_rx) = connection();
        let (intruder, _intruder_rx) = connection();
        let user_id = Uuid::new_v4();

        handle_host_message(&state, &owner, joined(user_id)).unwrap();

        assert!(handle_host_message(&state, &intruder, menu(user_id, MenuAction::ShowCount)).is_err());
        assert!(
            handle_host_message(
                &state,
                &intruder,
                HostInboundMessage::UserLeft(UserLeft { user_id })
            )
            .is_err()
        );
        assert_eq!(state.sessions().len(), 1);
    }

    #[tokio::test]
    async fn rejoin_waits_for_previous_worker() {
        let state = state();
        let (connection, mut rx) = connection();
        let user_id = Uuid::new_v4();

        handle_host_message(&state, &connection, joined(user_id)).unwrap();
        next_of_type(&mut rx, "render").await;
        handle_host_message(&state, &connection, menu(user_id, MenuAction::Participate)).unwrap();
        next_of_type(&mut rx, "prompt").await;
        let first_done = state.sessions().get(&user_id).unwrap().finished();

        handle_host_message(&state, &connection, joined(user_id)).unwrap();

        // The replaced worker's prompt is declined, it drains and stops before
        // the new session draws anything.
        timeout(Duration::from_secs(2), first_done)
            .await
            .expect("previous worker stopped");
        let menu = next_of_type(&mut rx, "menu").await;
        assert_eq!(menu["participating"], false);
        assert_eq!(state.sessions().len(), 1);
    }

    #[tokio::test]
    async fn host_disconnect_removes_its_sessions() {
        let state = state();
        let (connection, _rx) = connection();
        handle_host_message(&state, &connection, joined(Uuid::new_v4())).unwrap();
        handle_host_message(&state, &connection, joined(Uuid::new_v4())).unwrap();
        assert_eq!(state.sessions().len(), 2);

        disconnect_host(&state, &connection);

        assert!(state.sessions().is_empty());
    }
}
