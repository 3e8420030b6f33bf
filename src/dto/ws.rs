use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::PresentationMode, dto::render::RenderPlan, state::state_machine::Tracking,
};

/// Reasons an inbound frame from the host is rejected.
#[derive(Debug, Error)]
pub enum InboundError {
    /// Not JSON, or not a known message shape.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    /// Well-formed but carrying out-of-range values.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from the presentation host WebSocket.
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostInboundMessage {
    /// A user connected to the live session.
    UserJoined(UserJoined),
    /// A user left the live session.
    UserLeft(UserLeft),
    /// A user picked a menu entry.
    MenuAction(MenuActionMessage),
    /// The answer to a confirmation prompt.
    PromptResult(PromptResult),
}

impl HostInboundMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }
}

impl Validate for HostInboundMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::UserJoined(joined) => joined.validate(),
            Self::MenuAction(action) => action.validate(),
            Self::UserLeft(_) | Self::PromptResult(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
/// A user entered the live session.
pub struct UserJoined {
    /// Stable identity assigned by the host.
    pub user_id: Uuid,
    /// Current display name.
    #[validate(length(min = 1, max = 160))]
    pub name: String,
    /// Identifier of the event the user is attending right now, if any.
    #[validate(length(min = 1, max = 20))]
    #[serde(default)]
    pub live_event_id: Option<String>,
}

/// A user left the live session.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    /// Identity reported in the matching `userJoined`.
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
/// A menu interaction, optionally carrying the user's current display name.
pub struct MenuActionMessage {
    /// User who picked the entry.
    pub user_id: Uuid,
    /// Display name at the time of the action.
    #[validate(length(min = 1, max = 160))]
    #[serde(default)]
    pub name: Option<String>,
    /// The entry picked.
    pub action: MenuAction,
}

/// Entries of the participation menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum MenuAction {
    /// Toggle participation; always asks for confirmation.
    Participate,
    /// Hide the badges.
    ShowNone,
    /// Show the attendance count.
    ShowCount,
    /// Show individual badges.
    ShowBadges,
    /// Widen the badge spacing.
    FitLooser,
    /// Narrow the badge spacing.
    FitTighter,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Answer to a confirmation prompt.
pub struct PromptResult {
    /// Prompt being answered.
    pub prompt_id: Uuid,
    /// `true` when the user accepted.
    pub submitted: bool,
}

/// Menu state the host shows for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct MenuView {
    /// Whether attendance is tracked.
    pub participating: bool,
    /// Selected presentation mode, while participating.
    pub mode: Option<PresentationMode>,
}

impl From<&Tracking> for MenuView {
    fn from(tracking: &Tracking) -> Self {
        let record = tracking.record();
        Self {
            participating: record.is_some(),
            mode: record.map(|user| user.presentation_mode),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to the presentation host.
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostOutboundMessage {
    /// Participation menu state.
    #[serde(rename_all = "camelCase")]
    Menu {
        /// User the menu belongs to.
        user_id: Uuid,
        /// Whether attendance is tracked.
        participating: bool,
        /// Selected presentation mode, while participating.
        mode: Option<PresentationMode>,
    },
    /// Full replacement of the user's display: the host clears first.
    #[serde(rename_all = "camelCase")]
    Render {
        /// User whose display is replaced.
        user_id: Uuid,
        /// Always `true`: remove every previous child first.
        clear: bool,
        /// Spacing adjustment for the badge anchor.
        fit_offset: i32,
        /// What to draw.
        plan: RenderPlan,
    },
    /// Yes/no question to show the user.
    #[serde(rename_all = "camelCase")]
    Prompt {
        /// Identifier to echo back in `promptResult`.
        prompt_id: Uuid,
        /// User being asked.
        user_id: Uuid,
        /// Question text.
        message: String,
    },
    /// An inbound message was rejected.
    Error {
        /// Why it was rejected.
        message: String,
    },
}
