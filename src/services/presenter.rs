//! Boundary between the preference core and whatever draws the user's badges.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dto::{render::RenderPlan, ws::MenuView},
    state::state_machine::PromptOutcome,
};

/// Outbound side of the presentation host.
///
/// `render` and `show_menu` are fire-and-forget: a host that went away simply
/// drops them. `prompt` resolves to [`PromptOutcome::Declined`] when the host
/// cannot answer.
pub trait Presenter: Send + Sync {
    /// Ask the user a yes/no question.
    fn prompt(&self, user_id: Uuid, message: &'static str) -> BoxFuture<'static, PromptOutcome>;

    /// Clear the user's display and draw `plan` in its place.
    fn render(&self, user_id: Uuid, fit_offset: i32, plan: RenderPlan);

    /// Update the participation menu.
    fn show_menu(&self, user_id: Uuid, menu: MenuView);

    /// Resolve every prompt still open for `user_id` as declined.
    fn cancel_prompts(&self, user_id: Uuid);
}
