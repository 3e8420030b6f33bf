use serde::Serialize;
use utoipa::ToSchema;

/// One badge placed on the user's grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BadgeCell {
    /// Grid row, counted from the top.
    pub row: usize,
    /// Grid column, counted from the right.
    pub column: usize,
    /// Event the badge stands for.
    pub event_id: String,
    /// Badge graphic.
    pub badge_url: String,
    /// Caption under the badge.
    pub short_name: String,
}

/// What the host should show for a user once it has cleared the previous display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RenderPlan {
    /// Nothing to show.
    Empty,
    /// A single attendance count label.
    Count {
        /// Text of the label.
        label: String,
    },
    /// Badge cells plus an optional "+ N" label for badges that did not fit.
    #[serde(rename_all = "camelCase")]
    Badges {
        /// Placed badges in display order.
        cells: Vec<BadgeCell>,
        /// Count of badges left out, when any.
        overflow_label: Option<String>,
    },
}

impl RenderPlan {
    /// Number of badge cells in the plan.
    pub fn cell_count(&self) -> usize {
        match self {
            RenderPlan::Badges { cells, .. } => cells.len(),
            _ => 0,
        }
    }
}
