//! Turns a user's attendance history into a render plan.
//!
//! Pure and synchronous: callers load the joinings and the event catalog
//! through the data access layer and hand them over.

use crate::{
    dao::models::{EventCatalog, EventEntity, JoiningEntity, PresentationMode},
    dto::render::{BadgeCell, RenderPlan},
};

/// Maximum number of badges shown at once.
pub const DISPLAY_CAP: usize = 20;
/// Columns of the badge grid, filled right to left.
pub const GRID_COLUMNS: usize = 4;

/// Events to display, in joining order, after resolution and series deduplication.
///
/// Joinings whose event is not in the catalog are skipped. Only the first
/// event of the recurring series survives.
pub fn deduplicated_events<'a>(
    joinings: &[JoiningEntity],
    catalog: &'a EventCatalog,
) -> Vec<&'a EventEntity> {
    let mut series_seen = false;
    joinings
        .iter()
        .filter_map(|joining| catalog.get(&joining.event_id))
        .filter(|event| {
            if !event.is_recurring_series() {
                return true;
            }
            !std::mem::replace(&mut series_seen, true)
        })
        .collect()
}

/// Grid position of the `index`-th badge: rows top-down, columns right to left.
pub fn grid_position(index: usize) -> (usize, usize) {
    (index / GRID_COLUMNS, GRID_COLUMNS - 1 - index % GRID_COLUMNS)
}

/// Compute the full replacement display for a user.
pub fn assign_badges(
    mode: PresentationMode,
    joinings: &[JoiningEntity],
    catalog: &EventCatalog,
) -> RenderPlan {
    match mode {
        PresentationMode::None => RenderPlan::Empty,
        PresentationMode::Count => RenderPlan::Count {
            label: joinings.len().to_string(),
        },
        PresentationMode::Badges => {
            let events = deduplicated_events(joinings, catalog);
            let total = events.len();
            let cells = events
                .into_iter()
                .take(DISPLAY_CAP)
                .enumerate()
                .map(|(index, event)| {
                    let (row, column) = grid_position(index);
                    BadgeCell {
                        row,
                        column,
                        event_id: event.id.clone(),
                        badge_url: event.badge_url.clone(),
                        short_name: event.short_name().to_string(),
                    }
                })
                .collect::<Vec<_>>();
            let overflow_label = (cells.len() < total).then(|| format!("+ {}", total - cells.len()));
            RenderPlan::Badges {
                cells,
                overflow_label,
            }
        }
    }
}
