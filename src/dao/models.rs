use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Case-insensitive marker of the recurring launch series collapsed to one badge.
static RECURRING_SERIES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)starlink").expect("valid series regex"));

/// Strips the optional "[SCRUBBED] " and "Rocket Party: " prefixes from event names.
static SHORT_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\[SCRUBBED\] )?(?:Rocket Party: )?(.*)$").expect("valid short name regex")
});

/// How a participating user wants their attendance displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PresentationMode {
    /// Nothing is displayed.
    None,
    /// A single label with the raw attendance count.
    Count,
    /// One badge per attended event.
    Badges,
}

impl PresentationMode {
    /// Integer stored in the `presentation_mode` column.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Count => 1,
            Self::Badges => 2,
        }
    }
}

impl TryFrom<i32> for PresentationMode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Count),
            2 => Ok(Self::Badges),
            other => Err(other),
        }
    }
}

/// Persisted preferences of a user who opted in to attendance tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntity {
    /// Stable identity handed over by the presentation host.
    pub id: Uuid,
    /// Display name, refreshed on every mutating menu action.
    pub name: String,
    /// Selected presentation style.
    pub presentation_mode: PresentationMode,
    /// Spacing adjustment, always within [`FIT_OFFSET_MIN`, `FIT_OFFSET_MAX`].
    pub fit_offset: i32,
}

/// Lowest accepted fit offset.
pub const FIT_OFFSET_MIN: i32 = -10;
/// Highest accepted fit offset.
pub const FIT_OFFSET_MAX: i32 = 10;

impl UserEntity {
    /// Record created by a fresh opt-in.
    pub fn opted_in(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            presentation_mode: PresentationMode::Badges,
            fit_offset: 0,
        }
    }

    /// Apply a saturating fit adjustment.
    pub fn adjusted_fit(&self, delta: i32) -> i32 {
        self.fit_offset
            .saturating_add(delta)
            .clamp(FIT_OFFSET_MIN, FIT_OFFSET_MAX)
    }
}

/// Event known to the system, sourced from the event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntity {
    /// Stable external identifier.
    pub id: String,
    /// Full event name as published by the feed.
    pub name: String,
    /// Event start time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Locator of the badge graphic.
    pub badge_url: String,
}

impl EventEntity {
    /// Event name without the party prefixes, falling back to the full name.
    pub fn short_name(&self) -> &str {
        SHORT_NAME_REGEX
            .captures(&self.name)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
            .unwrap_or(&self.name)
    }

    /// Whether this event belongs to the recurring launch series.
    pub fn is_recurring_series(&self) -> bool {
        RECURRING_SERIES_REGEX.is_match(&self.name)
    }
}

/// Resolved event collection, newest first, indexed by event id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCatalog {
    events: IndexMap<String, EventEntity>,
}

impl EventCatalog {
    /// Lookup an event by its external identifier.
    pub fn get(&self, id: &str) -> Option<&EventEntity> {
        self.events.get(id)
    }

    /// Iterate events in catalog order (newest first).
    pub fn iter(&self) -> impl Iterator<Item = &EventEntity> {
        self.events.values()
    }

    /// Number of events in the catalog.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the catalog holds no event.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl FromIterator<EventEntity> for EventCatalog {
    fn from_iter<T: IntoIterator<Item = EventEntity>>(iter: T) -> Self {
        Self {
            events: iter
                .into_iter()
                .map(|event| (event.id.clone(), event))
                .collect(),
        }
    }
}

/// Record that a user attended an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoiningEntity {
    /// Attending user.
    pub user_id: Uuid,
    /// Attended event.
    pub event_id: String,
    /// When the attendance was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn event(name: &str) -> EventEntity {
        EventEntity {
            id: "1".into(),
            name: name.into(),
            timestamp: datetime!(2022-03-01 18:00 UTC),
            badge_url: "https://example.org/badge.png".into(),
        }
    }

    #[test]
    fn short_name_strips_prefixes() {
        assert_eq!(
            event("[SCRUBBED] Rocket Party: Falcon Heavy").short_name(),
            "Falcon Heavy"
        );
        assert_eq!(event("Rocket Party: Crew-4").short_name(), "Crew-4");
        assert_eq!(event("[SCRUBBED] Artemis I").short_name(), "Artemis I");
        assert_eq!(event("Artemis I").short_name(), "Artemis I");
    }

    #[test]
    fn short_name_falls_back_to_full_name() {
        let multiline = event("Rocket Party: first\nsecond");
        assert_eq!(multiline.short_name(), "Rocket Party: first\nsecond");
    }

    #[test]
    fn recurring_series_is_case_insensitive() {
        assert!(event("Rocket Party: STARLINK 4-12").is_recurring_series());
        assert!(event("starlink group 2").is_recurring_series());
        assert!(!event("Rocket Party: Crew-4").is_recurring_series());
    }

    #[test]
    fn fit_adjustment_saturates() {
        let mut user = UserEntity::opted_in(Uuid::new_v4(), "Ada");
        user.fit_offset = FIT_OFFSET_MAX;
        assert_eq!(user.adjusted_fit(1), FIT_OFFSET_MAX);
        user.fit_offset = FIT_OFFSET_MIN;
        assert_eq!(user.adjusted_fit(-1), FIT_OFFSET_MIN);
        user.fit_offset = 3;
        assert_eq!(user.adjusted_fit(-1), 2);
    }

    #[test]
    fn presentation_mode_roundtrips_through_column_value() {
        for mode in [
            PresentationMode::None,
            PresentationMode::Count,
            PresentationMode::Badges,
        ] {
            assert_eq!(PresentationMode::try_from(mode.as_i32()), Ok(mode));
        }
        assert_eq!(PresentationMode::try_from(7), Err(7));
    }
}
