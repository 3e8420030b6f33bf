use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use reqwest::Client;
use serde::Deserialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, warn};

use crate::dao::models::EventEntity;

use super::{EventFeed, FeedError, FeedResult};

/// Connection settings for the remote event feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// First page of the upcoming events listing.
    pub upcoming_url: String,
    /// First page of the historical events listing.
    pub past_url: String,
    /// Upper bound for one page request.
    pub request_timeout: Duration,
    /// Historical events older than this are ignored.
    pub history_window: time::Duration,
}

#[derive(Debug, Deserialize)]
struct ApiEventsResponse {
    #[serde(default)]
    events: Vec<ApiEvent>,
    #[serde(default)]
    pagination: Option<ApiPagination>,
}

#[derive(Debug, Deserialize)]
struct ApiPagination {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    event_id: String,
    name: String,
    start_time: String,
    image_small: String,
}

impl TryFrom<ApiEvent> for EventEntity {
    type Error = FeedError;

    fn try_from(value: ApiEvent) -> Result<Self, Self::Error> {
        let timestamp = OffsetDateTime::parse(&value.start_time, &Rfc3339).map_err(|source| {
            FeedError::InvalidStartTime {
                event_id: value.event_id.clone(),
                value: value.start_time.clone(),
                source,
            }
        })?;
        Ok(Self {
            id: value.event_id,
            name: value.name,
            timestamp,
            badge_url: value.image_small,
        })
    }
}

/// Event feed backed by the public channel events API.
#[derive(Clone)]
pub struct HttpEventFeed {
    client: Client,
    config: Arc<FeedConfig>,
}

impl HttpEventFeed {
    /// Build the HTTP client for `config`.
    pub fn new(config: FeedConfig) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| FeedError::ClientBuilder { source })?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    async fn fetch_page(&self, url: &str, token: Option<&str>) -> FeedResult<ApiEventsResponse> {
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.query(&[("token", token)]);
        }

        let response = request.send().await.map_err(|source| FeedError::Request {
            url: url.to_string(),
            source,
        })?;

        if !response.status().is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ApiEventsResponse>()
            .await
            .map_err(|source| FeedError::Decode {
                url: url.to_string(),
                source,
            })
    }

    /// Follow continuation tokens until the provider stops handing them out.
    async fn fetch_all(&self, url: &str) -> FeedResult<Vec<ApiEvent>> {
        let mut events = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.fetch_page(url, token.as_deref()).await?;
            events.extend(page.events);

            let next = page
                .pagination
                .and_then(|pagination| pagination.token)
                .filter(|next| !next.is_empty());
            match next {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    warn!(%url, token = %next, "event feed repeated its continuation token; stopping");
                    break;
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!(%url, count = events.len(), "fetched event feed");
        Ok(events)
    }
}

/// Convert raw records, drop those older than `since` and collapse repeated ids.
fn collect_events(
    raw: Vec<ApiEvent>,
    since: Option<OffsetDateTime>,
) -> FeedResult<Vec<EventEntity>> {
    let mut by_id = IndexMap::new();
    for api_event in raw {
        let event = EventEntity::try_from(api_event)?;
        if since.is_some_and(|cutoff| event.timestamp <= cutoff) {
            continue;
        }
        by_id.insert(event.id.clone(), event);
    }
    Ok(by_id.into_values().collect())
}

impl EventFeed for HttpEventFeed {
    fn upcoming_events(&self) -> BoxFuture<'static, FeedResult<Vec<EventEntity>>> {
        let feed = self.clone();
        Box::pin(async move {
            let raw = feed.fetch_all(&feed.config.upcoming_url).await?;
            collect_events(raw, None)
        })
    }

    fn past_events(&self) -> BoxFuture<'static, FeedResult<Vec<EventEntity>>> {
        let feed = self.clone();
        Box::pin(async move {
            let raw = feed.fetch_all(&feed.config.past_url).await?;
            let cutoff = OffsetDateTime::now_utc() - feed.config.history_window;
            collect_events(raw, Some(cutoff))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn api_event(id: &str, name: &str, start_time: &str) -> ApiEvent {
        ApiEvent {
            event_id: id.into(),
            name: name.into(),
            start_time: start_time.into(),
            image_small: format!("https://example.org/{id}.png"),
        }
    }

    #[test]
    fn parses_feed_page_payload() {
        let payload = r#"{
            "events": [
                {"event_id": "101", "name": "Rocket Party: Crew-5", "start_time": "2022-10-05T16:00:00Z", "image_small": "https://example.org/101.png", "extra": 1}
            ],
            "pagination": {"token": "abc"}
        }"#;
        let page: ApiEventsResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(
            page.pagination.and_then(|p| p.token).as_deref(),
            Some("abc")
        );

        let last_page: ApiEventsResponse =
            serde_json::from_str(r#"{"events": [], "pagination": {"token": null}}"#).unwrap();
        assert!(last_page.pagination.and_then(|p| p.token).is_none());
    }

    #[test]
    fn history_window_drops_old_events() {
        let raw = vec![
            api_event("1", "Old", "2019-01-01T00:00:00Z"),
            api_event("2", "Recent", "2023-06-01T00:00:00Z"),
        ];
        let events = collect_events(raw, Some(datetime!(2022-01-01 0:00 UTC))).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "2");
    }

    #[test]
    fn repeated_ids_keep_latest_record() {
        let raw = vec![
            api_event("1", "First", "2023-06-01T00:00:00Z"),
            api_event("1", "Renamed", "2023-06-02T00:00:00Z"),
        ];
        let events = collect_events(raw, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Renamed");
        assert_eq!(events[0].timestamp, datetime!(2023-06-02 0:00 UTC));
    }

    #[test]
    fn invalid_start_time_is_reported() {
        let raw = vec![api_event("9", "Broken", "yesterday")];
        let err = collect_events(raw, None).unwrap_err();
        assert!(matches!(err, FeedError::InvalidStartTime { event_id, .. } if event_id == "9"));
    }
}
