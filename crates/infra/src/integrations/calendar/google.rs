//! Google Calendar v3 implementation of the remote calendar port

use async_trait::async_trait;
use calsync_core::{DeleteOutcome, RemoteCalendar, RemoteError};
use calsync_domain::constants::DEFAULT_TIMEZONE;
use calsync_domain::{
    AccessToken, CalSyncError, CalendarEvent, DateRange, GoogleConfig, RemoteEvent,
    RemoteEventTime,
};
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::HttpClient;

const PAGE_SIZE: &str = "250";

/// Remote calendar adapter speaking the Google Calendar REST API
pub struct GoogleCalendarClient {
    http: HttpClient,
    api_base_url: String,
    calendar_id: String,
}

impl GoogleCalendarClient {
    pub fn new(
        http: HttpClient,
        api_base_url: impl Into<String>,
        calendar_id: impl Into<String>,
    ) -> Self {
        Self { http, api_base_url: api_base_url.into(), calendar_id: calendar_id.into() }
    }

    pub fn from_config(config: &GoogleConfig) -> Result<Self, CalSyncError> {
        let http = HttpClient::from_config(config)?;
        Ok(Self::new(http, config.api_base_url.clone(), config.calendar_id.clone()))
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base_url.trim_end_matches('/'),
            urlencoding::encode(&self.calendar_id)
        )
    }

    fn event_url(&self, remote_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(remote_id))
    }

    async fn execute(
        &self,
        method: Method,
        url: String,
        token: &AccessToken,
        body: Option<&GoogleEventBody>,
    ) -> Result<Response, RemoteError> {
        let mut request = self.http.request(method, url).bearer_auth(token.as_str());
        if let Some(body) = body {
            request = request.json(body);
        }
        self.http.send(request).await.map_err(|err| RemoteError::Transient(err.to_string()))
    }
}

#[async_trait]
impl RemoteCalendar for GoogleCalendarClient {
    #[instrument(skip(self, token), fields(calendar_id = %self.calendar_id))]
    async fn list_events(
        &self,
        token: &AccessToken,
        range: &DateRange,
    ) -> Result<Vec<RemoteEvent>, RemoteError> {
        let time_min = range.start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = range.end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", time_min.clone()),
                ("timeMax", time_max.clone()),
                ("singleEvents", "true".to_owned()),
                ("orderBy", "startTime".to_owned()),
                ("maxResults", PAGE_SIZE.to_owned()),
            ];
            if let Some(page) = page_token.take() {
                query.push(("pageToken", page));
            }

            let request = self
                .http
                .request(Method::GET, self.events_url())
                .bearer_auth(token.as_str())
                .query(&query);
            let response = self
                .http
                .send(request)
                .await
                .map_err(|err| RemoteError::Transient(err.to_string()))?;
            let page: GoogleEventsPage = ensure_success(response)
                .await?
                .json()
                .await
                .map_err(|err| malformed_body(&err))?;

            events.extend(page.items.into_iter().map(RemoteEvent::from));
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(count = events.len(), "listed remote events");
        Ok(events)
    }

    #[instrument(skip(self, token, event), fields(event_id = %event.id))]
    async fn create_event(
        &self,
        token: &AccessToken,
        event: &CalendarEvent,
    ) -> Result<String, RemoteError> {
        let body = GoogleEventBody::from_event(event);
        let response = self.execute(Method::POST, self.events_url(), token, Some(&body)).await?;
        let created: CreatedEvent =
            ensure_success(response).await?.json().await.map_err(|err| malformed_body(&err))?;
        Ok(created.id)
    }

    #[instrument(skip(self, token, event), fields(event_id = %event.id))]
    async fn update_event(
        &self,
        token: &AccessToken,
        remote_id: &str,
        event: &CalendarEvent,
    ) -> Result<(), RemoteError> {
        let body = GoogleEventBody::from_event(event);
        let response =
            self.execute(Method::PUT, self.event_url(remote_id), token, Some(&body)).await?;
        ensure_success(response).await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn delete_event(
        &self,
        token: &AccessToken,
        remote_id: &str,
    ) -> Result<DeleteOutcome, RemoteError> {
        let response = self.execute(Method::DELETE, self.event_url(remote_id), token, None).await?;
        if response.status() == StatusCode::GONE {
            debug!(remote_id, "remote event already gone");
            return Ok(DeleteOutcome::AlreadyGone);
        }
        ensure_success(response).await?;
        Ok(DeleteOutcome::Deleted)
    }
}

/// Classify a non-success response. Success passes through untouched.
async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GoogleErrorBody>(&body)
        .ok()
        .map(|parsed| parsed.error.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_owned());

    Err(match status {
        StatusCode::UNAUTHORIZED => RemoteError::Auth,
        StatusCode::FORBIDDEN => RemoteError::Permission(message),
        status if status.is_server_error() => {
            RemoteError::Transient(format!("status {}: {message}", status.as_u16()))
        }
        status => RemoteError::Provider { status: status.as_u16(), message },
    })
}

fn malformed_body(err: &reqwest::Error) -> RemoteError {
    RemoteError::Provider { status: 200, message: format!("malformed response body: {err}") }
}

/* -------------------------------------------------------------------------- */
/* Wire types                                                                 */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventsPage {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    color_id: Option<String>,
    #[serde(default)]
    recurrence: Vec<String>,
    #[serde(default)]
    start: GoogleEventTime,
    #[serde(default)]
    end: GoogleEventTime,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    message: String,
}

impl From<GoogleEventTime> for RemoteEventTime {
    fn from(time: GoogleEventTime) -> Self {
        Self { date_time: time.date_time, date: time.date, time_zone: time.time_zone }
    }
}

impl From<GoogleEvent> for RemoteEvent {
    fn from(event: GoogleEvent) -> Self {
        Self {
            remote_id: event.id,
            title: event.summary,
            description: event.description,
            location: event.location,
            color: event.color_id,
            recurrence: event.recurrence,
            start: event.start.into(),
            end: event.end.into(),
        }
    }
}

/// Outbound event payload for create and update
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventBody {
    summary: String,
    description: String,
    start: GoogleEventTime,
    end: GoogleEventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recurrence: Option<Vec<String>>,
}

impl GoogleEventBody {
    fn from_event(event: &CalendarEvent) -> Self {
        // Unknown zones were rejected on the way in; fall back to UTC anyway.
        let tz_name = event.timezone.clone().unwrap_or_else(|| DEFAULT_TIMEZONE.to_owned());
        let tz: Tz = tz_name.parse().unwrap_or(Tz::UTC);

        Self {
            summary: event.title.clone(),
            description: event.description.clone().unwrap_or_default(),
            start: outbound_time(event.start_time, event.is_all_day, tz, &tz_name),
            end: outbound_time(event.end_time, event.is_all_day, tz, &tz_name),
            location: event.location.clone(),
            color_id: event.color.clone(),
            recurrence: event.recurrence_rule.clone().map(|rule| vec![rule]),
        }
    }
}

fn outbound_time(instant: DateTime<Utc>, all_day: bool, tz: Tz, tz_name: &str) -> GoogleEventTime {
    if all_day {
        GoogleEventTime {
            date: Some(instant.with_timezone(&tz).date_naive().format("%Y-%m-%d").to_string()),
            time_zone: Some(tz_name.to_owned()),
            ..GoogleEventTime::default()
        }
    } else {
        GoogleEventTime {
            date_time: Some(instant.to_rfc3339_opts(SecondsFormat::Secs, true)),
            time_zone: Some(tz_name.to_owned()),
            ..GoogleEventTime::default()
        }
    }
}
