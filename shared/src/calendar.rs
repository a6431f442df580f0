//! Google Calendar gateway.
//!
//! The calendar is the system of record for reservations. This client wraps
//! the Calendar v3 REST API and owns the process-wide credential state: the
//! authorized-user token JSON lives in Secrets Manager, is loaded lazily,
//! refreshed through the OAuth2 refresh-token grant when it expires, and
//! written back to the store after a refresh. The write lock around the
//! credential guarantees at most one refresh in flight; concurrent callers
//! observe either the pre- or post-refresh token.

use aws_sdk_secretsmanager::Client as SecretsClient;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::{Error, Result};

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry to absorb clock skew.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Google authorized-user token as stored in Secrets Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredToken {
    #[serde(alias = "access_token")]
    pub token: String,
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
}

/// A calendar event as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime")]
    pub date_time: Option<String>,
    #[serde(rename = "timeZone")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// An event body for insert/update calls.
#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    pub summary: String,
    pub description: String,
    pub start: EventTimePayload,
    pub end: EventTimePayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventTimePayload {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(rename = "timeZone")]
    pub time_zone: String,
}

/// The free-text calendar query matching a holder's reservations.
///
/// Inherited behavior: this is a raw substring match against the event
/// description, not a structured lookup, so names that contain other names
/// can collide (see the test below).
pub fn holder_query(reservation_holder: &str) -> String {
    format!(r#""reservation_holder": "{}""#, reservation_holder)
}

/// Client for the reservation calendar.
pub struct CalendarClient {
    http: reqwest::Client,
    secrets: SecretsClient,
    secret_id: String,
    calendar_id: String,
    base_url: String,
    token_url: String,
    credentials: RwLock<Option<StoredToken>>,
}

impl CalendarClient {
    pub fn new(secrets: SecretsClient, config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            secrets,
            secret_id: config.token_secret_id.clone(),
            calendar_id: config.calendar_id.clone(),
            base_url: CALENDAR_API_BASE.to_string(),
            token_url: OAUTH_TOKEN_URL.to_string(),
            credentials: RwLock::new(None),
        }
    }

    /// Point the client at a different Calendar API base (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Point the client at a different OAuth token endpoint (tests).
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// List events, optionally bounded in time and filtered by free text.
    pub async fn list_events(
        &self,
        time_min: Option<&str>,
        time_max: Option<&str>,
        free_text: Option<&str>,
    ) -> Result<Vec<CalendarEvent>> {
        let access_token = self.access_token().await?;
        let mut all_events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/calendars/{}/events?maxResults=250",
                self.base_url,
                urlencoding::encode(&self.calendar_id)
            );
            if let Some(time_min) = time_min {
                url.push_str(&format!("&timeMin={}", urlencoding::encode(time_min)));
            }
            if let Some(time_max) = time_max {
                url.push_str(&format!("&timeMax={}", urlencoding::encode(time_max)));
            }
            if let Some(q) = free_text {
                url.push_str(&format!("&q={}", urlencoding::encode(q)));
            }
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(&access_token)
                .send()
                .await
                .map_err(|e| Error::Upstream(format!("Calendar list request failed: {}", e)))?;

            let page: EventListResponse = Self::read_json(response).await?;
            all_events.extend(page.items);

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(all_events)
    }

    /// Insert a new event, returning it with its assigned id.
    pub async fn insert_event(&self, payload: &EventPayload) -> Result<CalendarEvent> {
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(&self.calendar_id)
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Calendar insert request failed: {}", e)))?;

        Self::read_json(response).await
    }

    /// Replace an existing event's body.
    pub async fn update_event(
        &self,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<CalendarEvent> {
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.base_url,
            urlencoding::encode(&self.calendar_id),
            urlencoding::encode(event_id)
        );

        let response = self
            .http
            .put(&url)
            .bearer_auth(&access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Calendar update request failed: {}", e)))?;

        Self::read_json(response).await
    }

    /// Delete an event.
    pub async fn delete_event(&self, event_id: &str) -> Result<()> {
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.base_url,
            urlencoding::encode(&self.calendar_id),
            urlencoding::encode(event_id)
        );

        let response = self
            .http
            .delete(&url)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Calendar delete request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "Calendar delete failed ({}): {}",
                status, body
            )));
        }

        Ok(())
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "Calendar API error ({}): {}",
                status, body
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to parse calendar response: {}", e)))
    }

    /// Get a usable access token, refreshing and persisting it if needed.
    async fn access_token(&self) -> Result<String> {
        {
            let credentials = self.credentials.read().await;
            if let Some(token) = credentials.as_ref() {
                if !needs_refresh(token, Utc::now()) {
                    return Ok(token.token.clone());
                }
            }
        }

        // The write lock serializes refreshes; whoever loses the race finds
        // a fresh token on the re-check and returns it as-is.
        let mut credentials = self.credentials.write().await;
        if let Some(token) = credentials.as_ref() {
            if !needs_refresh(token, Utc::now()) {
                return Ok(token.token.clone());
            }
        }

        let mut token = match credentials.take() {
            Some(token) => token,
            None => self.load_stored_token().await?,
        };

        if needs_refresh(&token, Utc::now()) {
            match self.refresh_token(&mut token).await {
                Ok(()) => {
                    if let Err(e) = self.persist_token(&token).await {
                        // The refreshed token still works for this process;
                        // the next cold start will refresh again.
                        warn!("Failed to persist refreshed token: {}", e);
                    }
                }
                Err(e) if is_expired(&token, Utc::now()) => {
                    // The stored token is already past expiry, so a calendar
                    // call would only turn this into a misleading 401. Keep
                    // the token cached so the next request retries the
                    // refresh, and surface the real failure now.
                    *credentials = Some(token);
                    return Err(e);
                }
                Err(e) => {
                    // Not yet past expiry (or none recorded): the stored
                    // access token may still be good, so fall back to it
                    // and let the API call decide.
                    warn!("Token refresh failed, using stored token: {}", e);
                }
            }
        }

        let access_token = token.token.clone();
        *credentials = Some(token);
        Ok(access_token)
    }

    async fn load_stored_token(&self) -> Result<StoredToken> {
        let response = self
            .secrets
            .get_secret_value()
            .secret_id(&self.secret_id)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to get calendar token secret: {}", e)))?;

        let secret_string = response
            .secret_string()
            .ok_or_else(|| Error::Aws("Calendar token secret has no string value".to_string()))?;

        serde_json::from_str(secret_string)
            .map_err(|e| Error::Aws(format!("Failed to parse calendar token secret: {}", e)))
    }

    async fn refresh_token(&self, token: &mut StoredToken) -> Result<()> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| Error::Upstream("Stored token has no refresh_token".to_string()))?;

        let params = [
            ("refresh_token", refresh_token.as_str()),
            ("client_id", &token.client_id),
            ("client_secret", &token.client_secret),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("Token refresh failed: {}", body)));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to parse token response: {}", e)))?;

        token.token = refreshed.access_token;
        token.expiry = refreshed
            .expires_in
            .map(|secs| (Utc::now() + Duration::seconds(secs)).to_rfc3339());

        info!("Refreshed calendar access token");
        Ok(())
    }

    async fn persist_token(&self, token: &StoredToken) -> Result<()> {
        let secret_string = serde_json::to_string(token)?;
        self.secrets
            .put_secret_value()
            .secret_id(&self.secret_id)
            .secret_string(secret_string)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to store refreshed token: {}", e)))?;
        Ok(())
    }
}

/// Whether the recorded expiry has actually passed (no skew window).
fn is_expired(token: &StoredToken, now: DateTime<Utc>) -> bool {
    match &token.expiry {
        None => false,
        Some(expiry) => match DateTime::parse_from_rfc3339(expiry) {
            Ok(expiry) => expiry.with_timezone(&Utc) <= now,
            Err(_) => true,
        },
    }
}

fn needs_refresh(token: &StoredToken, now: DateTime<Utc>) -> bool {
    match &token.expiry {
        // No recorded expiry: refresh once so we learn one.
        None => token.refresh_token.is_some(),
        Some(expiry) => match DateTime::parse_from_rfc3339(expiry) {
            Ok(expiry) => expiry.with_timezone(&Utc) - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now,
            Err(_) => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::{DELETE, GET, POST, PUT};
    use httpmock::MockServer;
    use serde_json::json;

    use super::*;

    /// Client wired to a mock server for both the calendar API and the
    /// Secrets Manager endpoint.
    fn mock_client(server: &MockServer) -> CalendarClient {
        let conf = aws_sdk_secretsmanager::Config::builder()
            .behavior_version(aws_sdk_secretsmanager::config::BehaviorVersion::latest())
            .region(aws_sdk_secretsmanager::config::Region::new("us-east-1"))
            .credentials_provider(aws_sdk_secretsmanager::config::Credentials::new(
                "akid", "secret", None, None, "test",
            ))
            .endpoint_url(server.base_url())
            .build();
        let secrets = aws_sdk_secretsmanager::Client::from_conf(conf);

        let config = Config {
            calendar_id: "primary".to_string(),
            token_secret_id: "hotel-booking/google-token".to_string(),
            aws_region: "us-east-1".to_string(),
        };

        CalendarClient::new(secrets, &config)
            .with_base_url(server.base_url())
            .with_token_url(server.url("/token"))
    }

    /// Register the Secrets Manager GetSecretValue mock serving `expiry`.
    fn mock_stored_token<'a>(server: &'a MockServer, expiry: &str) -> httpmock::Mock<'a> {
        let secret = json!({
            "token": "ya29.test",
            "refresh_token": "1//refresh",
            "client_id": "client",
            "client_secret": "secret",
            "expiry": expiry,
        })
        .to_string();

        server.mock(|when, then| {
            when.method(POST)
                .path("/")
                .header("x-amz-target", "secretsmanager.GetSecretValue");
            then.status(200)
                .header("content-type", "application/x-amz-json-1.1")
                .body(json!({ "SecretString": secret }).to_string());
        })
    }

    fn far_future() -> String {
        (Utc::now() + Duration::days(365)).to_rfc3339()
    }

    fn stay_payload() -> EventPayload {
        EventPayload {
            summary: "hotel booking".to_string(),
            description: r#"{"reservation_holder": "Alice"}"#.to_string(),
            start: EventTimePayload {
                date_time: "2030-05-01T18:00:00+09:00".to_string(),
                time_zone: "Asia/Tokyo".to_string(),
            },
            end: EventTimePayload {
                date_time: "2030-05-03T10:00:00+09:00".to_string(),
                time_zone: "Asia/Tokyo".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_list_events_follows_pagination() {
        let server = MockServer::start();
        mock_stored_token(&server, &far_future());

        let first_page = server.mock(|when, then| {
            when.method(GET)
                .path("/calendars/primary/events")
                .matches(|req| {
                    req.query_params
                        .as_ref()
                        .map_or(true, |qs| !qs.iter().any(|(k, _)| k == "pageToken"))
                });
            then.status(200)
                .header("content-type", "application/json")
                .body(json!({ "items": [{ "id": "ev1" }], "nextPageToken": "p2" }).to_string());
        });
        let second_page = server.mock(|when, then| {
            when.method(GET)
                .path("/calendars/primary/events")
                .query_param("pageToken", "p2");
            then.status(200)
                .header("content-type", "application/json")
                .body(json!({ "items": [{ "id": "ev2" }] }).to_string());
        });

        let events = mock_client(&server)
            .list_events(None, None, None)
            .await
            .unwrap();

        assert_eq!(
            events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["ev1", "ev2"]
        );
        first_page.assert_hits(1);
        second_page.assert_hits(1);
    }

    #[tokio::test]
    async fn test_list_events_encodes_time_bounds_and_query() {
        let server = MockServer::start();
        mock_stored_token(&server, &far_future());

        let list = server.mock(|when, then| {
            when.method(GET)
                .path("/calendars/primary/events")
                .header("authorization", "Bearer ya29.test")
                .query_param("timeMin", "2030-05-01T18:00:00+09:00")
                .query_param("timeMax", "2030-05-03T10:00:00+09:00")
                .query_param("q", r#""reservation_holder": "Alice""#);
            then.status(200)
                .header("content-type", "application/json")
                .body(json!({ "items": [] }).to_string());
        });

        let events = mock_client(&server)
            .list_events(
                Some("2030-05-01T18:00:00+09:00"),
                Some("2030-05-03T10:00:00+09:00"),
                Some(&holder_query("Alice")),
            )
            .await
            .unwrap();

        assert!(events.is_empty());
        list.assert_hits(1);
    }

    #[tokio::test]
    async fn test_calendar_failure_maps_to_upstream_502() {
        let server = MockServer::start();
        mock_stored_token(&server, &far_future());

        server.mock(|when, then| {
            when.method(GET).path("/calendars/primary/events");
            then.status(500).body("boom");
        });

        let err = mock_client(&server)
            .list_events(None, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("Calendar API error"));
    }

    #[tokio::test]
    async fn test_update_event_puts_to_the_event_path() {
        let server = MockServer::start();
        mock_stored_token(&server, &far_future());

        let update = server.mock(|when, then| {
            when.method(PUT)
                .path("/calendars/primary/events/ev1")
                .json_body_partial(r#"{ "summary": "hotel booking" }"#);
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "id": "ev1",
                        "start": { "dateTime": "2030-05-01T18:00:00+09:00" },
                        "end": { "dateTime": "2030-05-03T10:00:00+09:00" }
                    })
                    .to_string(),
                );
        });

        let event = mock_client(&server)
            .update_event("ev1", &stay_payload())
            .await
            .unwrap();

        assert_eq!(event.id, "ev1");
        update.assert_hits(1);
    }

    #[tokio::test]
    async fn test_delete_event_tolerates_empty_response() {
        let server = MockServer::start();
        mock_stored_token(&server, &far_future());

        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/calendars/primary/events/ev1");
            then.status(204);
        });

        mock_client(&server).delete_event("ev1").await.unwrap();
        delete.assert_hits(1);
    }

    #[tokio::test]
    async fn test_failed_refresh_of_expired_token_is_surfaced() {
        let server = MockServer::start();
        // Token already past expiry, forcing a refresh attempt.
        mock_stored_token(&server, &(Utc::now() - Duration::hours(1)).to_rfc3339());

        let refresh = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(400)
                .header("content-type", "application/json")
                .body(r#"{"error":"invalid_grant"}"#);
        });
        // No calendar mock: the request must never get that far.

        let err = mock_client(&server)
            .list_events(None, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upstream(_)));
        assert!(err.to_string().contains("Token refresh failed"));
        refresh.assert_hits(1);
    }

    fn token(expiry: Option<&str>) -> StoredToken {
        StoredToken {
            token: "ya29.token".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: None,
            expiry: expiry.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_stored_token_accepts_both_key_spellings() {
        let google_style = r#"{"token":"t","refresh_token":"r","client_id":"c","client_secret":"s"}"#;
        let oauth_style =
            r#"{"access_token":"t","refresh_token":"r","client_id":"c","client_secret":"s"}"#;
        assert_eq!(
            serde_json::from_str::<StoredToken>(google_style).unwrap().token,
            "t"
        );
        assert_eq!(
            serde_json::from_str::<StoredToken>(oauth_style).unwrap().token,
            "t"
        );
    }

    #[test]
    fn test_expired_token_needs_refresh() {
        let now = Utc::now();
        assert!(needs_refresh(
            &token(Some(&(now - Duration::hours(1)).to_rfc3339())),
            now
        ));
        assert!(!needs_refresh(
            &token(Some(&(now + Duration::hours(1)).to_rfc3339())),
            now
        ));
    }

    #[test]
    fn test_expiry_inside_skew_window_counts_as_expired() {
        let now = Utc::now();
        let expiry = (now + Duration::seconds(EXPIRY_SKEW_SECONDS / 2)).to_rfc3339();
        assert!(needs_refresh(&token(Some(&expiry)), now));
    }

    #[test]
    fn test_holder_query_shape() {
        assert_eq!(holder_query("Alice"), r#""reservation_holder": "Alice""#);
    }

    #[test]
    fn test_holder_query_is_unstructured_text() {
        // Known precision risk, kept for compatibility: the query goes to
        // the calendar's tokenized free-text search, so "Ann" also matches
        // events whose description names "Anna", and names are embedded
        // without any escaping.
        assert_eq!(
            holder_query(r#"Ali"ce"#),
            r#""reservation_holder": "Ali"ce""#
        );
    }
}
