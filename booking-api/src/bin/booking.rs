//! Booking Lambda - hotel room reservations backed by Google Calendar.
//!
//! One function serves two transports: plain HTTP requests arriving through
//! API Gateway, and Agents-for-Bedrock action invocations. Both run through
//! the same (method, path) dispatch table; the agent path synthesizes an
//! HTTP-shaped request from the envelope on the way in and re-wraps the
//! response on the way out.

use chrono::NaiveDate;
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::calendar::{holder_query, EventTimePayload};
use shared::{
    dates, is_agent_event, AgentEvent, CalendarClient, CalendarEvent, Config, DeleteConfirmation,
    Error, EventPayload, GetMyReservationRequest, GetMyReservationResponse, HandlerResponse,
    HttpEvent, IsVacancyRequest, ReserveRequest, ReserveResponse, Result, SyntheticRequest,
    UpdateReservationRequest, UpdateType,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Event summary marking reservations among other calendar entries.
const EVENT_SUMMARY: &str = "hotel booking (Agents for Amazon Bedrock)";

/// Application state shared across requests.
struct AppState {
    calendar: CalendarClient,
}

impl AppState {
    async fn new() -> std::result::Result<Self, LambdaError> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);
        let config = Config::from_env()?;

        Ok(Self {
            calendar: CalendarClient::new(secrets_client, &config),
        })
    }
}

/// Build the calendar event body for a stay.
fn reservation_event(holder: &str, checkin: NaiveDate, checkout: NaiveDate) -> Result<EventPayload> {
    let description = serde_json::to_string(&json!({ "reservation_holder": holder }))?;
    Ok(EventPayload {
        summary: EVENT_SUMMARY.to_string(),
        description,
        start: EventTimePayload {
            date_time: dates::checkin_time(checkin).to_rfc3339(),
            time_zone: dates::ZONE_NAME.to_string(),
        },
        end: EventTimePayload {
            date_time: dates::checkout_time(checkout).to_rfc3339(),
            time_zone: dates::ZONE_NAME.to_string(),
        },
    })
}

/// Read a stored calendar event back into a reservation.
fn reservation_from_event(event: &CalendarEvent, holder: &str) -> Result<ReserveResponse> {
    let start = event
        .start
        .date_time
        .as_deref()
        .ok_or_else(|| Error::Upstream(format!("Event {} has no start time", event.id)))?;
    let end = event
        .end
        .date_time
        .as_deref()
        .ok_or_else(|| Error::Upstream(format!("Event {} has no end time", event.id)))?;

    Ok(ReserveResponse {
        reserve_id: event.id.clone(),
        reservation_holder: holder.to_string(),
        checkin: dates::event_date(start)?,
        checkout: dates::event_date(end)?,
    })
}

/// Parse loosely formatted check-in/check-out dates, rolling past dates into
/// next year.
fn stay_dates(checkin: &str, checkout: &str) -> Result<(NaiveDate, NaiveDate)> {
    let now = dates::now_local();
    let checkin = dates::roll_forward(dates::parse_flexible_date("checkin", checkin, now)?, now);
    let checkout = dates::roll_forward(dates::parse_flexible_date("checkout", checkout, now)?, now);
    Ok((checkin, checkout))
}

async fn reserve(state: &AppState, request: ReserveRequest) -> Result<HandlerResponse> {
    let (checkin, checkout) = stay_dates(&request.checkin, &request.checkout)?;
    let payload = reservation_event(&request.reservation_holder, checkin, checkout)?;

    let event = state.calendar.insert_event(&payload).await?;
    info!("Created reservation {}", event.id);

    HandlerResponse::json(
        200,
        &reservation_from_event(&event, &request.reservation_holder)?,
    )
}

async fn is_vacancy(state: &AppState, request: IsVacancyRequest) -> Result<HandlerResponse> {
    let (checkin, checkout) = stay_dates(&request.checkin, &request.checkout)?;

    let events = state
        .calendar
        .list_events(
            Some(&dates::checkin_time(checkin).to_rfc3339()),
            Some(&dates::checkout_time(checkout).to_rfc3339()),
            None,
        )
        .await?;

    HandlerResponse::json(200, &events.is_empty())
}

fn get_today() -> Result<HandlerResponse> {
    HandlerResponse::json(200, &dates::today_string(dates::now_local()))
}

async fn get_my_reservation(
    state: &AppState,
    request: GetMyReservationRequest,
) -> Result<HandlerResponse> {
    let events = state
        .calendar
        .list_events(None, None, Some(&holder_query(&request.reservation_holder)))
        .await?;

    let reservations = events
        .iter()
        .map(|event| reservation_from_event(event, &request.reservation_holder))
        .collect::<Result<Vec<_>>>()?;

    HandlerResponse::json(200, &GetMyReservationResponse { reservations })
}

async fn update_reservation(
    state: &AppState,
    request: UpdateReservationRequest,
) -> Result<HandlerResponse> {
    match request.update_type {
        UpdateType::Update => {
            let info = request.reserve_info.ok_or_else(|| {
                Error::Validation(
                    "reserve_info is required when update_type is \"update\"".to_string(),
                )
            })?;

            let (checkin, checkout) = stay_dates(&info.checkin, &info.checkout)?;
            let payload = reservation_event(&info.reservation_holder, checkin, checkout)?;

            let event = state
                .calendar
                .update_event(&request.reserve_id, &payload)
                .await?;
            info!("Updated reservation {}", event.id);

            HandlerResponse::json(200, &reservation_from_event(&event, &info.reservation_holder)?)
        }
        UpdateType::Delete => {
            state.calendar.delete_event(&request.reserve_id).await?;
            info!("Deleted reservation {}", request.reserve_id);

            HandlerResponse::json(
                200,
                &DeleteConfirmation {
                    reserve_id: request.reserve_id,
                    deleted: true,
                },
            )
        }
    }
}

fn parse_payload<T: DeserializeOwned>(body: Option<&str>) -> Result<T> {
    let body = body.ok_or_else(|| Error::Validation("Missing request body".to_string()))?;
    serde_json::from_str(body).map_err(|e| Error::Validation(format!("Invalid request body: {}", e)))
}

/// The routing table, shared by both transports.
async fn route(state: &AppState, request: &SyntheticRequest) -> Result<HandlerResponse> {
    let body = request.body.as_deref();

    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/reserve") => reserve(state, parse_payload(body)?).await,
        ("POST", "/is_vacancy") => is_vacancy(state, parse_payload(body)?).await,
        ("GET", "/get_today") => get_today(),
        ("POST", "/get_my_reservation") => get_my_reservation(state, parse_payload(body)?).await,
        ("POST", "/update_reservation") => update_reservation(state, parse_payload(body)?).await,
        _ => Err(Error::UnknownRoute {
            method: request.method.clone(),
            path: request.path.clone(),
        }),
    }
}

async fn dispatch(state: &AppState, request: &SyntheticRequest) -> HandlerResponse {
    match route(state, request).await {
        Ok(response) => response,
        Err(e) => {
            if e.status_code() >= 500 {
                error!("{} {} failed: {}", request.method, request.path, e);
            } else {
                info!("{} {} rejected: {}", request.method, request.path, e);
            }
            HandlerResponse::from_error(&e)
        }
    }
}

async fn function_handler(
    state: Arc<AppState>,
    event: LambdaEvent<Value>,
) -> std::result::Result<Value, LambdaError> {
    let payload = event.payload;

    if is_agent_event(&payload) {
        let agent = match AgentEvent::from_value(&payload) {
            Ok(agent) => agent,
            Err(e) => {
                error!("Unreadable agent envelope: {}", e);
                return Ok(AgentEvent::default().wrap(&HandlerResponse::from_error(&e)));
            }
        };

        let response = match agent.synthetic_request() {
            Ok(request) => {
                info!("Agent invocation: {} {}", request.method, request.path);
                dispatch(&state, &request).await
            }
            Err(e) => {
                error!("Malformed agent envelope: {}", e);
                HandlerResponse::from_error(&e)
            }
        };

        Ok(agent.wrap(&response))
    } else {
        let http = match HttpEvent::from_value(&payload) {
            Ok(http) => http,
            Err(e) => return Ok(HandlerResponse::from_error(&e).to_proxy_response()),
        };

        let request = match http.decoded_body() {
            Ok(body) => SyntheticRequest {
                method: http.method().to_string(),
                path: http.path().to_string(),
                query: http.query(),
                body,
            },
            Err(e) => return Ok(HandlerResponse::from_error(&e).to_proxy_response()),
        };

        info!("HTTP request: {} {}", request.method, request.path);
        Ok(dispatch(&state, &request).await.to_proxy_response())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), LambdaError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { function_handler(state, event).await }
    }))
    .await
}
