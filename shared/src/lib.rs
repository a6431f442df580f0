//! Shared library for the hotel booking Lambda function.
//!
//! This crate provides the transport adapter, calendar gateway, and common
//! types used by the booking Lambda.

pub mod agents;
pub mod calendar;
pub mod config;
pub mod dates;
pub mod error;
pub mod http;
pub mod models;

pub use agents::{is_agent_event, AgentEvent, SyntheticRequest};
pub use calendar::{CalendarClient, CalendarEvent, EventPayload};
pub use config::Config;
pub use error::{Error, Result};
pub use http::{HandlerResponse, HttpEvent};
pub use models::{
    DeleteConfirmation, GetMyReservationRequest, GetMyReservationResponse, IsVacancyRequest,
    ReserveRequest, ReserveResponse, UpdateReservationRequest, UpdateType,
};
