//! Configuration management for the booking Lambda.

use std::env;

use crate::{Error, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Google Calendar identifier holding the reservations
    pub calendar_id: String,
    /// Secrets Manager id of the stored Google authorized-user token
    pub token_secret_id: String,
    /// AWS region
    pub aws_region: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            calendar_id: env::var("CALENDAR_ID")
                .map_err(|_| Error::Config("CALENDAR_ID not set".to_string()))?,
            token_secret_id: env::var("GOOGLE_TOKEN_SECRET_ID")
                .unwrap_or_else(|_| "hotel-booking/google-token".to_string()),
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}
