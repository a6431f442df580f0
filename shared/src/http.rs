//! HTTP-shaped request/response types shared by both transports.
//!
//! The Lambda receives either an API Gateway proxy event or an agent
//! envelope, so the API Gateway shapes are deserialized by hand here
//! (both the 1.0 and 2.0 payload formats) instead of going through a
//! typed runtime adapter.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{Error, Result};

/// Standard API response wrapper used for error bodies.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// The status and JSON body text a handler produced.
///
/// This is the single currency the dispatch table deals in; the transport
/// layer decides afterwards whether it becomes a proxy response or an
/// agent envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: String,
}

impl HandlerResponse {
    /// Serialize `data` as the JSON body of a response with `status`.
    pub fn json<T: Serialize>(status: u16, data: &T) -> Result<Self> {
        Ok(Self {
            status,
            body: serde_json::to_string(data)?,
        })
    }

    /// Build a machine-readable error response.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        let body = serde_json::to_string(&ApiResponse::error(message))
            .unwrap_or_else(|_| r#"{"success":false,"error":"Internal error"}"#.to_string());
        Self { status, body }
    }

    /// Convert a handler error into its wire response.
    pub fn from_error(err: &Error) -> Self {
        Self::error(err.status_code(), err.to_string())
    }

    /// Render as an API Gateway proxy response. The body text is embedded
    /// unmodified.
    pub fn to_proxy_response(&self) -> Value {
        json!({
            "statusCode": self.status,
            "headers": { "content-type": "application/json" },
            "body": self.body,
            "isBase64Encoded": false,
        })
    }
}

/// An API Gateway proxy event, accepting both payload format 1.0
/// (`httpMethod`/`path`) and 2.0 (`rawPath` + `requestContext.http`).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpEvent {
    #[serde(default)]
    http_method: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    raw_path: Option<String>,
    #[serde(default)]
    raw_query_string: Option<String>,
    #[serde(default)]
    query_string_parameters: Option<std::collections::HashMap<String, String>>,
    #[serde(default)]
    request_context: RequestContext,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    is_base64_encoded: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestContext {
    #[serde(default)]
    http: HttpDescription,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpDescription {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

impl HttpEvent {
    pub fn from_value(event: &Value) -> Result<Self> {
        serde_json::from_value(event.clone()).map_err(Error::Serialization)
    }

    /// HTTP method, whichever payload format carried it.
    pub fn method(&self) -> &str {
        self.http_method
            .as_deref()
            .or(self.request_context.http.method.as_deref())
            .unwrap_or("")
    }

    /// Request path, whichever payload format carried it.
    pub fn path(&self) -> &str {
        self.path
            .as_deref()
            .or(self.raw_path.as_deref())
            .or(self.request_context.http.path.as_deref())
            .unwrap_or("")
    }

    /// Query string, whichever payload format carried it. Format 1.0 only
    /// delivers the parsed parameter map, so it is re-encoded here.
    pub fn query(&self) -> Option<String> {
        if let Some(raw) = &self.raw_query_string {
            if !raw.is_empty() {
                return Some(raw.clone());
            }
        }
        self.query_string_parameters.as_ref().map(|params| {
            params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&")
        })
    }

    /// Request body with base64 payloads decoded.
    pub fn decoded_body(&self) -> Result<Option<String>> {
        match &self.body {
            None => Ok(None),
            Some(body) if !self.is_base64_encoded => Ok(Some(body.clone())),
            Some(body) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(body)
                    .map_err(|e| Error::Validation(format!("Invalid base64 body: {}", e)))?;
                String::from_utf8(bytes)
                    .map(Some)
                    .map_err(|e| Error::Validation(format!("Body is not UTF-8: {}", e)))
            }
        }
    }
}
