//! Agents-for-Bedrock transport adapter.
//!
//! Bedrock agents invoke the Lambda with a JSON envelope that describes an
//! HTTP-like call (`httpMethod`, `apiPath`, a property list standing in for
//! the body). This module detects that shape, synthesizes an HTTP-shaped
//! request from it so the normal dispatch table can run, and wraps the
//! resulting response back into the envelope the agent expects.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::http::HandlerResponse;
use crate::{Error, Result};

/// One `{name, value}` pair from the agent request body.
#[derive(Debug, Clone, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct JsonContent {
    #[serde(default)]
    properties: Vec<Property>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RequestContent {
    #[serde(default, rename = "application/json")]
    application_json: JsonContent,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AgentRequestBody {
    #[serde(default)]
    content: RequestContent,
}

/// An agent action invocation.
///
/// Every field defaults so that an agent-shaped event always parses; the
/// required routing fields are checked in [`AgentEvent::synthetic_request`]
/// instead, which keeps the diagnostic close to the failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    #[serde(default)]
    pub agent: Value,
    #[serde(default)]
    pub action_group: String,
    #[serde(default)]
    pub api_path: String,
    #[serde(default)]
    pub http_method: String,
    #[serde(default)]
    pub session_attributes: Map<String, Value>,
    #[serde(default)]
    pub prompt_session_attributes: Map<String, Value>,
    #[serde(default)]
    request_body: AgentRequestBody,
}

/// An HTTP-shaped request synthesized from an agent envelope.
///
/// `body` is `None` when the envelope carried no properties, so handlers
/// can tell "no payload" apart from "payload is an empty object". `query`
/// exists to keep the shape congruent with plain HTTP requests; agent
/// envelopes have no query string, so synthesis always leaves it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<String>,
}

/// Whether an inbound Lambda event is an agent invocation.
///
/// The `agent` key is the sole discriminator; no other field is consulted,
/// so a malformed envelope is still routed to the agent path and rejected
/// there with a diagnostic instead of falling through to HTTP handling.
pub fn is_agent_event(event: &Value) -> bool {
    event.get("agent").is_some()
}

impl AgentEvent {
    pub fn from_value(event: &Value) -> Result<Self> {
        serde_json::from_value(event.clone())
            .map_err(|e| Error::MalformedEnvelope(e.to_string()))
    }

    /// Synthesize the HTTP-shaped request this envelope describes.
    ///
    /// The property list folds into a name→value map, last write wins on
    /// duplicate names. An empty fold yields no body rather than `{}`.
    pub fn synthetic_request(&self) -> Result<SyntheticRequest> {
        if self.http_method.is_empty() {
            return Err(Error::MalformedEnvelope("missing httpMethod".to_string()));
        }
        if self.api_path.is_empty() {
            return Err(Error::MalformedEnvelope("missing apiPath".to_string()));
        }

        let mut items = Map::new();
        for property in &self.request_body.content.application_json.properties {
            items.insert(property.name.clone(), property.value.clone());
        }

        let body = if items.is_empty() {
            None
        } else {
            Some(Value::Object(items).to_string())
        };

        Ok(SyntheticRequest {
            method: self.http_method.clone(),
            path: self.api_path.clone(),
            query: None,
            body,
        })
    }

    /// Wrap a handler response in the agent response envelope.
    ///
    /// The status code and body text pass through verbatim; the body is
    /// re-embedded as text, never reparsed or re-encoded.
    pub fn wrap(&self, response: &HandlerResponse) -> Value {
        json!({
            "messageVersion": "1.0",
            "response": {
                "actionGroup": self.action_group,
                "apiPath": self.api_path,
                "httpMethod": self.http_method,
                "httpStatusCode": response.status,
                "responseBody": {
                    "application/json": { "body": response.body }
                },
                "sessionAttributes": self.session_attributes,
                "promptSessionAttributes": self.prompt_session_attributes,
            }
        })
    }
}
