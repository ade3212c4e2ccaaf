//! Function tools exposed to the realtime backend.
//!
//! The agent does not inherit tool methods; it holds a [`ToolProvider`] and
//! the backend's function-calling dispatch binds by declared tool name. The
//! end-call capability is wired through an [`EndCallHandle`] so a tool can
//! ask the lifecycle to terminate without reaching into its state.

use crate::session::EndReason;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Declared shape of one callable tool (name-bound, no inheritance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

/// A function call emitted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    /// Correlation id, when the backend provided one.
    #[serde(default)]
    pub call_id: Option<String>,
}

/// Result message sent back to the backend.
///
/// The correlation id is omitted from the wire entirely when the call carried
/// none — serializing an explicit null here is rejected by the backend as a
/// protocol violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub name: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl ToolResponse {
    /// Build the response for a call, carrying the correlation id only if
    /// the call actually had one.
    pub fn for_call(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            name: call.name.clone(),
            output: output.into(),
            call_id: call.call_id.clone(),
        }
    }
}

/// Fire-and-forget handle a tool uses to request call termination.
///
/// Clonable; the lifecycle owns the receiving side. Sending is best-effort:
/// once the lifecycle is gone there is nothing left to end.
#[derive(Clone)]
pub struct EndCallHandle {
    tx: mpsc::Sender<EndReason>,
}

impl EndCallHandle {
    pub fn new(tx: mpsc::Sender<EndReason>) -> Self {
        Self { tx }
    }

    /// Ask the lifecycle to begin termination.
    pub fn request_end(&self, reason: EndReason) {
        if self.tx.try_send(reason).is_err() {
            // Already terminating or torn down; nothing to do.
        }
    }
}

/// Capability set the agent composes: availability check, reservation,
/// call transfer, and ending the call.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Tool declarations handed to the backend at session start.
    fn definitions(&self) -> Vec<ToolSpec>;

    /// Execute one call, binding by name. Unknown names degrade to an
    /// apologetic result rather than an error — the reply is spoken to a
    /// caller, not parsed by a program.
    async fn dispatch(&self, call: ToolCall) -> ToolResponse;
}

/// Default tool bundle for the reception agent. Calendar answers are canned;
/// the interesting part is the dispatch plumbing and the end-call signal.
pub struct ReceptionTools {
    end_call: EndCallHandle,
}

impl ReceptionTools {
    pub fn new(end_call: EndCallHandle) -> Self {
        Self { end_call }
    }

    fn check_availability(&self, args: &Value) -> String {
        let date = args
            .get("requested_date")
            .and_then(Value::as_str)
            .unwrap_or("that day");
        info!(requested_date = date, "check_availability");
        format!("There are still open slots on {date}, morning or afternoon.")
    }

    fn reserve_appointment(&self, args: &Value) -> String {
        let name = args.get("name").and_then(Value::as_str).unwrap_or("the caller");
        let date = args
            .get("appointment_date")
            .and_then(Value::as_str)
            .unwrap_or("the agreed date");
        let time = args
            .get("appointment_time")
            .and_then(Value::as_str)
            .unwrap_or("the agreed time");
        info!(name, date, time, "reserve_appointment");
        format!("Done, {name} — the appointment on {date} at {time} is booked. A confirmation follows by email.")
    }

    fn transfer_to_specialist(&self, args: &Value) -> String {
        let topic = args.get("topic").and_then(Value::as_str).unwrap_or("this topic");
        info!(topic, "transfer_to_specialist");
        format!("A specialist will take over for '{topic}'. One moment please.")
    }

    fn end_call(&self) -> String {
        info!("end_call tool invoked");
        self.end_call.request_end(EndReason::ToolRequested);
        "Thank you for calling. Goodbye!".to_string()
    }
}

#[async_trait]
impl ToolProvider for ReceptionTools {
    fn definitions(&self) -> Vec<ToolSpec> {
        let spec = |name: &str, description: &str| ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
        };
        vec![
            spec(
                "check_availability",
                "Check whether a given date still has free appointment slots.",
            ),
            spec(
                "reserve_appointment",
                "Book an appointment after the caller has confirmed name, date and time.",
            ),
            spec(
                "transfer_to_specialist",
                "Hand the caller over to a specialist for a complex topic.",
            ),
            spec(
                "end_call",
                "End the call after saying goodbye to the caller.",
            ),
        ]
    }

    async fn dispatch(&self, call: ToolCall) -> ToolResponse {
        let output = match call.name.as_str() {
            "check_availability" => self.check_availability(&call.arguments),
            "reserve_appointment" => self.reserve_appointment(&call.arguments),
            "transfer_to_specialist" => self.transfer_to_specialist(&call.arguments),
            "end_call" => self.end_call(),
            other => {
                warn!(tool = other, "unknown tool requested");
                "I cannot do that right now, but I'm happy to help another way.".to_string()
            }
        };
        ToolResponse::for_call(&call, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools() -> (ReceptionTools, mpsc::Receiver<EndReason>) {
        let (tx, rx) = mpsc::channel(4);
        (ReceptionTools::new(EndCallHandle::new(tx)), rx)
    }

    #[tokio::test]
    async fn response_omits_missing_call_id() {
        let (tools, _rx) = tools();
        let call = ToolCall {
            name: "check_availability".to_string(),
            arguments: json!({ "requested_date": "2026-09-07" }),
            call_id: None,
        };
        let response = tools.dispatch(call).await;
        let wire = serde_json::to_value(&response).unwrap();
        assert!(wire.get("call_id").is_none(), "null call_id must not be serialized");
    }

    #[tokio::test]
    async fn response_carries_call_id_when_given() {
        let (tools, _rx) = tools();
        let call = ToolCall {
            name: "transfer_to_specialist".to_string(),
            arguments: json!({ "topic": "networking" }),
            call_id: Some("call-42".to_string()),
        };
        let response = tools.dispatch(call).await;
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["call_id"], "call-42");
    }

    #[tokio::test]
    async fn end_call_signals_lifecycle() {
        let (tools, mut rx) = tools();
        let call = ToolCall {
            name: "end_call".to_string(),
            arguments: Value::Null,
            call_id: None,
        };
        let response = tools.dispatch(call).await;
        assert!(response.output.contains("Goodbye"));
        assert!(matches!(rx.try_recv(), Ok(EndReason::ToolRequested)));
    }

    #[tokio::test]
    async fn unknown_tool_degrades_politely() {
        let (tools, mut rx) = tools();
        let call = ToolCall {
            name: "launch_rocket".to_string(),
            arguments: Value::Null,
            call_id: None,
        };
        let response = tools.dispatch(call).await;
        assert_eq!(response.name, "launch_rocket");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn declares_full_capability_set() {
        let (tools, _rx) = tools();
        let names: Vec<String> = tools.definitions().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "check_availability",
                "reserve_appointment",
                "transfer_to_specialist",
                "end_call"
            ]
        );
    }
}
