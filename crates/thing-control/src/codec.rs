//! Command channel framing.
//!
//! Commands arrive as newline-delimited JSON documents:
//!
//! ```text
//! {"commandID":"c1","actions":[{"AirConditionerAlias":[{"turnPower":true}]}]}
//! ```
//!
//! and one result document is sent back per command:
//!
//! ```text
//! {"commandID":"c1","actionResults":[{"AirConditionerAlias":[{"turnPower":{"succeeded":true}}]}]}
//! ```

use std::collections::BTreeMap;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thing_core::{ActionValue, CommandId, PendingAction};
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::dispatch::DispatchOutcome;
use crate::error::{ControlError, Result};

/// A decoded command: an identifier and the actions to apply in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Identifier echoed back in the result.
    pub id: CommandId,
    /// Actions in the order they were sent.
    pub actions: Vec<PendingAction>,
}

/// Result of one action within a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    /// Alias the action addressed.
    pub alias: String,
    /// Action name.
    pub action_name: String,
    /// Whether the action was applied.
    pub succeeded: bool,
    /// Why it was rejected.
    pub error_message: Option<String>,
}

impl ActionResult {
    /// Build the result of dispatching `action`.
    #[must_use]
    pub fn from_outcome(action: &PendingAction, outcome: &DispatchOutcome) -> Self {
        Self {
            alias: action.alias.clone(),
            action_name: action.action_name.clone(),
            succeeded: outcome.succeeded(),
            error_message: outcome.error_message(),
        }
    }
}

/// Results of every action of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The command's identifier.
    pub id: CommandId,
    /// One result per action, in order.
    pub results: Vec<ActionResult>,
}

/// Turns received bytes into commands and results into bytes.
pub trait CommandCodec: Send {
    /// Feed received bytes and return every command completed by them.
    ///
    /// Malformed input is skipped.
    fn decode(&mut self, bytes: &[u8]) -> Vec<Command>;

    /// Encode the result of a command.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Codec` if the result cannot be encoded.
    fn encode(&self, result: &CommandResult) -> Result<Vec<u8>>;

    /// Drop any partially received input, e.g. after a reconnect.
    fn reset(&mut self);
}

#[derive(Deserialize)]
struct WireCommand {
    #[serde(rename = "commandID")]
    command_id: CommandId,
    actions: Vec<Map<String, Value>>,
}

#[derive(Serialize)]
struct WireResult<'a> {
    #[serde(rename = "commandID")]
    command_id: &'a CommandId,
    #[serde(rename = "actionResults")]
    action_results: Vec<BTreeMap<&'a str, Vec<BTreeMap<&'a str, WireOutcome<'a>>>>>,
}

#[derive(Serialize)]
struct WireOutcome<'a> {
    succeeded: bool,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

fn action_value(value: Value) -> ActionValue {
    match value {
        Value::Bool(b) => ActionValue::Boolean(b),
        Value::Number(n) => n
            .as_i64()
            .map_or_else(|| ActionValue::Double(n.as_f64().unwrap_or(f64::NAN)), ActionValue::Integer),
        Value::String(s) => ActionValue::String(s),
        Value::Array(_) => ActionValue::Array(value.to_string()),
        Value::Null | Value::Object(_) => ActionValue::Object(value.to_string()),
    }
}

/// Parse one command document.
///
/// # Errors
///
/// Returns `ControlError::Codec` if the document is not a command.
pub fn parse_command(line: &[u8]) -> Result<Command> {
    let wire: WireCommand =
        serde_json::from_slice(line).map_err(|e| ControlError::Codec(e.to_string()))?;

    let mut actions = Vec::new();
    for entry in wire.actions {
        for (alias, list) in entry {
            let Value::Array(list) = list else {
                return Err(ControlError::Codec(format!(
                    "actions for {alias} must be an array"
                )));
            };
            for item in list {
                let Value::Object(item) = item else {
                    return Err(ControlError::Codec(format!(
                        "action under {alias} must be an object"
                    )));
                };
                for (name, value) in item {
                    actions.push(PendingAction::new(alias.clone(), name, action_value(value)));
                }
            }
        }
    }

    Ok(Command {
        id: wire.command_id,
        actions,
    })
}

/// Newline-delimited JSON framing with a bounded line length.
#[derive(Debug)]
pub struct JsonLinesCodec {
    lines: LinesCodec,
    buffer: BytesMut,
    max_line: usize,
}

impl JsonLinesCodec {
    /// Create a codec that drops lines longer than `max_line` bytes.
    #[must_use]
    pub fn new(max_line: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line),
            buffer: BytesMut::with_capacity(max_line),
            max_line,
        }
    }
}

impl CommandCodec for JsonLinesCodec {
    fn decode(&mut self, bytes: &[u8]) -> Vec<Command> {
        self.buffer.extend_from_slice(bytes);

        let mut commands = Vec::new();
        loop {
            match self.lines.decode(&mut self.buffer) {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse_command(line.as_bytes()) {
                    Ok(command) => commands.push(command),
                    Err(e) => {
                        tracing::warn!(error = %e, len = line.len(), "Skipping malformed command");
                    }
                },
                Ok(None) => break,
                // The rest of the line is dropped by later decode calls.
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    tracing::warn!(max = self.max_line, "Discarding oversized command");
                }
                // Invalid UTF-8; the line is already consumed.
                Err(LinesCodecError::Io(e)) => {
                    tracing::warn!(error = %e, "Skipping undecodable command");
                }
            }
        }

        commands
    }

    fn encode(&self, result: &CommandResult) -> Result<Vec<u8>> {
        let action_results = result
            .results
            .iter()
            .map(|r| {
                let outcome = WireOutcome {
                    succeeded: r.succeeded,
                    error_message: r.error_message.as_deref(),
                };
                BTreeMap::from([(
                    r.alias.as_str(),
                    vec![BTreeMap::from([(r.action_name.as_str(), outcome)])],
                )])
            })
            .collect();

        let mut encoded = serde_json::to_vec(&WireResult {
            command_id: &result.id,
            action_results,
        })
        .map_err(|e| ControlError::Codec(e.to_string()))?;
        encoded.push(b'\n');
        Ok(encoded)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.lines = LinesCodec::new_with_max_length(self.max_line);
    }
}
