//! Remote actions addressed to the device.
//!
//! A remote command carries one or more actions, each addressed to a trait
//! alias and naming an action with a typed value. The agent exposes a single
//! alias with a single supported action.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The only trait alias this device answers to.
pub const AIR_CONDITIONER_ALIAS: &str = "AirConditionerAlias";

/// The only action that changes device state.
pub const TURN_POWER_ACTION: &str = "turnPower";

/// Identifier of a remote command, echoed back with its results.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandId(String);

impl CommandId {
    /// Wrap a command identifier.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyCommandId` if the identifier is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::EmptyCommandId);
        }
        Ok(Self(id))
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandId({})", self.0)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CommandId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CommandId> for String {
    fn from(id: CommandId) -> Self {
        id.0
    }
}

/// The typed value carried by an action.
///
/// Structured values are kept as their raw JSON text; the dispatcher only
/// needs to know their declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionValue {
    /// `true` or `false`.
    Boolean(bool),
    /// An integral number.
    Integer(i64),
    /// A floating point number.
    Double(f64),
    /// A string.
    String(String),
    /// A JSON object, as raw text.
    Object(String),
    /// A JSON array, as raw text.
    Array(String),
}

impl ActionValue {
    /// Returns the boolean if this value is declared boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Name of the declared type, for logs and error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
        }
    }
}

/// One inbound remote action, owned by the dispatcher for its whole life.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    /// The trait alias the action targets.
    pub alias: String,
    /// The action name within the alias.
    pub action_name: String,
    /// The value carried by the action.
    pub value: ActionValue,
}

impl PendingAction {
    /// Create a new pending action.
    #[must_use]
    pub fn new(alias: impl Into<String>, action_name: impl Into<String>, value: ActionValue) -> Self {
        Self {
            alias: alias.into(),
            action_name: action_name.into(),
            value,
        }
    }

    /// Returns true if the action targets this device's alias.
    #[must_use]
    pub fn targets_device(&self) -> bool {
        self.alias == AIR_CONDITIONER_ALIAS
    }
}
