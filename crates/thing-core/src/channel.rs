//! The long-running tasks of the agent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One independent long-running task of the agent.
///
/// Each channel owns its own transport endpoint and its own termination flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Receives remote actions and applies them to the device.
    CommandHandler,
    /// Periodically publishes the current device state.
    StateUpdater,
}

impl Channel {
    /// Every channel, in start order.
    pub const ALL: [Self; 2] = [Self::CommandHandler, Self::StateUpdater];

    /// Stable index used for per-channel flag arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::CommandHandler => 0,
            Self::StateUpdater => 1,
        }
    }

    /// Short name used in logs and thread names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CommandHandler => "command-handler",
            Self::StateUpdater => "state-updater",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "command-handler" | "handler" => Ok(Self::CommandHandler),
            "state-updater" | "updater" => Ok(Self::StateUpdater),
            other => Err(CoreError::UnknownChannel(other.to_string())),
        }
    }
}
