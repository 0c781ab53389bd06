//! Core types shared across the thing-agent crates.
//!
//! This crate holds the vocabulary the other crates speak:
//!
//! - **Actions**: [`PendingAction`] and its typed [`ActionValue`], produced by the
//!   command decoder and consumed by the dispatcher
//! - **Channels**: the two long-running tasks of the agent, [`Channel`]
//! - **Error types**: [`CoreError`] for parse and conversion failures
//!
//! # Example
//!
//! ```
//! use thing_core::{ActionValue, PendingAction, AIR_CONDITIONER_ALIAS, TURN_POWER_ACTION};
//!
//! let action = PendingAction::new(AIR_CONDITIONER_ALIAS, TURN_POWER_ACTION, ActionValue::Boolean(true));
//! assert_eq!(action.value.as_bool(), Some(true));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod action;
pub mod channel;
pub mod error;

pub use action::{ActionValue, CommandId, PendingAction, AIR_CONDITIONER_ALIAS, TURN_POWER_ACTION};
pub use channel::Channel;
pub use error::{CoreError, Result};
