//! Error types for the device state store.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or writing device state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Exclusive access to the state could not be acquired in time.
    #[error("failed to lock device state")]
    Lock,

    /// The live sensor read returned a failure sentinel.
    #[error("failed to read temperature, code: {code}")]
    Sensor {
        /// The sentinel value returned by the sensor.
        code: i32,
    },

    /// The state report could not be rendered.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns true if the next attempt may succeed without intervention.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Lock | Self::Sensor { .. })
    }
}
