//! Device state storage for thing-agent.
//!
//! This crate owns the canonical device state and everything needed to turn
//! it into an outbound state report:
//!
//! - [`StateStore`]: the store trait, with snapshot reads and mutator writes
//! - [`MutexStateStore`]: the mutex-guarded implementation used by the agent
//! - [`TemperatureSensor`]: the live sensor sampled on every read
//! - [`ChunkedStateSerializer`]: drains a rendered report across bounded reads
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use thing_store::{ChunkedStateSerializer, MutexStateStore, StateStore, TemperatureSensor};
//!
//! struct Room;
//! impl TemperatureSensor for Room {
//!     fn read_millidegrees(&self) -> i32 { 23_500 }
//! }
//!
//! let store = MutexStateStore::new(Room, Duration::from_millis(100));
//! store.set_power(true).unwrap();
//!
//! let mut serializer = ChunkedStateSerializer::new(&store);
//! let mut out = Vec::new();
//! let mut buf = [0u8; 16];
//! loop {
//!     let n = serializer.read_chunk(&mut buf).unwrap();
//!     if n == 0 { break; }
//!     out.extend_from_slice(&buf[..n]);
//! }
//! assert_eq!(
//!     out,
//!     br#"{"AirConditionerAlias":{"power":true,"currentTemperature":23}}"#
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod report;
pub mod sensor;
pub mod state;

pub use error::{Result, StoreError};
pub use report::{render_report, ChunkedStateSerializer, SerializationCursor};
pub use sensor::{TemperatureSensor, W1Sensor, SENSOR_FAILURE_THRESHOLD};
pub use state::{DeviceSnapshot, DeviceState, MutexStateStore};

#[cfg(any(test, feature = "test-utils"))]
pub use sensor::mock::FixedSensor;

/// The device state store.
///
/// Every operation takes exclusive access for its whole duration. A failure to
/// acquire that access is reported as `StoreError::Lock`; callers must drop the
/// operation rather than proceed without the lock.
pub trait StateStore: Send + Sync {
    /// Produce a consistent snapshot, sampling the sensor live under the lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Lock` if the lock cannot be acquired, or
    /// `StoreError::Sensor` if the live sensor read fails. No partial snapshot
    /// is ever returned.
    fn read(&self) -> Result<DeviceSnapshot>;

    /// Apply `mutate` to the stored state under the lock.
    ///
    /// Only the fields of [`DeviceState`] are writable; the sensor-derived
    /// temperature is never stored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Lock` if the lock cannot be acquired.
    fn write(&self, mutate: &mut dyn FnMut(&mut DeviceState)) -> Result<()>;

    /// Set the power flag.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Lock` if the lock cannot be acquired.
    fn set_power(&self, power: bool) -> Result<()> {
        self.write(&mut |state| state.power = power)
    }
}
