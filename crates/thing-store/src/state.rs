//! Mutex-guarded device state.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::sensor::{self, TemperatureSensor};
use crate::StateStore;

/// The writable device state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Whether the device is powered on.
    pub power: bool,
}

/// A consistent copy of the device state plus a freshly sampled temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Whether the device is powered on.
    pub power: bool,
    /// Current temperature in whole degrees Celsius.
    pub current_temperature: i32,
}

impl DeviceSnapshot {
    /// Build a snapshot from the stored state and a raw millidegree reading.
    ///
    /// Whole degrees truncate toward zero.
    #[must_use]
    pub const fn from_reading(state: DeviceState, millidegrees: i32) -> Self {
        Self {
            power: state.power,
            current_temperature: millidegrees / 1000,
        }
    }
}

/// The agent's [`StateStore`]: one mutex, bounded acquisition, live sensor.
pub struct MutexStateStore<S: TemperatureSensor> {
    state: Mutex<DeviceState>,
    sensor: S,
    lock_timeout: Duration,
}

impl<S: TemperatureSensor> MutexStateStore<S> {
    /// Create a store with the default state (power off).
    ///
    /// Lock acquisition gives up after `lock_timeout`.
    #[must_use]
    pub fn new(sensor: S, lock_timeout: Duration) -> Self {
        Self::with_state(DeviceState::default(), sensor, lock_timeout)
    }

    /// Create a store with an explicit initial state.
    #[must_use]
    pub fn with_state(state: DeviceState, sensor: S, lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(state),
            sensor,
            lock_timeout,
        }
    }

    /// Get a reference to the sensor.
    #[must_use]
    pub const fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Run `f` while holding the lock, without sampling the sensor.
    ///
    /// Used by tests to simulate a long critical section held elsewhere.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn hold_lock<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.state.lock();
        f()
    }
}

impl<S: TemperatureSensor> StateStore for MutexStateStore<S> {
    fn read(&self) -> Result<DeviceSnapshot> {
        let guard = self
            .state
            .try_lock_for(self.lock_timeout)
            .ok_or(StoreError::Lock)?;

        // The sensor is sampled while the lock is still held.
        let stored = *guard;
        let reading = self.sensor.read_millidegrees();
        drop(guard);

        if sensor::is_failure(reading) {
            tracing::warn!(code = reading, "Failed to read temperature");
            return Err(StoreError::Sensor { code: reading });
        }

        Ok(DeviceSnapshot::from_reading(stored, reading))
    }

    fn write(&self, mutate: &mut dyn FnMut(&mut DeviceState)) -> Result<()> {
        let mut guard = self
            .state
            .try_lock_for(self.lock_timeout)
            .ok_or(StoreError::Lock)?;
        mutate(&mut *guard);
        Ok(())
    }
}
