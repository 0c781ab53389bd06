//! Device-side control for thing-agent.
//!
//! This crate turns remote actions into device state changes and keeps the
//! cloud informed of that state. It runs two independent channels over the
//! TLS transport:
//!
//! ```text
//!            ┌────────────────────────┐      ┌────────────────────────┐
//!  commands  │     CommandHandler     │      │      StateUpdater      │  reports
//!  ─────────▶│  codec ─▶ dispatcher   │      │  serializer ─▶ send    │─────────▶
//!  ◀─────────│  results               │      │  every update period   │
//!            └───────────┬────────────┘      └───────────┬────────────┘
//!                        │                               │
//!                        ▼                               ▼
//!            ┌─────────────────────────────────────────────────────┐
//!            │          StateStore (mutex + live sensor)           │
//!            └─────────────────────────────────────────────────────┘
//! ```
//!
//! Both channels poll a shared [`ShutdownCoordinator`] between blocking steps
//! and report their exit exactly once.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use thing_control::{
//!     Agent, AgentConfig, ChannelContext, LogIndicator, ShutdownCoordinator, TokioScheduler,
//! };
//! use thing_store::{MutexStateStore, W1Sensor};
//! use thing_transport::TlsConnector;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AgentConfig::default();
//! let coordinator = Arc::new(ShutdownCoordinator::new());
//! let ctx = ChannelContext {
//!     connector: Arc::new(TlsConnector::with_webpki_roots()?),
//!     coordinator: Arc::clone(&coordinator),
//!     scheduler: Arc::new(TokioScheduler::current()?),
//!     poll_interval: config.exit_poll(),
//! };
//! let sensor = W1Sensor::new("/sys/bus/w1/devices/28-000000000000/w1_slave");
//! let store = Arc::new(MutexStateStore::new(sensor, config.lock_timeout()));
//!
//! let agent = Agent::new(config, ctx, store, Arc::new(LogIndicator));
//! agent.start()?;
//!
//! coordinator.request_shutdown();
//! coordinator.wait_for_exit(Duration::from_secs(1)).await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agent;
pub mod backoff;
pub mod channel;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod indicator;
pub mod lifecycle;
pub mod scheduler;

pub use agent::Agent;
pub use backoff::Backoff;
pub use channel::{ChannelContext, CommandHandler, StateUpdater};
pub use codec::{ActionResult, Command, CommandCodec, CommandResult, JsonLinesCodec};
pub use config::{AgentConfig, LedNames};
pub use dispatch::{ActionDispatcher, DispatchOutcome, DispatchState};
pub use error::{ControlError, Result};
pub use indicator::{Indicator, LogIndicator, Rgb, SysfsRgbLed, POWER_ON_COLOR};
pub use lifecycle::{ExitGuard, ShutdownCoordinator};
pub use scheduler::{Scheduler, Task, TokioScheduler};

#[cfg(any(test, feature = "test-utils"))]
pub use indicator::mock::{IndicatorEvent, RecordingIndicator};
