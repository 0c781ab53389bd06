//! Agent configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thing_transport::EndpointConfig;

use crate::error::{ControlError, Result};

/// Names of the three LED-class devices forming the power indicator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedNames {
    /// Red LED.
    pub red: String,
    /// Green LED.
    pub green: String,
    /// Blue LED.
    pub blue: String,
}

/// Configuration for the agent process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentConfig {
    /// Command channel host.
    #[serde(default = "AgentConfig::default_host")]
    pub command_host: String,

    /// Command channel port.
    #[serde(default = "AgentConfig::default_port")]
    pub command_port: u16,

    /// State report host; the command host when unset.
    #[serde(default)]
    pub report_host: Option<String>,

    /// State report port; the command port when unset.
    #[serde(default)]
    pub report_port: Option<u16>,

    /// Socket receive timeout in seconds; 0 disables it.
    #[serde(default = "AgentConfig::default_timeout")]
    pub recv_timeout_seconds: u64,

    /// Socket send timeout in seconds; 0 disables it.
    #[serde(default = "AgentConfig::default_timeout")]
    pub send_timeout_seconds: u64,

    /// Seconds between state reports.
    #[serde(default = "AgentConfig::default_update_period")]
    pub update_period_seconds: u64,

    /// Receive buffer size of the command channel, also the longest command.
    #[serde(default = "AgentConfig::default_buffer")]
    pub command_buffer_size: usize,

    /// Send buffer size of the report channel.
    #[serde(default = "AgentConfig::default_buffer")]
    pub report_buffer_size: usize,

    /// First reconnect delay in milliseconds.
    #[serde(default = "AgentConfig::default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Upper bound of the reconnect delay in milliseconds.
    #[serde(default = "AgentConfig::default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,

    /// How often the process checks for channel exit, in milliseconds.
    #[serde(default = "AgentConfig::default_exit_poll")]
    pub exit_poll_ms: u64,

    /// How long to wait for the state lock, in milliseconds.
    #[serde(default = "AgentConfig::default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// `w1_slave` file of the thermometer; discovered when unset.
    #[serde(default)]
    pub sensor_path: Option<PathBuf>,

    /// Indicator LEDs; the indicator only logs when unset.
    #[serde(default)]
    pub led_names: Option<LedNames>,
}

impl AgentConfig {
    fn default_host() -> String {
        "localhost".to_string()
    }

    const fn default_port() -> u16 {
        443
    }

    const fn default_timeout() -> u64 {
        15
    }

    const fn default_update_period() -> u64 {
        10
    }

    const fn default_buffer() -> usize {
        4096
    }

    const fn default_reconnect_delay() -> u64 {
        1000
    }

    const fn default_max_reconnect_delay() -> u64 {
        30_000
    }

    const fn default_exit_poll() -> u64 {
        1000
    }

    const fn default_lock_timeout() -> u64 {
        1000
    }

    /// Load configuration from a JSON file; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ControlError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ControlError::Config(format!("{}: {e}", path.display())))
    }

    /// Check values that would make a channel unable to run.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.command_host.is_empty() {
            return Err(ControlError::Config("command_host is empty".into()));
        }
        if self.report_host.as_deref() == Some("") {
            return Err(ControlError::Config("report_host is empty".into()));
        }
        if self.command_buffer_size == 0 || self.report_buffer_size == 0 {
            return Err(ControlError::Config("buffer sizes must be positive".into()));
        }
        if self.update_period_seconds == 0 {
            return Err(ControlError::Config("update_period_seconds must be positive".into()));
        }
        if self.exit_poll_ms == 0 {
            return Err(ControlError::Config("exit_poll_ms must be positive".into()));
        }
        if self.reconnect_delay_ms > self.max_reconnect_delay_ms {
            return Err(ControlError::Config(
                "reconnect_delay_ms exceeds max_reconnect_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Endpoint of the command channel.
    #[must_use]
    pub fn command_endpoint(&self) -> EndpointConfig {
        EndpointConfig::new(self.command_host.clone(), self.command_port)
            .with_timeouts(self.recv_timeout(), self.send_timeout())
    }

    /// Endpoint of the state report channel.
    #[must_use]
    pub fn report_endpoint(&self) -> EndpointConfig {
        let host = self
            .report_host
            .clone()
            .unwrap_or_else(|| self.command_host.clone());
        EndpointConfig::new(host, self.report_port.unwrap_or(self.command_port))
            .with_timeouts(self.recv_timeout(), self.send_timeout())
    }

    /// Get the receive timeout as a `Duration`.
    #[must_use]
    pub const fn recv_timeout(&self) -> Duration {
        Duration::from_secs(self.recv_timeout_seconds)
    }

    /// Get the send timeout as a `Duration`.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }

    /// Get the report period as a `Duration`.
    #[must_use]
    pub const fn update_period(&self) -> Duration {
        Duration::from_secs(self.update_period_seconds)
    }

    /// Get the first reconnect delay as a `Duration`.
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Get the reconnect delay cap as a `Duration`.
    #[must_use]
    pub const fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    /// Get the exit poll interval as a `Duration`.
    #[must_use]
    pub const fn exit_poll(&self) -> Duration {
        Duration::from_millis(self.exit_poll_ms)
    }

    /// Get the state lock timeout as a `Duration`.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command_host: Self::default_host(),
            command_port: Self::default_port(),
            report_host: None,
            report_port: None,
            recv_timeout_seconds: Self::default_timeout(),
            send_timeout_seconds: Self::default_timeout(),
            update_period_seconds: Self::default_update_period(),
            command_buffer_size: Self::default_buffer(),
            report_buffer_size: Self::default_buffer(),
            reconnect_delay_ms: Self::default_reconnect_delay(),
            max_reconnect_delay_ms: Self::default_max_reconnect_delay(),
            exit_poll_ms: Self::default_exit_poll(),
            lock_timeout_ms: Self::default_lock_timeout(),
            sensor_path: None,
            led_names: None,
        }
    }
}
