//! Power indicator actuators.
//!
//! The device shows its power state on an RGB LED: a fixed colour while on,
//! dark while off.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default directory of Linux LED-class devices.
pub const LEDS_DIR: &str = "/sys/class/leds";

/// Colour shown while the device is powered on.
pub const POWER_ON_COLOR: Rgb = Rgb::new(0, 50, 0);

/// An RGB colour, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    /// Red channel.
    pub red: u8,
    /// Green channel.
    pub green: u8,
    /// Blue channel.
    pub blue: u8,
}

impl Rgb {
    /// Create a colour from its channels.
    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.red, self.green, self.blue)
    }
}

/// Drives the power indicator.
pub trait Indicator: Send + Sync {
    /// Light the indicator with `color`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the hardware could not be driven.
    fn turn_on(&self, color: Rgb) -> io::Result<()>;

    /// Switch the indicator off.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the hardware could not be driven.
    fn turn_off(&self) -> io::Result<()>;
}

/// Three single-colour LEDs exposed through the kernel LED class.
#[derive(Debug, Clone)]
pub struct SysfsRgbLed {
    red: PathBuf,
    green: PathBuf,
    blue: PathBuf,
}

impl SysfsRgbLed {
    /// Drive the LEDs named `red`, `green` and `blue` under `leds_dir`.
    #[must_use]
    pub fn new(leds_dir: impl AsRef<Path>, red: &str, green: &str, blue: &str) -> Self {
        let brightness = |name: &str| leds_dir.as_ref().join(name).join("brightness");
        Self {
            red: brightness(red),
            green: brightness(green),
            blue: brightness(blue),
        }
    }

    fn write(&self, color: Rgb) -> io::Result<()> {
        for (path, level) in [
            (&self.red, color.red),
            (&self.green, color.green),
            (&self.blue, color.blue),
        ] {
            fs::write(path, format!("{level}\n"))?;
        }
        Ok(())
    }
}

impl Indicator for SysfsRgbLed {
    fn turn_on(&self, color: Rgb) -> io::Result<()> {
        self.write(color)
    }

    fn turn_off(&self) -> io::Result<()> {
        self.write(Rgb::default())
    }
}

/// An indicator for devices without one; only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn turn_on(&self, color: Rgb) -> io::Result<()> {
        tracing::info!(color = %color, "Indicator on");
        Ok(())
    }

    fn turn_off(&self) -> io::Result<()> {
        tracing::info!("Indicator off");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Recording indicator for tests.

    use std::io;

    use parking_lot::Mutex;

    use super::{Indicator, Rgb};

    /// One call made on the indicator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum IndicatorEvent {
        /// `turn_on` with this colour.
        On(Rgb),
        /// `turn_off`.
        Off,
    }

    /// Records every call; optionally fails them.
    #[derive(Debug, Default)]
    pub struct RecordingIndicator {
        events: Mutex<Vec<IndicatorEvent>>,
        failing: bool,
    }

    impl RecordingIndicator {
        /// Create an indicator that accepts every call.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create an indicator whose calls are recorded and then fail.
        #[must_use]
        pub fn failing() -> Self {
            Self {
                events: Mutex::default(),
                failing: true,
            }
        }

        /// Calls made so far.
        #[must_use]
        pub fn events(&self) -> Vec<IndicatorEvent> {
            self.events.lock().clone()
        }

        fn record(&self, event: IndicatorEvent) -> io::Result<()> {
            self.events.lock().push(event);
            if self.failing {
                return Err(io::Error::other("indicator unavailable"));
            }
            Ok(())
        }
    }

    impl Indicator for RecordingIndicator {
        fn turn_on(&self, color: Rgb) -> io::Result<()> {
            self.record(IndicatorEvent::On(color))
        }

        fn turn_off(&self) -> io::Result<()> {
            self.record(IndicatorEvent::Off)
        }
    }
}
