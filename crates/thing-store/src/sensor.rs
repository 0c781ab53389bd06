//! Temperature sensor collaborators.
//!
//! A sensor answers a single live read with a reading in millidegrees Celsius,
//! or with a large negative sentinel when the read failed. The store treats
//! any reading at or below [`SENSOR_FAILURE_THRESHOLD`] as a failure.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Readings at or below this value are failure sentinels.
pub const SENSOR_FAILURE_THRESHOLD: i32 = -9996;

/// The sensor device file could not be opened.
pub const SENSOR_OPEN_FAILED: i32 = -9999;

/// The sensor device file was empty or could not be read.
pub const SENSOR_READ_FAILED: i32 = -9998;

/// The sensor reported a CRC failure (no `YES` marker).
pub const SENSOR_CRC_FAILED: i32 = -9997;

/// The sensor output carried no `t=` temperature field.
pub const SENSOR_NO_TEMPERATURE: i32 = -9996;

/// Default directory where the kernel exposes 1-Wire slaves.
pub const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";

/// Family code prefix of DS18B20 thermometers.
const DS18B20_FAMILY: &str = "28-";

/// A live temperature source.
///
/// Implementations must not cache: every call samples the hardware.
pub trait TemperatureSensor: Send + Sync {
    /// Sample the sensor, returning millidegrees Celsius or a failure sentinel.
    fn read_millidegrees(&self) -> i32;
}

/// Returns true if the reading is a failure sentinel.
#[must_use]
pub const fn is_failure(reading: i32) -> bool {
    reading <= SENSOR_FAILURE_THRESHOLD
}

/// A DS18B20 thermometer read through the kernel `w1_slave` file.
///
/// The file holds two lines; the first ends in `YES` when the CRC matched and
/// the second ends in `t=<millidegrees>`.
#[derive(Debug, Clone)]
pub struct W1Sensor {
    path: PathBuf,
}

impl W1Sensor {
    /// Create a sensor reading the given `w1_slave` file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Find the first DS18B20 under `devices_dir`.
    ///
    /// Returns `None` if the directory cannot be listed or holds no thermometer.
    #[must_use]
    pub fn discover(devices_dir: impl AsRef<Path>) -> Option<Self> {
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(devices_dir.as_ref())
            .ok()?
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(DS18B20_FAMILY))
            .map(|entry| entry.path().join("w1_slave"))
            .collect();
        candidates.sort();

        let path = candidates.into_iter().next()?;
        tracing::debug!(path = %path.display(), "Discovered 1-Wire thermometer");
        Some(Self::new(path))
    }

    /// The `w1_slave` file this sensor reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemperatureSensor for W1Sensor {
    fn read_millidegrees(&self) -> i32 {
        let Ok(mut file) = File::open(&self.path) else {
            return SENSOR_OPEN_FAILED;
        };

        let mut contents = Vec::new();
        match file.read_to_end(&mut contents) {
            Ok(n) if n > 0 => parse_w1_slave(&String::from_utf8_lossy(&contents)),
            _ => SENSOR_READ_FAILED,
        }
    }
}

/// Parse the contents of a `w1_slave` file.
#[must_use]
pub fn parse_w1_slave(contents: &str) -> i32 {
    if !contents.contains("YES") {
        return SENSOR_CRC_FAILED;
    }
    let Some(start) = contents.find("t=") else {
        return SENSOR_NO_TEMPERATURE;
    };

    let mut rest = &contents[start + 2..];
    let sign = if let Some(stripped) = rest.strip_prefix('-') {
        rest = stripped;
        -1
    } else {
        1
    };

    let magnitude = rest
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i32, |acc, b| {
            acc.saturating_mul(10).saturating_add(i32::from(b - b'0'))
        });
    magnitude * sign
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! In-memory sensor for tests.

    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    use super::TemperatureSensor;

    /// A sensor returning a settable reading and counting reads.
    #[derive(Debug)]
    pub struct FixedSensor {
        reading: AtomicI32,
        reads: AtomicUsize,
    }

    impl FixedSensor {
        /// Create a sensor that returns `millidegrees` until changed.
        #[must_use]
        pub const fn new(millidegrees: i32) -> Self {
            Self {
                reading: AtomicI32::new(millidegrees),
                reads: AtomicUsize::new(0),
            }
        }

        /// Change the reading returned by later reads.
        pub fn set(&self, millidegrees: i32) {
            self.reading.store(millidegrees, Ordering::SeqCst);
        }

        /// Number of live reads performed so far.
        #[must_use]
        pub fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl TemperatureSensor for FixedSensor {
        fn read_millidegrees(&self) -> i32 {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.reading.load(Ordering::SeqCst)
        }
    }
}
