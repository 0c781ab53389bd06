//! State reports and the chunked read protocol.
//!
//! The reporting transport pulls the report in two phases: it first asks for
//! a length hint, then repeatedly reads bounded chunks until a read returns 0.
//! The report is rendered once per cycle, on the first chunk read, so every
//! chunk of one cycle comes from the same snapshot.

use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::state::DeviceSnapshot;
use crate::StateStore;

/// Wire shape of the report. Field order is part of the format.
#[derive(Serialize)]
struct ReportDocument {
    #[serde(rename = "AirConditionerAlias")]
    air_conditioner: ReportedState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportedState {
    power: bool,
    current_temperature: i32,
}

/// Render a snapshot to its canonical report text.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if encoding fails.
pub fn render_report(snapshot: &DeviceSnapshot) -> Result<Vec<u8>> {
    let document = ReportDocument {
        air_conditioner: ReportedState {
            power: snapshot.power,
            current_temperature: snapshot.current_temperature,
        },
    };
    serde_json::to_vec(&document).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Read position into a rendered report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializationCursor {
    position: usize,
}

impl SerializationCursor {
    /// Bytes already handed out.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    fn advance(&mut self, by: usize) {
        self.position += by;
    }
}

/// Serves one report cycle across repeated bounded reads.
///
/// Create a fresh serializer for every cycle; it is consumed once the cursor
/// reaches the end of the rendered buffer.
pub struct ChunkedStateSerializer<'a, S: StateStore + ?Sized> {
    store: &'a S,
    rendered: Option<Vec<u8>>,
    cursor: SerializationCursor,
}

impl<'a, S: StateStore + ?Sized> ChunkedStateSerializer<'a, S> {
    /// Start a new report cycle against `store`.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self {
            store,
            rendered: None,
            cursor: SerializationCursor { position: 0 },
        }
    }

    /// Length hint for the reporting transport.
    ///
    /// Before the first chunk is read this is a conservative 1, enough to make
    /// the transport start reading; the real end of the report is the first
    /// chunk read that returns 0. After rendering it is the exact length.
    #[must_use]
    pub fn total_length(&self) -> usize {
        self.rendered.as_ref().map_or(1, |buf| buf.len().max(1))
    }

    /// Copy the next slice of the report into `out`.
    ///
    /// At most `out.len()` bytes are written. Returns 0 once the report has
    /// been fully drained. An empty `out` also yields 0 without advancing, so
    /// callers treating 0 as the end must pass a non-empty buffer; otherwise
    /// check [`is_exhausted`](Self::is_exhausted).
    ///
    /// # Errors
    ///
    /// Returns the store error if the snapshot for this cycle cannot be taken;
    /// the cycle should then be abandoned.
    pub fn read_chunk(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.rendered.is_none() {
            let snapshot = self.store.read()?;
            self.rendered = Some(render_report(&snapshot)?);
        }
        let Some(rendered) = self.rendered.as_deref() else {
            return Ok(0);
        };

        let remaining = &rendered[self.cursor.position()..];
        let n = remaining.len().min(out.len());
        out[..n].copy_from_slice(&remaining[..n]);
        self.cursor.advance(n);
        Ok(n)
    }

    /// Returns true once every byte of the rendered report was handed out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.rendered
            .as_ref()
            .is_some_and(|buf| self.cursor.position() >= buf.len())
    }

    /// Current cursor.
    #[must_use]
    pub const fn cursor(&self) -> SerializationCursor {
        self.cursor
    }
}
