//! In-memory store of complete four-channel rows.

use chrono::{DateTime, Local};

use crate::channel::Channel;

/// The four decoded samples captured on one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRow {
    pub tick: u64,
    pub captured_at: DateTime<Local>,
    pub values: [u32; 4],
}

impl SampleRow {
    pub fn new(tick: u64, captured_at: DateTime<Local>, values: [u32; 4]) -> Self {
        Self {
            tick,
            captured_at,
            values,
        }
    }

    pub fn value(&self, channel: Channel) -> u32 {
        self.values[channel.index()]
    }
}

/// Append-only sequence of rows for one session.
///
/// Rows only enter the buffer whole, so the four columns can never drift
/// apart. `snapshot` borrows the buffer, which keeps appends out for as
/// long as the view is alive.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    rows: Vec<SampleRow>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, row: SampleRow) {
        self.rows.push(row);
    }

    pub fn snapshot(&self) -> &[SampleRow] {
        &self.rows
    }

    pub fn last(&self) -> Option<&SampleRow> {
        self.rows.last()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
