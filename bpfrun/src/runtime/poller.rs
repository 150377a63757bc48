//! # Buffer Poller
//!
//! Drives one [`RecordSource`] until the exit signal is raised:
//!
//! ```text
//! loop {
//!     exit signalled?  ──yes──▶ return summary
//!     poll(timeout)
//!       Record ──decode──▶ sink      (decode failure: warn + skip)
//!       Lost   ──▶ warn + count
//!       Empty  ──▶ next round
//!       Error  ──▶ return PollError
//! }
//! ```
//!
//! `poll` never blocks longer than the timeout, so a stop request is seen
//! within one poll interval.

use std::time::Duration;

use log::{debug, warn};

use super::backend::{Polled, RecordSource};
use super::cancel::CancellationToken;
use crate::domain::{ExportSummary, LifecycleError};
use crate::export::{decode, ExportSchema, ExportSink};

/// Owns the subscription to one export map
pub struct BufferPoller {
    map: String,
    source: Box<dyn RecordSource>,
}

impl BufferPoller {
    #[must_use]
    pub fn new(map: impl Into<String>, source: Box<dyn RecordSource>) -> Self {
        Self { map: map.into(), source }
    }

    #[must_use]
    pub fn map(&self) -> &str {
        &self.map
    }

    /// Poll, decode and deliver until `exit` is cancelled.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Poll`] when the backend fails, or an output
    /// error when the sink cannot be written
    pub fn drive(
        &mut self,
        schema: &ExportSchema,
        sink: &mut ExportSink<'_>,
        exit: &CancellationToken,
        timeout: Duration,
    ) -> Result<ExportSummary, LifecycleError> {
        let mut summary = ExportSummary::default();

        while !exit.is_cancelled() {
            match self.source.poll(timeout) {
                Ok(Polled::Record(raw)) => match decode(schema, raw) {
                    Ok(record) => {
                        sink.deliver(&record)?;
                        summary.delivered += 1;
                    }
                    Err(e) => {
                        summary.decode_failures += 1;
                        warn!("Skipping record from {}: {e}", self.map);
                    }
                },
                Ok(Polled::Lost(count)) => {
                    summary.lost += count;
                    warn!("Lost {count} samples from {}", self.map);
                }
                Ok(Polled::Empty) => {}
                Err(e) => {
                    return Err(LifecycleError::Poll {
                        map: self.map.clone(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        debug!(
            "Export from {} finished: {} delivered, {} skipped, {} lost",
            self.map, summary.delivered, summary.decode_failures, summary.lost
        );
        Ok(summary)
    }
}
