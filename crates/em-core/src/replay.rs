//! Replay recorded snapshots through a reporter.
//!
//! Input is newline-delimited JSON, one frame per line:
//! `{"timestamp_ms": 100000, "snapshot": {"counters": {...}, ...}}`.
//! Each frame drives one report cycle with the clock set to its timestamp.

use em_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tracing::warn;

use crate::clock::ManualClock;
use crate::registry::MetricsSnapshot;
use crate::reporter::{Reporter, ReporterStats};

/// One recorded report cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub timestamp_ms: i64,
    #[serde(default)]
    pub snapshot: MetricsSnapshot,
}

/// Outcome of a replay run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub frames: u64,
    pub skipped_lines: u64,
    pub stats: ReporterStats,
}

/// Parse one input line; blank lines yield `None`.
pub fn parse_frame(line: &str, line_number: usize) -> Result<Option<ReplayFrame>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| Error::ReplayFrame {
            line: line_number,
            reason: e.to_string(),
        })
}

/// Feed every frame to `reporter`, then stop it.
///
/// Malformed frames are logged and skipped; read errors abort the replay
/// after the reporter has been stopped.
pub fn replay<R: BufRead>(
    reporter: &mut Reporter,
    clock: &ManualClock,
    input: R,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                reporter.stop();
                return Err(Error::Io(e));
            }
        };
        match parse_frame(&line, index + 1) {
            Ok(Some(frame)) => {
                clock.set_millis(frame.timestamp_ms);
                reporter.report(&frame.snapshot);
                summary.frames += 1;
            }
            Ok(None) => {}
            Err(e) => {
                summary.skipped_lines += 1;
                warn!(error = %e, "skipping replay frame");
            }
        }
    }

    reporter.stop();
    summary.stats = reporter.stats();
    Ok(summary)
}
