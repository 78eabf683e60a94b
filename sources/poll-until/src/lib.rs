//! This library provides `poll`, a bounded loop that repeatedly runs a probe at a fixed cadence
//! until the probe reports a result, the probe fails, or the budget runs out.
//!
//! The budget is either a number of attempts or a deadline measured from the first attempt. The
//! loop sleeps between attempts, never after the last one, and returns `Ok(None)` when the budget
//! is spent so the caller can decide what exhaustion means.

use log::trace;
use std::thread;
use std::time::{Duration, Instant};

/// How long `poll` may keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// At most this many probe calls.
    Attempts(u32),
    /// Keep probing while less than this much time has passed since the first probe. The probe
    /// always runs at least once.
    Deadline(Duration),
    /// Probe until the probe itself decides to stop.
    Unbounded,
}

/// Calls `probe` with the 1-based attempt number until it returns `Ok(Some(_))` or an error, or
/// until `budget` is exhausted, sleeping `wait` between attempts.
pub fn poll<T, E, F>(budget: Budget, wait: Duration, mut probe: F) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Result<Option<T>, E>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        if let Some(found) = probe(attempt)? {
            return Ok(Some(found));
        }

        let more = match budget {
            Budget::Attempts(max) => attempt < max,
            // Only sleep if there'd still be time left for another probe afterwards.
            Budget::Deadline(deadline) => start.elapsed() + wait < deadline,
            Budget::Unbounded => true,
        };
        if !more {
            trace!("Giving up after {} attempts", attempt);
            return Ok(None);
        }

        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}
