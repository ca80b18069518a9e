//! Host monitor: a single-threaded polling loop over the signal slot.
//!
//! Each tick runs to completion before the next one starts:
//! peek the slot, decide, act, update the watermark. The watermark is the
//! stamp of the last signal that was launched successfully; only strictly
//! newer signals are dispatched. Failed launches leave the trigger file and
//! the watermark untouched so the next tick retries.

mod browser;

pub use browser::{BrowserLauncher, SystemBrowser};

use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::signal::{ClearOutcome, Malformed, SignalSlot, Snapshot};

/// What one poll tick observed and did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No trigger file (or no metadata directory yet).
    Idle,
    /// A well-formed signal not newer than the watermark.
    Stale { stamp: f64 },
    /// Content that cannot be acted on; left in place.
    Malformed(Malformed),
    Dispatched {
        stamp: f64,
        url: Url,
        cleared: ClearOutcome,
    },
    /// The browser launch failed; the signal is kept for the next tick.
    Failed { stamp: f64, error: String },
}

pub struct HostMonitor<L> {
    slot: SignalSlot,
    launcher: L,
    poll_interval: Duration,
    watermark: Option<f64>,
    // Bytes of the last trigger we complained about, to log repeats quietly.
    last_reported: Option<Vec<u8>>,
}

impl<L: BrowserLauncher> HostMonitor<L> {
    pub fn new(slot: SignalSlot, launcher: L, poll_interval: Duration) -> Self {
        Self {
            slot,
            launcher,
            poll_interval,
            watermark: None,
            last_reported: None,
        }
    }

    /// Stamp of the last successfully processed signal.
    pub fn watermark(&self) -> Option<f64> {
        self.watermark
    }

    pub fn slot(&self) -> &SignalSlot {
        &self.slot
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run a single poll tick.
    ///
    /// Errors are filesystem failures other than "not there"; a malformed or
    /// stale trigger and a failed launch are ordinary outcomes.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let Some(snapshot) = self.slot.peek()? else {
            self.last_reported = None;
            return Ok(TickOutcome::Idle);
        };

        let signal = match &snapshot.parsed {
            Ok(sig) => sig.clone(),
            Err(m) => {
                if self.first_report(&snapshot) {
                    warn!(path = %self.slot.path().display(), "ignoring trigger: {m}");
                } else {
                    debug!("trigger still malformed: {m}");
                }
                return Ok(TickOutcome::Malformed(m.clone()));
            }
        };

        let stamp = signal.created_at;
        if self.watermark.is_some_and(|w| stamp <= w) {
            debug!(stamp, watermark = ?self.watermark, "trigger not newer than last processed signal");
            return Ok(TickOutcome::Stale { stamp });
        }

        info!(url = %signal.target_url, stamp, "launching browser");
        if let Err(e) = self.launcher.open(&signal.target_url) {
            let error = format!("{e:#}");
            if self.first_report(&snapshot) {
                error!(url = %signal.target_url, "browser launch failed, will retry: {error}");
            } else {
                debug!("browser launch failed again: {error}");
            }
            return Ok(TickOutcome::Failed { stamp, error });
        }

        self.watermark = Some(stamp);
        self.last_reported = None;
        let cleared = self.slot.clear_if_unchanged(&snapshot)?;
        if cleared == ClearOutcome::Replaced {
            info!("trigger was replaced during launch; keeping the new one");
        }
        Ok(TickOutcome::Dispatched {
            stamp,
            url: signal.target_url,
            cleared,
        })
    }

    /// Delay before the tick after `result`: the poll interval, doubled once
    /// after an unhandled error.
    pub fn delay_after(&self, result: &Result<TickOutcome>) -> Duration {
        match result {
            Ok(_) => self.poll_interval,
            Err(_) => self.poll_interval.saturating_mul(2),
        }
    }

    /// Poll forever. The process ends only when it is killed.
    pub fn run(&mut self) -> ! {
        info!(
            path = %self.slot.path().display(),
            interval_secs = self.poll_interval.as_secs_f64(),
            "host monitor watching for browser triggers"
        );
        loop {
            let result = self.tick();
            if let Err(e) = &result {
                error!("poll tick failed, backing off: {e:#}");
            }
            thread::sleep(self.delay_after(&result));
        }
    }

    fn first_report(&mut self, snapshot: &Snapshot) -> bool {
        if self.last_reported.as_deref() == Some(snapshot.bytes.as_slice()) {
            false
        } else {
            self.last_reported = Some(snapshot.bytes.clone());
            true
        }
    }
}
