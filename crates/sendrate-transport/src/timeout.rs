//! # sendrate-transport: Write Timeout Handling
//!
//! The suppress-or-fail step shared by every write path. Each call site
//! (response, both proxy variants, tunnel) funnels its timer expiry through
//! `TimeoutGuard::on_write_timeout` so the state machine exists exactly once.

use sendrate_core::{BacklogProbe, Clock, SendRateDetector, WriteLimits, WriteSite};
use std::time::Duration;

use crate::clock::TokioClock;
use crate::probe::PlatformProbe;
use crate::stream::TrackedStream;

/// What the caller should do with an expired write timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Still draining fast enough: arm the timer again for this long.
    Rearm(Duration),
    /// Give up: the write has stalled.
    Expire,
}

#[derive(Debug, Clone, Default)]
pub struct TimeoutGuard<P = PlatformProbe, C = TokioClock> {
    detector: SendRateDetector<P, C>,
}

impl TimeoutGuard<PlatformProbe, TokioClock> {
    /// Native probe where available, tokio time.
    pub fn platform() -> Self {
        Self::new(PlatformProbe::detect(), TokioClock::new())
    }
}

impl<P, C: Clock> TimeoutGuard<P, C> {
    pub fn new(probe: P, clock: C) -> Self {
        Self {
            detector: SendRateDetector::with_clock(probe, clock),
        }
    }

    /// Called when a write timer fires.
    pub fn on_write_timeout<S>(&self, site: WriteSite, conn: &mut TrackedStream<S>, limits: &WriteLimits) -> TimeoutAction
    where
        P: BacklogProbe<S>,
    {
        conn.set_timed_out(true);

        if conn.is_delayed() {
            tracing::debug!("{}: timer fired on a delayed write, rate check skipped", site);
            return TimeoutAction::Expire;
        }

        if self.detector.is_sending_above_rate(conn, limits.minimum_send_rate) {
            conn.set_timed_out(false);
            tracing::debug!(
                "{}: send timeout suppressed, still draining at >= {}B/s; rearming for {:?}",
                site,
                limits.minimum_send_rate,
                limits.send_timeout
            );
            return TimeoutAction::Rearm(limits.send_timeout);
        }

        tracing::info!("{}: client timed out while sending", site);
        TimeoutAction::Expire
    }

    /// Called after every write that made progress.
    pub fn on_write_complete<S>(&self, conn: &mut TrackedStream<S>) {
        self.detector.reset_send_rate(conn);
    }
}
