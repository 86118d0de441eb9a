use crate::clock::Clock;
use crate::probe::{BacklogProbe, RateTracked};
use crate::state::SendRateState;

/// Minimum spacing between two kernel samples of the same connection.
pub const SAMPLE_INTERVAL_MS: u64 = 1000;

/// Outcome of a single rate check.
///
/// Only `BelowRate` and `Disabled` let a write timeout proceed; everything
/// else suppresses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateVerdict {
    /// `minimum_rate` is 0 for the active scope.
    Disabled,
    /// Less than one sampling interval since the last sample. No query was made.
    InsufficientInterval,
    /// The backlog grew since the last sample: the writer is still feeding the socket.
    BacklogGrew { grown_by: u64 },
    AboveRate { bytes_sent: u64, required: u64 },
    BelowRate { bytes_sent: u64, required: u64 },
}

impl RateVerdict {
    pub fn is_above_rate(&self) -> bool {
        !matches!(self, RateVerdict::Disabled | RateVerdict::BelowRate { .. })
    }

    /// True when a kernel sample was taken (and stored) to reach this verdict.
    pub fn sampled(&self) -> bool {
        !matches!(self, RateVerdict::Disabled | RateVerdict::InsufficientInterval)
    }
}

/// Bytes that must have drained in `elapsed_ms` to keep up with `minimum_rate` bytes/s.
pub fn required_bytes(elapsed_ms: u64, minimum_rate: u64) -> u64 {
    let required = (elapsed_ms as u128 * minimum_rate as u128) / 1000;
    u64::try_from(required).unwrap_or(u64::MAX)
}

/// Core decision over an explicit state and timestamp.
///
/// `current_backlog` is only invoked once the disabled and anti-flap
/// short-circuits have been passed; whenever it is invoked the new sample
/// is written back into `state` before returning.
pub fn evaluate<F>(state: &mut SendRateState, now_ms: u64, minimum_rate: u64, current_backlog: F) -> RateVerdict
where
    F: FnOnce() -> u64,
{
    if minimum_rate == 0 {
        return RateVerdict::Disabled;
    }

    let elapsed = state.elapsed_ms(now_ms);
    if elapsed < SAMPLE_INTERVAL_MS {
        return RateVerdict::InsufficientInterval;
    }

    let backlog = i64::try_from(current_backlog()).unwrap_or(i64::MAX);
    let bytes_sent = state.last_backlog().saturating_sub(backlog);
    state.record(now_ms, backlog);

    if bytes_sent < 0 {
        return RateVerdict::BacklogGrew {
            grown_by: bytes_sent.unsigned_abs(),
        };
    }

    let bytes_sent = bytes_sent as u64;
    let required = required_bytes(elapsed, minimum_rate);
    if bytes_sent >= required {
        RateVerdict::AboveRate { bytes_sent, required }
    } else {
        RateVerdict::BelowRate { bytes_sent, required }
    }
}

/// Decides whether a connection whose write timer fired is still draining
/// its kernel send buffer at an acceptable rate.
///
/// ## Cost
/// The anti-flap path is a subtraction and a compare. A sampled check adds
/// one non-blocking syscall through the probe. Nothing here allocates or waits.
#[derive(Debug, Clone, Default)]
pub struct SendRateDetector<P, C> {
    probe: P,
    clock: C,
}

impl<P, C: Clock> SendRateDetector<P, C> {
    pub fn with_clock(probe: P, clock: C) -> Self {
        Self { probe, clock }
    }

    /// Runs the check and reports why it decided the way it did.
    pub fn check<T>(&self, conn: &mut T, minimum_rate: u64) -> RateVerdict
    where
        T: RateTracked + ?Sized,
        P: BacklogProbe<T::Socket>,
    {
        let now = self.clock.now_ms();
        let (socket, state) = conn.rate_parts();
        let verdict = evaluate(state, now, minimum_rate, || self.probe.unacknowledged_bytes(socket));

        if verdict.sampled() {
            tracing::debug!(
                "send rate sample: min_rate={}B/s backlog={} verdict={:?}",
                minimum_rate,
                state.last_backlog(),
                verdict
            );
        }
        verdict
    }

    /// True when the write timeout should be suppressed.
    pub fn is_sending_above_rate<T>(&self, conn: &mut T, minimum_rate: u64) -> bool
    where
        T: RateTracked + ?Sized,
        P: BacklogProbe<T::Socket>,
    {
        self.check(conn, minimum_rate).is_above_rate()
    }

    /// Forgets the stored backlog after a successful write.
    pub fn reset_send_rate<T: RateTracked + ?Sized>(&self, conn: &mut T) {
        conn.rate_parts().1.reset();
    }
}
