use sendrate_core::{RateTracked, SendRateState};

/// A connection as seen by the write paths: the socket plus the
/// per-connection flags a write-timeout handler needs.
#[derive(Debug)]
pub struct TrackedStream<S> {
    inner: S,
    send_rate: SendRateState,
    timed_out: bool,
    delayed: bool,
}

impl<S> TrackedStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            send_rate: SendRateState::new(),
            timed_out: false,
            delayed: false,
        }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn send_rate(&self) -> &SendRateState {
        &self.send_rate
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub(crate) fn set_timed_out(&mut self, timed_out: bool) {
        self.timed_out = timed_out;
    }

    /// Marks the pending write timer as a deliberate delay (e.g. an outer
    /// rate limiter) rather than a send timeout.
    pub fn set_delayed(&mut self, delayed: bool) {
        self.delayed = delayed;
    }

    pub fn is_delayed(&self) -> bool {
        self.delayed
    }
}

impl<S> RateTracked for TrackedStream<S> {
    type Socket = S;

    fn rate_parts(&mut self) -> (&S, &mut SendRateState) {
        (&self.inner, &mut self.send_rate)
    }
}
