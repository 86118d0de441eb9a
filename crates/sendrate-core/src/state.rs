/// Per-connection send-rate bookkeeping.
///
/// Owned by the connection for its whole lifetime and touched only by the
/// task driving that connection's writes, so plain fields are enough.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendRateState {
    /// Monotonic milliseconds of the last kernel sample. 0 until the first sample.
    last_sample_ms: u64,
    /// Kernel-reported outbound backlog at the last sample.
    /// Only comparable against later samples of the same socket.
    last_backlog: i64,
}

static_assertions::assert_eq_size!(SendRateState, [u8; 16]);
static_assertions::assert_impl_all!(SendRateState: Send, Copy);

impl SendRateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State as it would be right after a sample of `backlog` bytes taken at `sampled_at_ms`.
    pub fn from_sample(sampled_at_ms: u64, backlog: i64) -> Self {
        Self {
            last_sample_ms: sampled_at_ms,
            last_backlog: backlog,
        }
    }

    pub fn last_sample_ms(&self) -> u64 {
        self.last_sample_ms
    }

    pub fn last_backlog(&self) -> i64 {
        self.last_backlog
    }

    /// Milliseconds since the last sample. A clock that appears to run
    /// backwards yields 0, which keeps the anti-flap guard engaged.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_sample_ms)
    }

    /// Stores a fresh sample.
    pub(crate) fn record(&mut self, now_ms: u64, backlog: i64) {
        self.last_sample_ms = now_ms;
        self.last_backlog = backlog;
    }

    /// Zeroes the stored backlog after a successful write.
    ///
    /// The timestamp is kept: the next check still measures from the old
    /// sample, which forces a fresh kernel query once the window has passed.
    pub fn reset(&mut self) {
        self.last_backlog = 0;
    }
}
