use sendrate_core::Clock;
use tokio::time::Instant;

/// Millisecond clock driven by tokio's timer.
///
/// Follows the runtime's notion of time, so it stays in step with the write
/// timers it is compared against (including when time is paused in tests).
/// Readings are relative to the moment the clock was created.
///
/// A fresh connection state also starts at timestamp 0, so for the first
/// second after the clock is created every rate check lands inside the
/// sampling window and suppresses without querying the kernel.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self { anchor: Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.anchor.elapsed().as_millis() as u64
    }
}
