use sendrate_core::{BacklogProbe, Clock, SendRateError, WriteLimits, WriteSite};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::clock::TokioClock;
use crate::probe::PlatformProbe;
use crate::stream::TrackedStream;
use crate::timeout::{TimeoutAction, TimeoutGuard};

/// Writes under a send timeout that a slow-but-draining peer can survive.
///
/// Each `write` is raced against the send timeout. Progress resets the
/// connection's rate state; an expired timer goes through `TimeoutGuard`,
/// which either rearms it or ends the write with `SendRateError::TimedOut`.
#[derive(Debug, Clone)]
pub struct GuardedWriter<P = PlatformProbe, C = TokioClock> {
    guard: TimeoutGuard<P, C>,
    limits: WriteLimits,
}

impl<P, C: Clock> GuardedWriter<P, C> {
    pub fn new(guard: TimeoutGuard<P, C>, limits: WriteLimits) -> Self {
        Self { guard, limits }
    }

    pub async fn write_all<S>(&self, site: WriteSite, conn: &mut TrackedStream<S>, mut buf: &[u8]) -> Result<(), SendRateError>
    where
        S: AsyncWrite + Unpin,
        P: BacklogProbe<S>,
    {
        let mut deadline = self.limits.send_timeout;
        let mut last_progress = Instant::now();

        while !buf.is_empty() {
            let outcome = tokio::time::timeout(deadline, conn.get_mut().write(buf)).await;
            match outcome {
                Ok(Ok(0)) => return Err(SendRateError::Closed),
                Ok(Ok(n)) => {
                    buf = &buf[n..];
                    last_progress = Instant::now();
                    deadline = self.limits.send_timeout;
                    self.guard.on_write_complete(conn);
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => match self.guard.on_write_timeout(site, conn, &self.limits) {
                    TimeoutAction::Rearm(next) => deadline = next,
                    TimeoutAction::Expire => {
                        return Err(SendRateError::TimedOut {
                            site,
                            waited: last_progress.elapsed(),
                        })
                    }
                },
            }
        }

        conn.get_mut().flush().await?;
        Ok(())
    }
}
