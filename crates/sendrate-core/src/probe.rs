use crate::state::SendRateState;

/// Reads how many bytes a socket still holds in its outbound kernel buffer.
///
/// Implementations are best-effort: any failure, or a platform without the
/// capability, reports 0. A zero backlog can only make a stall look *more*
/// stalled, so a missing probe never keeps a dead connection alive.
pub trait BacklogProbe<S: ?Sized> {
    fn unacknowledged_bytes(&self, socket: &S) -> u64;
}

impl<S: ?Sized, P: BacklogProbe<S> + ?Sized> BacklogProbe<S> for &P {
    fn unacknowledged_bytes(&self, socket: &S) -> u64 {
        (**self).unacknowledged_bytes(socket)
    }
}

/// A connection that carries its own send-rate state.
pub trait RateTracked {
    type Socket: ?Sized;

    /// Splits the connection into the socket the probe reads and the
    /// state the engine updates.
    fn rate_parts(&mut self) -> (&Self::Socket, &mut SendRateState);
}
