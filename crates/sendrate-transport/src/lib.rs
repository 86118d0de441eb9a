pub use sendrate_core::{RateTracked, RateVerdict, SendRateDetector, SendRateError, SendRateState, WriteLimits, WriteSite};
pub mod clock;
pub mod probe;
pub mod relay;
pub mod server;
pub mod stream;
pub mod timeout;
pub mod writer;

pub use clock::TokioClock;
pub use probe::PlatformProbe;
pub use relay::{relay_buffered, relay_unbuffered, tunnel, TunnelStats};
pub use server::SendRateServer;
pub use stream::TrackedStream;
pub use timeout::{TimeoutAction, TimeoutGuard};
pub use writer::GuardedWriter;
