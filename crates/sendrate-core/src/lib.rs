pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod probe;
pub mod site;
pub mod state;

pub use clock::{Clock, ManualClock};
pub use config::{LocationConfig, ScopeLimits, ServerConfig, WriteLimits};
pub use engine::{RateVerdict, SendRateDetector, SAMPLE_INTERVAL_MS};
pub use error::SendRateError;
pub use probe::{BacklogProbe, RateTracked};
pub use site::WriteSite;
pub use state::SendRateState;
