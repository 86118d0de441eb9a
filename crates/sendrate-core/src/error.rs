use core::fmt;
use std::time::Duration;

use crate::site::WriteSite;

#[derive(Debug)]
pub enum SendRateError {
    Transport(std::io::Error),
    Config(String),
    /// A write timer expired and the rate check did not rescue the connection.
    TimedOut { site: WriteSite, waited: Duration },
    /// The peer stopped accepting data (write returned 0).
    Closed,
}

impl fmt::Display for SendRateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendRateError::Transport(e) => write!(f, "transport error: {}", e),
            SendRateError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            SendRateError::TimedOut { site, waited } => {
                write!(f, "{} timed out after {:?}", site, waited)
            }
            SendRateError::Closed => f.write_str("connection closed by peer"),
        }
    }
}

impl std::error::Error for SendRateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SendRateError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SendRateError {
    fn from(e: std::io::Error) -> Self {
        SendRateError::Transport(e)
    }
}

impl From<toml::de::Error> for SendRateError {
    fn from(e: toml::de::Error) -> Self {
        SendRateError::Config(e.to_string())
    }
}
