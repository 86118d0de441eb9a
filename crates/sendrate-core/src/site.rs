use core::fmt;

/// The write paths that consult the rate detector when their timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteSite {
    /// Direct response body writer.
    Response,
    /// Proxy pass-through that fills a buffer before writing downstream.
    ProxyBuffered,
    /// Proxy pass-through that forwards each upstream chunk as it arrives.
    ProxyUnbuffered,
    /// Bidirectional tunnel or protocol upgrade.
    Tunnel,
}

impl WriteSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteSite::Response => "response writer",
            WriteSite::ProxyBuffered => "buffered proxy writer",
            WriteSite::ProxyUnbuffered => "unbuffered proxy writer",
            WriteSite::Tunnel => "tunnel writer",
        }
    }
}

impl fmt::Display for WriteSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
