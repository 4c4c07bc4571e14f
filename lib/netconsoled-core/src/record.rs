//! Record data model.

use std::{borrow::Cow, fmt, net::SocketAddr, time::Duration};

use snafu::Snafu;

/// Source address errors.
#[derive(Debug, Eq, PartialEq, Snafu)]
#[snafu(context(suffix(false)))]
pub enum AddressError {
    /// The address had no port component.
    #[snafu(display("missing port in address '{}'", address))]
    MissingPort {
        /// The offending address.
        address: String,
    },

    /// The address had more colons than a bracket-less `host:port` pair allows.
    #[snafu(display("too many colons in address '{}'", address))]
    TooManyColons {
        /// The offending address.
        address: String,
    },

    /// The address had an unterminated or misplaced IPv6 bracket.
    #[snafu(display("malformed brackets in address '{}'", address))]
    MalformedBrackets {
        /// The offending address.
        address: String,
    },
}

/// Address of the peer that sent a log message.
///
/// Listeners deal almost exclusively in socket addresses, but some transports (and tests) only know the peer by a
/// textual `host:port` value, which may not be well-formed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SourceAddress {
    /// A socket address.
    SocketLike(SocketAddr),

    /// A textual `host:port` address.
    Textual(String),
}

impl SourceAddress {
    /// Returns the host portion of the address, discarding the port.
    ///
    /// IPv4-mapped IPv6 socket addresses, as seen on dual-stack sockets, are reported as their IPv4 address.
    ///
    /// # Errors
    ///
    /// If the address is textual and not a valid `host:port` pair, an error is returned.
    pub fn host(&self) -> Result<Cow<'_, str>, AddressError> {
        match self {
            Self::SocketLike(addr) => Ok(Cow::Owned(addr.ip().to_canonical().to_string())),
            Self::Textual(addr) => split_host(addr).map(Cow::Borrowed),
        }
    }
}

impl fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SocketLike(addr) => canonical(*addr).fmt(f),
            Self::Textual(addr) => f.pad(addr),
        }
    }
}

impl From<SocketAddr> for SourceAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::SocketLike(addr)
    }
}

impl From<String> for SourceAddress {
    fn from(addr: String) -> Self {
        Self::Textual(addr)
    }
}

impl From<&str> for SourceAddress {
    fn from(addr: &str) -> Self {
        Self::Textual(addr.to_string())
    }
}

fn canonical(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::from((v4, v6.port())),
            None => addr,
        },
        SocketAddr::V4(_) => addr,
    }
}

fn split_host(address: &str) -> Result<&str, AddressError> {
    let Some(last_colon) = address.rfind(':') else {
        return MissingPort { address }.fail();
    };

    let host = &address[..last_colon];
    if let Some(rest) = host.strip_prefix('[') {
        // Bracketed hosts must close right before the port separator.
        return match rest.strip_suffix(']') {
            Some(inner) if !inner.contains(['[', ']']) => Ok(inner),
            _ => MalformedBrackets { address }.fail(),
        };
    }

    if host.contains(['[', ']']) {
        return MalformedBrackets { address }.fail();
    }

    if host.contains(':') {
        return TooManyColons { address }.fail();
    }

    Ok(host)
}

/// A single log message, as decoded by a log source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogEntry {
    /// Time elapsed since the sender booted (or started), as reported by the sender.
    pub elapsed: Duration,

    /// The log message.
    pub message: String,
}

impl LogEntry {
    /// Creates a new `LogEntry`.
    pub fn new<M: Into<String>>(elapsed: Duration, message: M) -> Self {
        Self {
            elapsed,
            message: message.into(),
        }
    }
}

/// A log record flowing through the pipeline.
///
/// Filters take ownership of a record and hand back either the same record or a replacement, while sinks only ever
/// borrow it.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Where the log entry came from.
    pub source: SourceAddress,

    /// The log entry itself.
    pub entry: LogEntry,
}

impl Record {
    /// Creates a new `Record`.
    pub fn new<A: Into<SourceAddress>>(source: A, entry: LogEntry) -> Self {
        Self {
            source: source.into(),
            entry,
        }
    }
}
