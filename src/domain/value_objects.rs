//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use crate::domain::entities::Binding;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use thiserror::Error;

/// Placement state: adapter address -> bindings held by that adapter.
///
/// Ordered maps keep every iteration over adapters and bindings
/// deterministic, which the placement algorithm relies on.
pub type State = BTreeMap<String, BTreeSet<Binding>>;

/// Transport selected by the drain URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrainScheme {
    /// `syslog://` - plain TCP, octet-counted framing
    Syslog,
    /// `syslog-tls://` - TCP over TLS, octet-counted framing
    SyslogTls,
    /// `https://` - one HTTP POST per message
    Https,
}

impl DrainScheme {
    /// Parse a URL scheme; unknown schemes yield `None`.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "syslog" => Some(Self::Syslog),
            "syslog-tls" => Some(Self::SyslogTls),
            "https" => Some(Self::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syslog => "syslog",
            Self::SyslogTls => "syslog-tls",
            Self::Https => "https",
        }
    }
}

impl std::fmt::Display for DrainScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Blacklist construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlacklistError {
    #[error("invalid IP address: {0}")]
    InvalidIp(String),
    #[error("range start {start} is after range end {end}")]
    StartAfterEnd { start: String, end: String },
    #[error("malformed range: {0}")]
    Malformed(String),
}

/// An inclusive range of forbidden drain addresses.
///
/// Addresses are compared as 16-byte values (IPv4 in its IPv6-mapped form),
/// so a range may span either family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRange {
    start: IpAddr,
    end: IpAddr,
}

impl IpRange {
    pub fn new(start: &str, end: &str) -> Result<Self, BlacklistError> {
        let start_ip: IpAddr = start
            .trim()
            .parse()
            .map_err(|_| BlacklistError::InvalidIp(start.to_string()))?;
        let end_ip: IpAddr = end
            .trim()
            .parse()
            .map_err(|_| BlacklistError::InvalidIp(end.to_string()))?;

        if to_16(start_ip) > to_16(end_ip) {
            return Err(BlacklistError::StartAfterEnd {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        Ok(Self {
            start: start_ip,
            end: end_ip,
        })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = to_16(ip);
        to_16(self.start) <= ip && ip <= to_16(self.end)
    }

    pub fn start(&self) -> IpAddr {
        self.start
    }

    pub fn end(&self) -> IpAddr {
        self.end
    }
}

fn to_16(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

/// The set of forbidden destination ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    ranges: Vec<IpRange>,
}

impl Blacklist {
    pub fn new(ranges: Vec<IpRange>) -> Self {
        Self { ranges }
    }

    /// Parse a comma separated list of `start-end` ranges.
    ///
    /// An empty string yields an empty blacklist.
    pub fn parse(s: &str) -> Result<Self, BlacklistError> {
        let mut ranges = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (start, end) = part
                .split_once('-')
                .ok_or_else(|| BlacklistError::Malformed(part.to_string()))?;
            ranges.push(IpRange::new(start, end)?);
        }
        Ok(Self { ranges })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.ranges.iter().any(|r| r.contains(ip))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }
}
