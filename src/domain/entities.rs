//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of syslog egress: the
//! binding that ties an application to an external drain, and the log
//! envelopes streamed from the log provider to that drain.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An application's syslog drain binding.
///
/// The triple `(app_id, hostname, drain)` is the identity of a binding
/// everywhere in the system: two bindings with the same triple are the
/// same binding on the scheduler and on every adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    /// Application GUID whose logs are drained
    pub app_id: String,
    /// Hostname written into the syslog HOSTNAME field
    pub hostname: String,
    /// External drain URL (syslog://, syslog-tls:// or https://)
    pub drain: String,
}

impl Binding {
    pub fn new(
        app_id: impl Into<String>,
        hostname: impl Into<String>,
        drain: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            hostname: hostname.into(),
            drain: drain.into(),
        }
    }

    /// Routing key handed to the log provider.
    ///
    /// The provider delivers each envelope of a shard to exactly one of the
    /// streams opened with that shard id.
    pub fn shard_id(&self) -> String {
        format!("{}{}{}", self.app_id, self.hostname, self.drain)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) -> {}", self.app_id, self.hostname, self.drain)
    }
}

/// Stream a log line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LogType {
    #[default]
    #[serde(rename = "OUT")]
    Out,
    #[serde(rename = "ERR")]
    Err,
}

impl LogType {
    /// Syslog PRI value: facility user (1), severity info (6) or error (3).
    pub fn priority(&self) -> u8 {
        match self {
            Self::Out => 14,
            Self::Err => 11,
        }
    }
}

/// A single log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub payload: Bytes,
    pub log_type: LogType,
}

/// The typed body of an envelope.
///
/// Only logs are forwarded to drains; every other kind of envelope the
/// provider may emit (counters, gauges, timers, events) is carried as
/// `Other` and dropped by the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeMessage {
    Log(Log),
    Other,
}

/// A record delivered by the log provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source_id: String,
    pub instance_id: String,
    /// Nanoseconds since the Unix epoch
    pub timestamp: i64,
    pub tags: HashMap<String, String>,
    pub message: EnvelopeMessage,
}

impl Envelope {
    /// Build a log envelope.
    pub fn log(
        source_id: impl Into<String>,
        timestamp: i64,
        payload: impl Into<Bytes>,
        log_type: LogType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            instance_id: String::new(),
            timestamp,
            tags: HashMap::new(),
            message: EnvelopeMessage::Log(Log {
                payload: payload.into(),
                log_type,
            }),
        }
    }

    /// Attach a tag, builder style.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn as_log(&self) -> Option<&Log> {
        match &self.message {
            EnvelopeMessage::Log(log) => Some(log),
            EnvelopeMessage::Other => None,
        }
    }

    pub fn is_log(&self) -> bool {
        self.as_log().is_some()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}
