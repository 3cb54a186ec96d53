//! RFC 5424 Formatting
//!
//! Turns a log envelope into a syslog message, plus the RFC 5425/6587
//! octet-counting frame used on stream transports.
//!
//! ```text
//! <PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID - - MSG\n
//! ```

use crate::domain::entities::{Binding, Envelope};
use chrono::{SecondsFormat, TimeZone, Utc};

const NIL: &str = "-";
const MAX_HOSTNAME: usize = 255;
const MAX_APP_NAME: usize = 48;
const MAX_PROC_ID: usize = 128;

/// Format a log envelope as an RFC 5424 message.
///
/// Returns `None` for envelopes that do not carry a log.
pub fn format(binding: &Binding, env: &Envelope) -> Option<Vec<u8>> {
    let log = env.as_log()?;

    let timestamp = Utc
        .timestamp_nanos(env.timestamp)
        .to_rfc3339_opts(SecondsFormat::Nanos, true);

    let header = format!(
        "<{}>1 {} {} {} {} - - ",
        log.log_type.priority(),
        timestamp,
        header_field(&binding.hostname, MAX_HOSTNAME),
        header_field(&binding.app_id, MAX_APP_NAME),
        header_field(&proc_id(env), MAX_PROC_ID),
    );

    let mut msg = Vec::with_capacity(header.len() + log.payload.len() + 1);
    msg.extend_from_slice(header.as_bytes());
    msg.extend(log.payload.iter().copied().filter(|b| *b != 0));
    msg.push(b'\n');
    Some(msg)
}

/// Prefix a message with its length: `<len> <msg>`.
pub fn octet_frame(msg: &[u8]) -> Vec<u8> {
    let prefix = format!("{} ", msg.len());
    let mut framed = Vec::with_capacity(prefix.len() + msg.len());
    framed.extend_from_slice(prefix.as_bytes());
    framed.extend_from_slice(msg);
    framed
}

/// `[SOURCE_TYPE/INSTANCE]`, or `[SOURCE_TYPE]` when there is no instance.
pub fn proc_id(env: &Envelope) -> String {
    let source_type = match env.tag("source_type") {
        Some(t) if !t.is_empty() => t.to_uppercase().replace(' ', "-"),
        _ => return NIL.to_string(),
    };

    match env.tag("source_instance") {
        Some(instance) if !instance.is_empty() => format!("[{}/{}]", source_type, instance),
        _ => format!("[{}]", source_type),
    }
}

/// Header fields are printable US-ASCII with a length cap; empty becomes NIL.
fn header_field(value: &str, max: usize) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_graphic())
        .take(max)
        .collect();
    if cleaned.is_empty() {
        NIL.to_string()
    } else {
        cleaned
    }
}
