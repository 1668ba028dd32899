//! Wire-record encoding
//!
//! Entries and messages are encoded into [`Segment`]s at the call site, then
//! rendered to publish payloads by the background loop. The wire format is a
//! flat JSON object; nested arrays and objects are rejected at encode time so
//! an enqueued segment can always be rendered.

use super::error::{LoggerError, Result};
use super::log_level::LogLevel;
use super::pool::BufferPool;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Field map handed to [`crate::core::Logger::log_entry`].
pub type EntryFields = HashMap<String, Value>;

/// An encoded, broker-agnostic record awaiting byte rendering.
///
/// A segment is rendered at most once: [`Segment::render_into`] consumes the
/// payload, so rendering an already-rendered or degenerate segment yields
/// zero bytes. The publish loop uses that to skip empty payloads.
#[derive(Debug)]
pub struct Segment {
    payload: Option<Vec<u8>>,
}

impl Segment {
    /// A degenerate segment that renders to nothing.
    pub fn empty() -> Self {
        Self { payload: None }
    }

    fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            payload: Some(bytes),
        }
    }

    /// Append the encoded record to `buf`, consuming the payload.
    ///
    /// Returns the spent backing storage so the caller can hand it back to
    /// the scratch pool it was checked out of.
    pub fn render_into(&mut self, buf: &mut Vec<u8>) -> Option<Vec<u8>> {
        let bytes = self.payload.take()?;
        buf.extend_from_slice(&bytes);
        Some(bytes)
    }
}

#[derive(Serialize)]
struct EntryRecord<'a> {
    source: &'a str,
    fields: &'a EntryFields,
}

#[derive(Serialize)]
struct MessageRecord<'a> {
    source: &'a str,
    level: &'a str,
    message: &'a str,
    time: i64,
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Encode a structured entry into a segment.
///
/// Deterministic: the same fields always produce the same record. Fails with
/// [`LoggerError::EncodingError`] when a field holds a nested array or object,
/// since the wire record is flat.
pub fn encode_entry(scratch: &BufferPool, source: &str, fields: &EntryFields) -> Result<Segment> {
    for (key, value) in fields {
        if value.is_array() || value.is_object() {
            return Err(LoggerError::encoding(key, value_kind(value)));
        }
    }

    let mut buf = scratch.acquire();
    let record = EntryRecord { source, fields };
    if let Err(err) = serde_json::to_writer(&mut buf, &record) {
        scratch.release(buf);
        return Err(err.into());
    }
    Ok(Segment::from_bytes(buf))
}

/// Encode a free-text message into a segment. Never fails: the message shape
/// is always representable, and the unreachable serializer-error arm degrades
/// to a degenerate segment the publish loop discards.
pub fn encode_message(
    scratch: &BufferPool,
    source: &str,
    level: LogLevel,
    message: &str,
    time: i64,
) -> Segment {
    let mut buf = scratch.acquire();
    let record = MessageRecord {
        source,
        level: level.to_str(),
        message,
        time,
    };
    match serde_json::to_writer(&mut buf, &record) {
        Ok(()) => Segment::from_bytes(buf),
        Err(_) => {
            scratch.release(buf);
            Segment::empty()
        }
    }
}
