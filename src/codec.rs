//! Binary encoding of an [`Aggregate`] for the result channels.
//!
//! The payload is the aggregate as an ordered list of entries, serialized
//! with bincode's standard configuration, so keys are length prefixed and may
//! hold any characters. A frame is that payload behind a fixed length header:
//!
//! ```text
//! payload := bincode([(path, [(date, count)])])
//! frame   := payload_len (u64 LE) payload
//! ```

use crate::error::ChannelError;
use crate::stats::Aggregate;

/// Size of the frame's length header.
pub const HEADER_LEN: usize = 8;

/// Entry list as it travels; decoding into a list instead of a map keeps
/// repeated keys visible.
type WireEntries = Vec<(String, Vec<(String, u64)>)>;

pub fn encode(aggregate: &Aggregate) -> Result<Vec<u8>, ChannelError> {
    let entries: Vec<(&str, Vec<(&str, u64)>)> = aggregate
        .iter()
        .map(|(path, dates)| {
            let dates = dates.iter().map(|(date, count)| (date.as_str(), *count)).collect();
            (path.as_str(), dates)
        })
        .collect();
    bincode::serde::encode_to_vec(&entries, bincode::config::standard())
        .map_err(|e| ChannelError::Encode(e.to_string()))
}

pub fn decode(payload: &[u8]) -> Result<Aggregate, ChannelError> {
    let (entries, consumed): (WireEntries, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map_err(|e| corrupt(format!("undecodable payload: {e}")))?;
    if consumed != payload.len() {
        return Err(corrupt(format!(
            "{} trailing bytes after payload",
            payload.len() - consumed
        )));
    }

    let mut aggregate = Aggregate::new();
    for (path, dates) in entries {
        if dates.is_empty() {
            return Err(corrupt(format!("path {path:?} has no dates")));
        }
        if aggregate.contains_path(&path) {
            return Err(corrupt(format!("path {path:?} appears twice")));
        }
        for (date, count) in dates {
            if count == 0 {
                return Err(corrupt(format!("zero count for {path:?} on {date:?}")));
            }
            if aggregate.get(&path, &date).is_some() {
                return Err(corrupt(format!("date {date:?} appears twice under {path:?}")));
            }
            aggregate.add(path.clone(), date, count);
        }
    }
    Ok(aggregate)
}

/// Encodes and wraps the payload in a length header, refusing payloads
/// larger than `capacity`.
pub fn frame(aggregate: &Aggregate, capacity: u64) -> Result<Vec<u8>, ChannelError> {
    let payload = encode(aggregate)?;
    let size = payload.len() as u64;
    if size > capacity {
        return Err(ChannelError::PayloadTooLarge { size, capacity });
    }

    let mut framed = Vec::with_capacity(HEADER_LEN + payload.len());
    framed.extend_from_slice(&size.to_le_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Reverses [`frame`]: the header must announce exactly the bytes that follow.
pub fn unframe(framed: &[u8]) -> Result<Aggregate, ChannelError> {
    let header: [u8; HEADER_LEN] = framed
        .get(..HEADER_LEN)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| corrupt("frame shorter than its length header"))?;
    let announced = u64::from_le_bytes(header);
    let body = &framed[HEADER_LEN..];
    if announced != body.len() as u64 {
        return Err(corrupt(format!(
            "header announces {announced} bytes, frame carries {}",
            body.len()
        )));
    }
    decode(body)
}

fn corrupt(message: impl Into<String>) -> ChannelError {
    ChannelError::Corrupt(message.into())
}
