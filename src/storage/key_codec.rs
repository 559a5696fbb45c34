//! Sequence number to row key / object name encoding.
//!
//! Row keys are the decimal sequence number left-padded with zeros to
//! [`KEY_WIDTH`] digits, so lexicographic key order equals numeric order.
//! That only holds below [`KEY_CAPACITY`]: `10^10` would need eleven digits
//! and sort between `"1000000000"` and `"1000000001"`. Writes therefore
//! refuse sequence numbers at or beyond the capacity instead of truncating.
//!
//! Object names follow `{persistence_id}.{padded_sequence}.{extension}`.

use std::ops::Bound;

use super::{Result, StorageError};

/// Number of decimal digits in an encoded sequence key.
pub const KEY_WIDTH: usize = 10;

/// First sequence number that cannot be encoded (`10^KEY_WIDTH`).
pub const KEY_CAPACITY: u64 = 10_000_000_000;

/// Encode a sequence number as a fixed-width sortable key.
pub fn encode_sequence(sequence_nr: u64) -> Result<String> {
    if sequence_nr >= KEY_CAPACITY {
        return Err(StorageError::KeyOutOfRange(sequence_nr));
    }
    Ok(format!("{:0width$}", sequence_nr, width = KEY_WIDTH))
}

/// Decode a key produced by [`encode_sequence`].
///
/// Accepts exactly [`KEY_WIDTH`] ASCII digits; anything else is malformed.
pub fn decode_sequence(key: &str) -> Result<u64> {
    if key.len() != KEY_WIDTH || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StorageError::MalformedKey(key.to_string()));
    }
    key.parse::<u64>()
        .map_err(|_| StorageError::MalformedKey(key.to_string()))
}

/// Inclusive lower range bound for a scan starting at `sequence_nr`.
///
/// Returns `None` when no encodable key can satisfy the bound, i.e. the scan
/// is empty.
pub fn lower_bound(sequence_nr: u64) -> Option<Bound<String>> {
    encode_sequence(sequence_nr).ok().map(Bound::Included)
}

/// Inclusive upper range bound for a scan ending at `sequence_nr`.
///
/// Bounds at or beyond the capacity (`u64::MAX` is the usual "latest"
/// marker) cover every encodable key and become unbounded.
pub fn upper_bound(sequence_nr: u64) -> Bound<String> {
    match encode_sequence(sequence_nr) {
        Ok(key) => Bound::Included(key),
        Err(_) => Bound::Unbounded,
    }
}

/// Object name for a snapshot of `persistence_id` at `sequence_nr`.
pub fn object_name(persistence_id: &str, sequence_nr: u64, extension: &str) -> Result<String> {
    Ok(format!(
        "{}.{}.{}",
        persistence_id,
        encode_sequence(sequence_nr)?,
        extension
    ))
}

/// Listing prefix covering every object name of `persistence_id`.
pub fn object_prefix(persistence_id: &str) -> String {
    format!("{}.", persistence_id)
}

/// Parse the sequence number out of an object name belonging to
/// `persistence_id`.
///
/// This is a strict format check: the name must be exactly
/// `{persistence_id}.` followed by [`KEY_WIDTH`] digits, a dot and
/// `extension`. Names of other streams that merely share the textual prefix
/// (`abc` vs `abcd`) and unrelated objects return `None`.
pub fn parse_object_name(name: &str, persistence_id: &str, extension: &str) -> Option<u64> {
    let rest = name.strip_prefix(persistence_id)?.strip_prefix('.')?;
    let (key, ext) = rest.split_once('.')?;
    if ext != extension {
        return None;
    }
    decode_sequence(key).ok()
}
