//! Binary codec for the listen-mode routing table.
//!
//! Each entry is a TLV record: a header byte holding the entry type in the low
//! nibble and the qualifier bits above it, a length byte covering the two
//! trailing NFCEE/power bytes plus the value, then the NFCEE id, the power
//! state, and the value itself. Decoding never fails outright: it returns the
//! entries parsed before the first structural violation together with that
//! violation.

use thiserror::Error;
use tracing::warn;

use crate::entry::{
    EntryType, MatchQualifier, QUALIFIER_BLOCKING, QUALIFIER_PREFIX, QUALIFIER_SUBSET,
    RoutingEntry, SYSTEM_CODE_LEN, TYPE_MASK,
};

pub(crate) const CODEC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::codec");

const HEADER_LEN: usize = 2;
const TRAILER_LEN: usize = 2;

/// Structural violations that stop routing-table decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The type nibble is not one of the four known entry types.
    #[error("unknown routing entry type {nibble:#04x} at offset {offset}")]
    UnknownType {
        /// Byte offset of the entry header.
        offset: usize,
        /// Unrecognised type nibble.
        nibble: u8,
    },
    /// The entry header or body runs past the end of the buffer.
    #[error("routing entry at offset {offset} needs {declared} bytes but only {available} remain")]
    Truncated {
        /// Byte offset of the entry header.
        offset: usize,
        /// Bytes the entry claims to occupy after its header.
        declared: usize,
        /// Bytes actually left after the header.
        available: usize,
    },
    /// The value length does not fit the entry type.
    #[error("{entry_type} entry at offset {offset} carries an invalid {len}-byte value")]
    LengthMismatch {
        /// Byte offset of the entry header.
        offset: usize,
        /// Type named by the header.
        entry_type: EntryType,
        /// Length of the value portion.
        len: usize,
    },
}

/// Result of decoding a routing-table buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decoded {
    /// Entries parsed before decoding stopped.
    pub entries: Vec<RoutingEntry>,
    /// Violation that stopped decoding early, if any.
    pub error: Option<DecodeError>,
}

/// Encodes entries into the routing-table byte layout.
#[must_use]
pub fn encode(entries: &[RoutingEntry]) -> Vec<u8> {
    let capacity = entries
        .iter()
        .map(|entry| HEADER_LEN + TRAILER_LEN + entry.value().len())
        .sum();
    let mut bytes = Vec::with_capacity(capacity);
    for entry in entries {
        let body_len = u8::try_from(TRAILER_LEN + entry.value().len()).unwrap_or(u8::MAX);
        bytes.push(entry.header_byte());
        bytes.push(body_len);
        bytes.push(entry.nfcee_id());
        bytes.push(entry.power_state());
        bytes.extend_from_slice(entry.value());
    }
    bytes
}

/// Decodes a routing-table buffer, stopping at the first malformed entry.
#[must_use]
pub fn decode(bytes: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();
    let mut offset = 0;
    while offset < bytes.len() {
        match decode_entry(bytes, offset) {
            Ok((mut entries, next)) => {
                decoded.entries.append(&mut entries);
                offset = next;
            }
            Err(error) => {
                warn!(
                    target: CODEC_TARGET,
                    %error,
                    parsed = decoded.entries.len(),
                    discarded = bytes.len() - offset,
                    "routing table decoding stopped early"
                );
                decoded.error = Some(error);
                break;
            }
        }
    }
    decoded
}

fn decode_entry(bytes: &[u8], offset: usize) -> Result<(Vec<RoutingEntry>, usize), DecodeError> {
    let remaining = bytes.get(offset..).unwrap_or_default();
    let [header, declared, rest @ ..] = remaining else {
        return Err(DecodeError::Truncated {
            offset,
            declared: HEADER_LEN,
            available: remaining.len(),
        });
    };

    let nibble = header & TYPE_MASK;
    let entry_type =
        EntryType::from_nibble(nibble).ok_or(DecodeError::UnknownType { offset, nibble })?;
    let qualifier = qualifier_from_header(*header);
    let blocking = header & QUALIFIER_BLOCKING != 0;

    let declared = usize::from(*declared);
    let body = rest.get(..declared).ok_or(DecodeError::Truncated {
        offset,
        declared,
        available: rest.len(),
    })?;
    let [nfcee_id, power_state, value @ ..] = body else {
        return Err(DecodeError::LengthMismatch {
            offset,
            entry_type,
            len: 0,
        });
    };

    let build = |chunk: &[u8]| {
        RoutingEntry::raw(entry_type, chunk.to_vec(), *nfcee_id, *power_state)
            .with_qualifier(qualifier)
            .with_blocking(blocking)
    };

    let entries = if entry_type == EntryType::SystemCode
        && value.len() > SYSTEM_CODE_LEN
        && value.len().is_multiple_of(SYSTEM_CODE_LEN)
    {
        value.chunks_exact(SYSTEM_CODE_LEN).map(build).collect()
    } else if entry_type.accepts_len(value.len()) {
        vec![build(value)]
    } else {
        return Err(DecodeError::LengthMismatch {
            offset,
            entry_type,
            len: value.len(),
        });
    };

    Ok((entries, offset + HEADER_LEN + declared))
}

const fn qualifier_from_header(header: u8) -> MatchQualifier {
    match (header & QUALIFIER_PREFIX != 0, header & QUALIFIER_SUBSET != 0) {
        (false, false) => MatchQualifier::Exact,
        (true, false) => MatchQualifier::Prefix,
        (false, true) => MatchQualifier::Subset,
        (true, true) => MatchQualifier::PrefixOrSubset,
    }
}
