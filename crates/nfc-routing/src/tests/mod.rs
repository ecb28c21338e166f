//! Crate-level unit and behaviour tests.

use crate::entry::{EntryType, MatchQualifier, RoutingEntry};

mod codec;
mod lookup;

/// Builds an AID entry, panicking on invalid input.
fn aid(value: &[u8], nfcee_id: u8, qualifier: MatchQualifier) -> RoutingEntry {
    RoutingEntry::new(EntryType::Aid, value.to_vec(), nfcee_id, 0x39)
        .expect("valid aid")
        .with_qualifier(qualifier)
}

/// Representative table mixing every entry type.
fn sample_entries() -> Vec<RoutingEntry> {
    vec![
        RoutingEntry::technology(0x00, 0x02, 0x3B),
        RoutingEntry::technology(0x02, 0x00, 0x01).with_blocking(true),
        RoutingEntry::protocol(0x04, 0x01, 0x3B),
        aid(&[0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10], 0x02, MatchQualifier::Exact),
        aid(&[0xA0, 0x00, 0x00, 0x06, 0x47], 0x00, MatchQualifier::Prefix),
        aid(&[0xF0, 0x01, 0x02, 0x03], 0x01, MatchQualifier::Subset),
        RoutingEntry::system_code([0xFE, 0x00], 0x02, 0x3B),
        aid(&[], 0x00, MatchQualifier::Exact),
    ]
}
