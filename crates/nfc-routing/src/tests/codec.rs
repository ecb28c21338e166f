use rstest::rstest;

use super::sample_entries;
use crate::codec::{DecodeError, decode, encode};
use crate::entry::{EntryType, MatchQualifier, RoutingEntry};

#[test]
fn sample_table_survives_encoding() {
    let entries = sample_entries();
    let decoded = decode(&encode(&entries));
    assert_eq!(decoded.error, None);
    assert_eq!(decoded.entries, entries);
}

#[test]
fn encoded_layout_matches_tlv_format() {
    let entry = RoutingEntry::new(EntryType::Aid, [0xA0, 0x00, 0x01], 0x02, 0x39)
        .expect("valid aid")
        .with_qualifier(MatchQualifier::Subset);
    assert_eq!(encode(&[entry]), vec![0x22, 0x05, 0x02, 0x39, 0xA0, 0x00, 0x01]);
}

#[test]
fn truncated_entry_keeps_earlier_entries() {
    let mut bytes = encode(&sample_entries()[..2]);
    bytes.extend_from_slice(&[0x02, 0x09, 0x01, 0x39, 0xA0]);

    let decoded = decode(&bytes);

    assert_eq!(decoded.entries, sample_entries()[..2].to_vec());
    assert_eq!(
        decoded.error,
        Some(DecodeError::Truncated {
            offset: 8,
            declared: 9,
            available: 3,
        })
    );
}

#[rstest]
#[case::unknown_type(vec![0x05, 0x03, 0x00, 0x01, 0x00])]
#[case::technology_too_long(vec![0x00, 0x04, 0x00, 0x01, 0x00, 0x01])]
#[case::missing_trailer(vec![0x01, 0x01, 0x00])]
#[case::odd_system_code(vec![0x03, 0x05, 0x00, 0x01, 0xFE, 0x00, 0x12])]
#[case::zero_length_body(vec![0x00, 0x00])]
fn malformed_entry_stops_decoding(#[case] tail: Vec<u8>) {
    let head = RoutingEntry::protocol(0x04, 0x01, 0x3B);
    let mut bytes = encode(std::slice::from_ref(&head));
    bytes.extend_from_slice(&tail);
    bytes.extend_from_slice(&encode(&[RoutingEntry::technology(0x01, 0x00, 0x01)]));

    let decoded = decode(&bytes);

    assert_eq!(decoded.entries, vec![head]);
    assert!(decoded.error.is_some(), "expected a decode error for {tail:02x?}");
}

#[test]
fn prefix_and_subset_bits_together_keep_decoding() {
    let tail = RoutingEntry::technology(0x01, 0x00, 0x01);
    let mut bytes = vec![0x32, 0x04, 0x01, 0x39, 0xA0, 0x00];
    bytes.extend_from_slice(&encode(std::slice::from_ref(&tail)));

    let decoded = decode(&bytes);

    assert_eq!(decoded.error, None);
    let [combined, last] = decoded.entries.as_slice() else {
        panic!("expected two entries, got {:?}", decoded.entries);
    };
    assert_eq!(combined.qualifier(), MatchQualifier::PrefixOrSubset);
    assert_eq!(combined.value(), &[0xA0, 0x00]);
    assert_eq!(last, &tail);
    assert_eq!(encode(&decoded.entries), bytes);
}

#[test]
fn long_system_code_splits_into_pairs() {
    let bytes = [0x53, 0x08, 0x02, 0x3B, 0xFE, 0x00, 0x88, 0xB4, 0x12, 0xFC];

    let decoded = decode(&bytes);

    assert_eq!(decoded.error, None);
    let codes: Vec<Vec<u8>> = decoded
        .entries
        .iter()
        .map(|entry| entry.value().to_vec())
        .collect();
    assert_eq!(codes, vec![vec![0xFE, 0x00], vec![0x88, 0xB4], vec![0x12, 0xFC]]);
    assert!(decoded.entries.iter().all(|entry| {
        entry.entry_type() == EntryType::SystemCode
            && entry.qualifier() == MatchQualifier::Prefix
            && entry.blocking()
            && entry.nfcee_id() == 0x02
            && entry.power_state() == 0x3B
    }));
}

#[test]
fn empty_buffer_decodes_to_empty_table() {
    let decoded = decode(&[]);
    assert!(decoded.entries.is_empty());
    assert_eq!(decoded.error, None);
}
