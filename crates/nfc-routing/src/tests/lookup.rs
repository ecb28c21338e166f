use rstest::{fixture, rstest};

use super::{aid, sample_entries};
use crate::codec::encode;
use crate::entry::{EntryType, MatchQualifier, RoutingEntry};
use crate::snapshot::{RouteClass, RoutingTableSnapshot};

#[fixture]
fn snapshot() -> RoutingTableSnapshot {
    RoutingTableSnapshot::from_bytes(&encode(&sample_entries()), 64)
}

#[rstest]
#[case::exact_aid(
    EntryType::Aid,
    vec![0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10],
    RouteClass::OffHostRouted { nfcee_id: 0x02, power_state: 0x39 }
)]
#[case::prefix_aid(
    EntryType::Aid,
    vec![0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01],
    RouteClass::HostRouted { power_state: 0x39 }
)]
#[case::subset_aid(
    EntryType::Aid,
    vec![0xF0, 0x01],
    RouteClass::OffHostRouted { nfcee_id: 0x01, power_state: 0x39 }
)]
#[case::technology(
    EntryType::Technology,
    vec![0x00],
    RouteClass::OffHostRouted { nfcee_id: 0x02, power_state: 0x3B }
)]
#[case::system_code(
    EntryType::SystemCode,
    vec![0xFE, 0x00],
    RouteClass::OffHostRouted { nfcee_id: 0x02, power_state: 0x3B }
)]
#[case::unknown_protocol(EntryType::Protocol, vec![0x05], RouteClass::NotFound)]
fn classification_follows_table(
    snapshot: RoutingTableSnapshot,
    #[case] entry_type: EntryType,
    #[case] value: Vec<u8>,
    #[case] expected: RouteClass,
) {
    assert_eq!(snapshot.classify_route(entry_type, &value), expected);
}

#[test]
fn prefix_entry_requires_strictly_longer_query() {
    let table = RoutingTableSnapshot::new(
        vec![aid(&[0xA0, 0x00], 0x01, MatchQualifier::Prefix)],
        8,
        64,
    );
    assert_eq!(
        table.classify_route(EntryType::Aid, &[0xA0, 0x00, 0x01, 0x02]),
        RouteClass::OffHostRouted {
            nfcee_id: 0x01,
            power_state: 0x39
        }
    );
    assert_eq!(
        table.classify_route(EntryType::Aid, &[0xA0]),
        RouteClass::NotFound
    );
}

#[test]
fn subset_entry_requires_strictly_shorter_query() {
    let table = RoutingTableSnapshot::new(
        vec![aid(&[0xA0, 0x00, 0x01, 0x02], 0x02, MatchQualifier::Subset)],
        10,
        64,
    );
    assert_eq!(
        table.classify_route(EntryType::Aid, &[0xA0, 0x00]),
        RouteClass::OffHostRouted {
            nfcee_id: 0x02,
            power_state: 0x39
        }
    );
    assert_eq!(
        table.classify_route(EntryType::Aid, &[0xA0, 0x00, 0x01, 0x02, 0x03]),
        RouteClass::NotFound
    );
}

#[test]
fn combined_qualifier_matches_longer_and_shorter_queries() {
    let table = RoutingTableSnapshot::new(
        vec![aid(&[0xA0, 0x00, 0x01], 0x01, MatchQualifier::PrefixOrSubset)],
        7,
        64,
    );
    let routed = RouteClass::OffHostRouted {
        nfcee_id: 0x01,
        power_state: 0x39,
    };
    assert_eq!(table.classify_route(EntryType::Aid, &[0xA0, 0x00]), routed);
    assert_eq!(
        table.classify_route(EntryType::Aid, &[0xA0, 0x00, 0x01, 0x05]),
        routed
    );
    assert_eq!(
        table.classify_route(EntryType::Aid, &[0xB0, 0x00, 0x01, 0x05]),
        RouteClass::NotFound
    );
}

#[test]
fn exact_match_wins_over_earlier_prefix() {
    let table = RoutingTableSnapshot::new(
        vec![
            aid(&[0xA0], 0x00, MatchQualifier::Prefix),
            aid(&[0xA0, 0x00, 0x01], 0x02, MatchQualifier::Exact),
        ],
        12,
        64,
    );
    assert_eq!(
        table.classify_route(EntryType::Aid, &[0xA0, 0x00, 0x01]),
        RouteClass::OffHostRouted {
            nfcee_id: 0x02,
            power_state: 0x39
        }
    );
}

#[test]
fn first_qualified_match_in_table_order_wins() {
    let table = RoutingTableSnapshot::new(
        vec![
            aid(&[0xA0, 0x00], 0x03, MatchQualifier::Prefix),
            aid(&[0xA0], 0x01, MatchQualifier::Prefix),
        ],
        12,
        64,
    );
    assert_eq!(
        table.classify_route(EntryType::Aid, &[0xA0, 0x00, 0x07]),
        RouteClass::OffHostRouted {
            nfcee_id: 0x03,
            power_state: 0x39
        }
    );
}

#[test]
fn qualifiers_are_ignored_for_non_aid_entries() {
    let table = RoutingTableSnapshot::new(
        vec![RoutingEntry::technology(0x00, 0x01, 0x01).with_qualifier(MatchQualifier::Prefix)],
        4,
        64,
    );
    assert_eq!(
        table.classify_route(EntryType::Technology, &[0x00, 0x01]),
        RouteClass::NotFound
    );
}

#[rstest]
fn dump_lists_every_entry(snapshot: RoutingTableSnapshot) {
    let dump = snapshot.to_string();
    let lines: Vec<&str> = dump.lines().collect();

    assert_eq!(lines.first().copied(), Some("RoutingTableSize: 53/64"));
    assert_eq!(lines.len(), 2 + sample_entries().len());
    assert!(dump.contains("Technology A"));
    assert!(dump.contains("Protocol ISO_DEP"));
    assert!(dump.contains("AID A0000000041010"));
    assert!(dump.contains("SystemCode FE00"));
    assert!(dump.contains("AID Empty_AID"));
    assert!(lines.iter().any(|line| line.contains("AID A000000647") && line.ends_with("Prefix")));
    assert!(lines.iter().any(|line| line.contains("AID F0010203") && line.ends_with("Subset")));
}

#[test]
fn dump_reports_decode_failure() {
    let mut bytes = encode(&[RoutingEntry::protocol(0x04, 0x01, 0x3B)]);
    bytes.extend_from_slice(&[0x07, 0x03, 0x00, 0x01, 0x00]);

    let table = RoutingTableSnapshot::from_bytes(&bytes, 32);

    assert_eq!(table.entries().len(), 1);
    assert!(table.decode_error().is_some());
    assert!(table.to_string().contains("Decoding stopped: unknown routing entry type 0x07"));
}

#[test]
fn capacity_overflow_is_reported() {
    let table = RoutingTableSnapshot::from_bytes(&encode(&sample_entries()), 32);
    assert!(table.is_over_capacity());
}
