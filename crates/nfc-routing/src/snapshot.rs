//! Parsed routing-table snapshots and route lookup.

use std::fmt;

use crate::codec::{self, DecodeError};
use crate::entry::{EntryType, RoutingEntry};

/// Where a queried value is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Traffic is delivered to the device host.
    HostRouted {
        /// Power states of the matching entry.
        power_state: u8,
    },
    /// Traffic is delivered to an off-host execution environment.
    OffHostRouted {
        /// NFCEE that receives the traffic.
        nfcee_id: u8,
        /// Power states of the matching entry.
        power_state: u8,
    },
    /// No entry matches the value.
    NotFound,
}

/// Immutable view of the routing table fetched from the controller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingTableSnapshot {
    entries: Vec<RoutingEntry>,
    current_size: usize,
    max_size: usize,
    decode_error: Option<DecodeError>,
}

impl RoutingTableSnapshot {
    /// Builds a snapshot from already decoded entries.
    #[must_use]
    pub const fn new(entries: Vec<RoutingEntry>, current_size: usize, max_size: usize) -> Self {
        Self {
            entries,
            current_size,
            max_size,
            decode_error: None,
        }
    }

    /// Decodes raw table bytes reported by the controller.
    ///
    /// Malformed tails are dropped; the violation stays available through
    /// [`Self::decode_error`] for diagnostics.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], max_size: usize) -> Self {
        let decoded = codec::decode(bytes);
        Self {
            entries: decoded.entries,
            current_size: bytes.len(),
            max_size,
            decode_error: decoded.error,
        }
    }

    /// Entries in programming order.
    #[must_use]
    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    /// Bytes occupied by the table on the controller.
    #[must_use]
    pub const fn current_size(&self) -> usize {
        self.current_size
    }

    /// Capacity of the controller's table.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns `true` when the table exceeds the controller's capacity.
    #[must_use]
    pub const fn is_over_capacity(&self) -> bool {
        self.current_size > self.max_size
    }

    /// Violation that truncated decoding, if any.
    #[must_use]
    pub const fn decode_error(&self) -> Option<&DecodeError> {
        self.decode_error.as_ref()
    }

    /// Finds the entry that routes `value`.
    ///
    /// An exact match anywhere in the table wins. AID queries then fall back
    /// to the first prefix or subset entry, in table order, that covers them.
    #[must_use]
    pub fn find(&self, entry_type: EntryType, value: &[u8]) -> Option<&RoutingEntry> {
        let exact = self
            .entries
            .iter()
            .find(|entry| entry.entry_type() == entry_type && entry.value() == value);
        if exact.is_some() || entry_type != EntryType::Aid {
            return exact;
        }
        self.entries
            .iter()
            .filter(|entry| entry.entry_type() == EntryType::Aid)
            .find(|entry| entry.qualified_match(value))
    }

    /// Classifies where `value` is routed.
    #[must_use]
    pub fn classify_route(&self, entry_type: EntryType, value: &[u8]) -> RouteClass {
        match self.find(entry_type, value) {
            Some(entry) if entry.is_host_routed() => RouteClass::HostRouted {
                power_state: entry.power_state(),
            },
            Some(entry) => RouteClass::OffHostRouted {
                nfcee_id: entry.nfcee_id(),
                power_state: entry.power_state(),
            },
            None => RouteClass::NotFound,
        }
    }
}

impl fmt::Display for RoutingTableSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RoutingTableSize: {}/{}", self.current_size, self.max_size)?;
        writeln!(
            f,
            "{:<24}| {:<9}| {:<12}| {:<11}| Extra Info",
            "Entry", "NFCEE_ID", "Power State", "Block Ctrl"
        )?;
        for entry in &self.entries {
            writeln!(
                f,
                "{:<24}| {:<9}| {:<12}| {:<11}| {}",
                entry_label(entry),
                format!("{:#04x}", entry.nfcee_id()),
                format!("{:#04x}", entry.power_state()),
                entry.blocking(),
                entry.qualifier().label()
            )?;
        }
        if let Some(error) = &self.decode_error {
            writeln!(f, "Decoding stopped: {error}")?;
        }
        Ok(())
    }
}

fn entry_label(entry: &RoutingEntry) -> String {
    match entry.entry_type() {
        EntryType::Technology => format!("Technology {}", technology_name(entry.value())),
        EntryType::Protocol => format!("Protocol {}", protocol_name(entry.value())),
        EntryType::Aid if entry.value().is_empty() => "AID Empty_AID".to_owned(),
        EntryType::Aid => format!("AID {}", hex(entry.value())),
        EntryType::SystemCode => format!("SystemCode {}", hex(entry.value())),
    }
}

fn technology_name(value: &[u8]) -> String {
    let name = match value {
        [0x00] => "A",
        [0x01] => "B",
        [0x02] => "F",
        [0x03] => "V",
        _ => return format!("0x{}", hex(value)),
    };
    name.to_owned()
}

fn protocol_name(value: &[u8]) -> String {
    let name = match value {
        [0x00] => "UNDETERMINED",
        [0x01] => "T1T",
        [0x02] => "T2T",
        [0x03] => "T3T",
        [0x04] => "ISO_DEP",
        [0x05] => "NFC_DEP",
        [0x06] => "T5T",
        [0x07] => "NDEF",
        _ => return format!("0x{}", hex(value)),
    };
    name.to_owned()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}
