//! Routing entry model shared by the codec, lookup, and policy layers.
//!
//! A [`RoutingEntry`] describes one row of the controller's listen-mode
//! routing table: which class of traffic it matches, how the match is
//! qualified, and which execution environment receives the traffic in which
//! power states. Constructors validate the value shape so every entry that
//! exists in memory satisfies the length rules of its type.

use std::fmt;

use thiserror::Error;

/// Maximum length of an AID value carried by a routing entry.
pub const MAX_AID_LEN: usize = 16;

/// Length of a system-code value.
pub const SYSTEM_CODE_LEN: usize = 2;

/// NFCEE identifier of the device host.
pub const HOST_NFCEE_ID: u8 = 0x00;

pub(crate) const TYPE_MASK: u8 = 0x0F;
pub(crate) const QUALIFIER_PREFIX: u8 = 0x10;
pub(crate) const QUALIFIER_SUBSET: u8 = 0x20;
pub(crate) const QUALIFIER_BLOCKING: u8 = 0x40;

/// Class of traffic matched by a routing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// RF technology (A, B, F, V).
    Technology,
    /// RF protocol (ISO-DEP, T3T, ...).
    Protocol,
    /// Application identifier selected by the reader.
    Aid,
    /// `FeliCa` system code.
    SystemCode,
}

impl EntryType {
    /// Decodes the low nibble of an entry header.
    #[must_use]
    pub const fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x00 => Some(Self::Technology),
            0x01 => Some(Self::Protocol),
            0x02 => Some(Self::Aid),
            0x03 => Some(Self::SystemCode),
            _ => None,
        }
    }

    /// Returns the header nibble for this type.
    #[must_use]
    pub const fn nibble(self) -> u8 {
        match self {
            Self::Technology => 0x00,
            Self::Protocol => 0x01,
            Self::Aid => 0x02,
            Self::SystemCode => 0x03,
        }
    }

    /// Returns `true` when `len` is an acceptable value length for this type.
    #[must_use]
    pub const fn accepts_len(self, len: usize) -> bool {
        match self {
            Self::Technology | Self::Protocol => len == 1,
            Self::Aid => len <= MAX_AID_LEN,
            Self::SystemCode => len == SYSTEM_CODE_LEN,
        }
    }

    /// Stable lowercase label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Technology => "technology",
            Self::Protocol => "protocol",
            Self::Aid => "aid",
            Self::SystemCode => "system_code",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stored value is compared against incoming traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchQualifier {
    /// The value must match exactly.
    #[default]
    Exact,
    /// The stored value matches any longer value that starts with it.
    Prefix,
    /// The stored value matches any shorter value it starts with.
    Subset,
    /// Both prefix and subset matching apply.
    PrefixOrSubset,
}

impl MatchQualifier {
    /// Returns the diagnostic label for the qualifier.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Exact => "Exact",
            Self::Prefix => "Prefix",
            Self::Subset => "Subset",
            Self::PrefixOrSubset => "Prefix Subset",
        }
    }

    pub(crate) const fn header_bits(self) -> u8 {
        match self {
            Self::Exact => 0,
            Self::Prefix => QUALIFIER_PREFIX,
            Self::Subset => QUALIFIER_SUBSET,
            Self::PrefixOrSubset => QUALIFIER_PREFIX | QUALIFIER_SUBSET,
        }
    }
}

/// Errors raised when building a routing entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    /// The value length does not fit the entry type.
    #[error("{entry_type} value of {len} bytes is not a valid routing value")]
    InvalidLength {
        /// Type of the rejected entry.
        entry_type: EntryType,
        /// Length of the rejected value.
        len: usize,
    },
}

/// One row of the listen-mode routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    entry_type: EntryType,
    qualifier: MatchQualifier,
    blocking: bool,
    nfcee_id: u8,
    power_state: u8,
    value: Vec<u8>,
}

impl RoutingEntry {
    /// Builds an exact-match entry after validating the value shape.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::InvalidLength`] when `value` does not fit
    /// `entry_type`.
    pub fn new(
        entry_type: EntryType,
        value: impl Into<Vec<u8>>,
        nfcee_id: u8,
        power_state: u8,
    ) -> Result<Self, EntryError> {
        let bytes = value.into();
        if !entry_type.accepts_len(bytes.len()) {
            return Err(EntryError::InvalidLength {
                entry_type,
                len: bytes.len(),
            });
        }
        Ok(Self::raw(entry_type, bytes, nfcee_id, power_state))
    }

    /// Builds a technology entry.
    #[must_use]
    pub fn technology(technology: u8, nfcee_id: u8, power_state: u8) -> Self {
        Self::single_byte(EntryType::Technology, technology, nfcee_id, power_state)
    }

    /// Builds a protocol entry.
    #[must_use]
    pub fn protocol(protocol: u8, nfcee_id: u8, power_state: u8) -> Self {
        Self::single_byte(EntryType::Protocol, protocol, nfcee_id, power_state)
    }

    /// Builds a system-code entry.
    #[must_use]
    pub fn system_code(code: [u8; SYSTEM_CODE_LEN], nfcee_id: u8, power_state: u8) -> Self {
        Self::raw(EntryType::SystemCode, code.to_vec(), nfcee_id, power_state)
    }

    pub(crate) fn raw(entry_type: EntryType, value: Vec<u8>, nfcee_id: u8, power_state: u8) -> Self {
        Self {
            entry_type,
            qualifier: MatchQualifier::Exact,
            blocking: false,
            nfcee_id,
            power_state,
            value,
        }
    }

    fn single_byte(entry_type: EntryType, value: u8, nfcee_id: u8, power_state: u8) -> Self {
        Self::raw(entry_type, vec![value], nfcee_id, power_state)
    }

    /// Returns the entry with the given match qualifier.
    #[must_use]
    pub fn with_qualifier(mut self, qualifier: MatchQualifier) -> Self {
        self.qualifier = qualifier;
        self
    }

    /// Returns the entry with blocking control set as requested.
    #[must_use]
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Traffic class matched by the entry.
    #[must_use]
    pub const fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Match qualifier applied to the value.
    #[must_use]
    pub const fn qualifier(&self) -> MatchQualifier {
        self.qualifier
    }

    /// Whether traffic is blocked when the target cannot service it.
    #[must_use]
    pub const fn blocking(&self) -> bool {
        self.blocking
    }

    /// Target execution environment.
    #[must_use]
    pub const fn nfcee_id(&self) -> u8 {
        self.nfcee_id
    }

    /// Power states in which the route is active.
    #[must_use]
    pub const fn power_state(&self) -> u8 {
        self.power_state
    }

    /// Matched value bytes.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Returns `true` when the entry routes to the device host.
    #[must_use]
    pub const fn is_host_routed(&self) -> bool {
        self.nfcee_id == HOST_NFCEE_ID
    }

    /// Checks whether a non-exact qualifier lets this AID entry match `query`.
    pub(crate) fn qualified_match(&self, query: &[u8]) -> bool {
        let prefix = || query.len() > self.value.len() && query.starts_with(&self.value);
        let subset = || query.len() < self.value.len() && self.value.starts_with(query);
        match self.qualifier {
            MatchQualifier::Exact => false,
            MatchQualifier::Prefix => prefix(),
            MatchQualifier::Subset => subset(),
            MatchQualifier::PrefixOrSubset => prefix() || subset(),
        }
    }

    pub(crate) fn header_byte(&self) -> u8 {
        let blocking = if self.blocking { QUALIFIER_BLOCKING } else { 0 };
        self.entry_type.nibble() | self.qualifier.header_bits() | blocking
    }
}
