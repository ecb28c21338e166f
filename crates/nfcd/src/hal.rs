//! Boundary to the controller hardware abstraction layer.
//!
//! The controller core talks to the radio exclusively through [`DeviceHost`].
//! Events flowing the other way arrive as [`HalEvent`] values delivered through
//! an [`crate::EventSink`].

use std::fmt;
use std::ops::BitOr;
use std::time::Duration;

use nfc_routing::{EntryType, ExecutionEnvironment, NciVersion, PowerRouteConfig, RouteCategory};

use crate::discovery::DiscoveryParameters;
use crate::screen::ScreenStateMask;

/// Route types removed by [`DeviceHost::clear_routing_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClearFlags(u8);

impl ClearFlags {
    /// Technology routes.
    pub const TECHNOLOGY: Self = Self(0x01);
    /// Protocol routes.
    pub const PROTOCOL: Self = Self(0x02);
    /// AID routes.
    pub const AID: Self = Self(0x04);
    /// System-code routes.
    pub const SYSTEM_CODE: Self = Self(0x08);
    /// Every route type.
    pub const ALL: Self = Self(0x0F);

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` when routes of `entry_type` are cleared.
    #[must_use]
    pub const fn covers(self, entry_type: EntryType) -> bool {
        let bit = match entry_type {
            EntryType::Technology => Self::TECHNOLOGY,
            EntryType::Protocol => Self::PROTOCOL,
            EntryType::Aid => Self::AID,
            EntryType::SystemCode => Self::SYSTEM_CODE,
        };
        self.0 & bit.0 != 0
    }
}

impl BitOr for ClearFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Hardware operations consumed by the controller core.
///
/// Implementations must be callable from any thread. The core serialises
/// programming calls, so an implementation never sees two of them at once.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceHost: Send + Sync {
    /// Powers the controller up and loads its configuration.
    fn initialize(&self) -> bool;

    /// Powers the controller down.
    fn deinitialize(&self) -> bool;

    /// Starts or reconfigures discovery.
    fn enable_discovery(&self, params: &DiscoveryParameters, restart: bool);

    /// Stops discovery.
    fn disable_discovery(&self);

    /// Stages one routing request for the next commit.
    fn set_routing_entry(
        &self,
        entry_type: EntryType,
        value: u8,
        target: ExecutionEnvironment,
        power_state: u8,
    ) -> bool;

    /// Removes staged routes of the flagged types.
    fn clear_routing_entry(&self, flags: ClearFlags) -> bool;

    /// Commits staged routes into the controller's listen-mode table.
    fn commit_routing(&self) -> bool;

    /// Reads back the committed routing table in TLV form.
    fn routing_table(&self) -> Vec<u8>;

    /// Capacity of the listen-mode routing table in bytes.
    fn max_routing_table_size(&self) -> usize;

    /// Hardware default route and power state for `category`.
    fn default_route(&self, category: RouteCategory) -> PowerRouteConfig;

    /// Informs the controller of the screen state.
    fn set_screen_state(&self, mask: ScreenStateMask);

    /// Verifies, and if needed downloads, controller firmware.
    fn check_firmware(&self) -> bool;

    /// Forcefully terminates the hardware session.
    fn abort(&self, reason: &str);

    /// Negotiated NCI protocol version.
    fn nci_version(&self) -> NciVersion;

    /// Time the controller reports it may need to initialise.
    fn init_timeout(&self) -> Duration;

    /// Restores controller configuration to factory defaults.
    fn factory_reset(&self);

    /// Execution environments attached to the controller.
    fn secure_elements(&self) -> Vec<ExecutionEnvironment>;

    /// Activates routing towards `environment`.
    fn select_secure_element(&self, environment: ExecutionEnvironment) -> bool;

    /// Deactivates routing towards `environment`.
    fn deselect_secure_element(&self, environment: ExecutionEnvironment) -> bool;

    /// Drops any live connection to a remote tag or peer.
    fn disconnect_remote_endpoint(&self);
}

/// Events raised by the hardware layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalEvent {
    /// A remote tag entered the field.
    TagDiscovered {
        /// Controller-assigned endpoint handle.
        handle: u32,
    },
    /// The remote tag left the field.
    TagLost {
        /// Controller-assigned endpoint handle.
        handle: u32,
    },
    /// The controller could not fit the programmed routes.
    RoutingTableFull,
}

/// Hardware call named in failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareCall {
    /// [`DeviceHost::initialize`].
    Initialize,
    /// [`DeviceHost::deinitialize`].
    Deinitialize,
    /// [`DeviceHost::set_routing_entry`].
    SetRoutingEntry,
    /// [`DeviceHost::clear_routing_entry`].
    ClearRoutingEntry,
    /// [`DeviceHost::commit_routing`].
    CommitRouting,
    /// [`DeviceHost::select_secure_element`].
    SelectSecureElement,
    /// [`DeviceHost::deselect_secure_element`].
    DeselectSecureElement,
}

impl HardwareCall {
    /// Stable label used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Deinitialize => "deinitialize",
            Self::SetRoutingEntry => "set_routing_entry",
            Self::ClearRoutingEntry => "clear_routing_entry",
            Self::CommitRouting => "commit_routing",
            Self::SelectSecureElement => "select_secure_element",
            Self::DeselectSecureElement => "deselect_secure_element",
        }
    }
}

impl fmt::Display for HardwareCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
