//! Power-state bitmasks and persisted power-route packing.
//!
//! A power-route preference names the execution environment that receives a
//! traffic category and the controller power states in which the route is
//! live. It is persisted as a packed integer: the power-state byte in bits
//! 0-7, the environment id from [`ROUTE_LOC_SHIFT`], and for contactless
//! technology routes the technology mask from [`TECH_SHIFT`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Route active while the controller is switched on.
pub const POWER_SWITCHED_ON: u8 = 0x01;
/// Route active in low power (screen off, device on).
pub const POWER_SWITCHED_OFF: u8 = 0x02;
/// Route active with the battery depleted.
pub const POWER_BATTERY_OFF: u8 = 0x04;
/// Route active while the screen is on and locked.
pub const POWER_SCREEN_ON_LOCKED: u8 = 0x08;
/// Route active while the screen is off.
pub const POWER_SCREEN_OFF: u8 = 0x10;
/// Route active while the screen is off and locked.
pub const POWER_SCREEN_OFF_LOCKED: u8 = 0x20;

/// Power states the device host cannot service.
pub const HOST_FORBIDDEN_POWER: u8 = POWER_SWITCHED_OFF | POWER_BATTERY_OFF | POWER_SCREEN_OFF;

/// Bit position of the execution environment id in a packed route.
pub const ROUTE_LOC_SHIFT: u16 = 8;
/// Bit position of the technology mask in a packed contactless route.
pub const TECH_SHIFT: u16 = 11;

const ROUTE_LOC_MASK: u16 = 0x03;
const POWER_MASK: u16 = 0xFF;
const NCI_1_ALLOWED_POWER: u8 = 0x1F;
const NCI_2_ALLOWED_POWER: u8 = 0x3F;

/// Execution environment that can service routed traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEnvironment {
    /// The device host processor.
    #[default]
    Host,
    /// Embedded secure element.
    SecureElement,
    /// First UICC slot.
    Uicc,
    /// Second UICC slot.
    Uicc2,
}

impl ExecutionEnvironment {
    /// Every environment in id order.
    pub const ALL: [Self; 4] = [Self::Host, Self::SecureElement, Self::Uicc, Self::Uicc2];

    /// Routing-table identifier for the environment.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Host => 0,
            Self::SecureElement => 1,
            Self::Uicc => 2,
            Self::Uicc2 => 3,
        }
    }

    /// Resolves a routing-table identifier.
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Host),
            1 => Some(Self::SecureElement),
            2 => Some(Self::Uicc),
            3 => Some(Self::Uicc2),
            _ => None,
        }
    }

    /// Returns `true` for the device host.
    #[must_use]
    pub const fn is_host(self) -> bool {
        matches!(self, Self::Host)
    }
}

impl fmt::Display for ExecutionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Host => "host",
            Self::SecureElement => "ese",
            Self::Uicc => "uicc",
            Self::Uicc2 => "uicc2",
        };
        f.write_str(label)
    }
}

/// Negotiated NCI protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NciVersion {
    /// NCI 1.x.
    #[default]
    V1,
    /// NCI 2.x.
    V2,
}

impl NciVersion {
    /// Maps the version byte reported by the controller.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        if raw >= 0x20 { Self::V2 } else { Self::V1 }
    }

    /// Power-state bits the controller accepts under this version.
    #[must_use]
    pub const fn allowed_power_mask(self) -> u8 {
        match self {
            Self::V1 => NCI_1_ALLOWED_POWER,
            Self::V2 => NCI_2_ALLOWED_POWER,
        }
    }
}

/// User-facing power flags for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerFlags {
    /// Route while the device is fully powered.
    pub full_power: bool,
    /// Route while the device is in low power.
    pub low_power: bool,
    /// Route while the device has no power.
    pub no_power: bool,
}

impl PowerFlags {
    /// Flags with every power state enabled.
    pub const ALL: Self = Self {
        full_power: true,
        low_power: true,
        no_power: true,
    };
}

/// Target environment and power mask for one routed category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerRouteConfig {
    target: ExecutionEnvironment,
    power_state: u8,
}

impl PowerRouteConfig {
    /// Builds a configuration from raw parts.
    #[must_use]
    pub const fn new(target: ExecutionEnvironment, power_state: u8) -> Self {
        Self {
            target,
            power_state,
        }
    }

    /// Builds a configuration from user flags.
    ///
    /// Full power takes the hardware's default full-power states on top of
    /// the switched-on bit; low and no power map to their single bits.
    #[must_use]
    pub const fn from_flags(
        target: ExecutionEnvironment,
        flags: PowerFlags,
        hardware_full_power: u8,
    ) -> Self {
        let mut power_state = 0;
        if flags.full_power {
            power_state |= (hardware_full_power & NCI_1_ALLOWED_POWER) | POWER_SWITCHED_ON;
        }
        if flags.low_power {
            power_state |= POWER_SWITCHED_OFF;
        }
        if flags.no_power {
            power_state |= POWER_BATTERY_OFF;
        }
        Self::new(target, power_state)
    }

    /// Target environment.
    #[must_use]
    pub const fn target(self) -> ExecutionEnvironment {
        self.target
    }

    /// Power-state bitmask.
    #[must_use]
    pub const fn power_state(self) -> u8 {
        self.power_state
    }

    /// Returns the configuration retargeted to `target`.
    #[must_use]
    pub const fn with_target(self, target: ExecutionEnvironment) -> Self {
        Self::new(target, self.power_state)
    }

    /// Applies the version mask and strips states the host cannot service.
    #[must_use]
    pub const fn normalized(self, version: NciVersion) -> Self {
        let mut power_state = self.power_state & version.allowed_power_mask();
        if self.target.is_host() {
            power_state &= !HOST_FORBIDDEN_POWER;
        }
        Self::new(self.target, power_state)
    }

    /// Packs the configuration for persistence.
    #[must_use]
    pub fn pack(self) -> u16 {
        (u16::from(self.target.id()) << ROUTE_LOC_SHIFT) | u16::from(self.power_state)
    }

    /// Packs the configuration together with a technology mask.
    #[must_use]
    pub fn pack_with_technology(self, technology_mask: u8) -> u16 {
        self.pack() | (u16::from(technology_mask) << TECH_SHIFT)
    }

    /// Restores a configuration from its packed form, ignoring technology
    /// bits.
    #[must_use]
    pub fn unpack(packed: u16) -> Option<Self> {
        let route_loc = u8::try_from((packed >> ROUTE_LOC_SHIFT) & ROUTE_LOC_MASK).ok()?;
        let power_state = u8::try_from(packed & POWER_MASK).ok()?;
        ExecutionEnvironment::from_id(route_loc).map(|target| Self::new(target, power_state))
    }
}
