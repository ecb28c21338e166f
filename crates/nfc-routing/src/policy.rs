//! Routing policy: from persisted preferences to programming requests.
//!
//! Four traffic categories are routed explicitly. Each resolves to a
//! [`PowerRouteConfig`] taken from the stored preference or, failing that,
//! from the hardware defaults, and is normalised for the negotiated NCI
//! version. The resolved routes become [`RouteRequest`]s in the shape the
//! hardware boundary accepts, and expand into codec entries for
//! verification.

use std::fmt;

use tracing::debug;

use crate::codec;
use crate::entry::{EntryType, RoutingEntry};
use crate::power::{ExecutionEnvironment, NciVersion, PowerRouteConfig};

pub(crate) const POLICY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::policy");

/// Technology mask bit for NFC-A.
pub const TECH_MASK_A: u8 = 0x01;
/// Technology mask bit for NFC-B.
pub const TECH_MASK_B: u8 = 0x02;
/// Technology mask bit for NFC-F.
pub const TECH_MASK_F: u8 = 0x04;
/// Technology mask bit for NFC-V.
pub const TECH_MASK_V: u8 = 0x08;
/// Protocol mask bit for ISO-DEP.
pub const PROTOCOL_MASK_ISO_DEP: u8 = 0x08;

const TECHNOLOGY_BITS: [(u8, u8); 4] = [
    (TECH_MASK_A, 0x00),
    (TECH_MASK_B, 0x01),
    (TECH_MASK_F, 0x02),
    (TECH_MASK_V, 0x03),
];

const PROTOCOL_BITS: [(u8, u8); 6] = [
    (0x01, 0x01),
    (0x02, 0x02),
    (0x04, 0x03),
    (PROTOCOL_MASK_ISO_DEP, 0x04),
    (0x10, 0x05),
    (0x20, 0x06),
];

/// Traffic categories with a dedicated route preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteCategory {
    /// Default route for AIDs no other entry claims.
    DefaultAid,
    /// ISO-DEP traffic from Mifare Desfire readers.
    MifareDesfire,
    /// Contactless NFC-A traffic (Mifare Classic).
    MifareClt,
    /// Contactless NFC-F traffic (`FeliCa`).
    FelicaClt,
}

impl RouteCategory {
    /// Every category in programming order.
    pub const ALL: [Self; 4] = [
        Self::DefaultAid,
        Self::MifareDesfire,
        Self::MifareClt,
        Self::FelicaClt,
    ];

    /// Key under which the category's route is persisted.
    #[must_use]
    pub const fn preference_key(self) -> &'static str {
        match self {
            Self::DefaultAid => "default_route_id",
            Self::MifareDesfire => "mifare_desfire_proto_route",
            Self::MifareClt => "mifare_clt_route",
            Self::FelicaClt => "felica_clt_route",
        }
    }

    /// Technology mask carried by contactless categories.
    #[must_use]
    pub const fn technology_mask(self) -> Option<u8> {
        match self {
            Self::MifareClt => Some(TECH_MASK_A),
            Self::FelicaClt => Some(TECH_MASK_F),
            Self::DefaultAid | Self::MifareDesfire => None,
        }
    }

    /// Packs a route for persistence under this category.
    #[must_use]
    pub fn pack(self, route: PowerRouteConfig) -> u16 {
        match self.technology_mask() {
            Some(mask) => route.pack_with_technology(mask),
            None => route.pack(),
        }
    }
}

impl fmt::Display for RouteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.preference_key())
    }
}

/// One value per routed category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategoryRoutes<T> {
    /// Default AID route.
    pub default_aid: T,
    /// Mifare Desfire protocol route.
    pub mifare_desfire: T,
    /// Mifare contactless technology route.
    pub mifare_clt: T,
    /// `FeliCa` contactless technology route.
    pub felica_clt: T,
}

impl<T> CategoryRoutes<T> {
    /// Builds the table by evaluating `f` for every category.
    pub fn from_fn(mut f: impl FnMut(RouteCategory) -> T) -> Self {
        Self {
            default_aid: f(RouteCategory::DefaultAid),
            mifare_desfire: f(RouteCategory::MifareDesfire),
            mifare_clt: f(RouteCategory::MifareClt),
            felica_clt: f(RouteCategory::FelicaClt),
        }
    }

    /// Returns the value for `category`.
    #[must_use]
    pub const fn get(&self, category: RouteCategory) -> &T {
        match category {
            RouteCategory::DefaultAid => &self.default_aid,
            RouteCategory::MifareDesfire => &self.mifare_desfire,
            RouteCategory::MifareClt => &self.mifare_clt,
            RouteCategory::FelicaClt => &self.felica_clt,
        }
    }

    /// Replaces the value for `category`.
    pub fn set(&mut self, category: RouteCategory, value: T) {
        let slot = match category {
            RouteCategory::DefaultAid => &mut self.default_aid,
            RouteCategory::MifareDesfire => &mut self.mifare_desfire,
            RouteCategory::MifareClt => &mut self.mifare_clt,
            RouteCategory::FelicaClt => &mut self.felica_clt,
        };
        *slot = value;
    }
}

/// A single `set routing entry` call for the hardware boundary.
///
/// Technology and protocol requests carry masks; AID requests carry no value
/// and program the default (empty) AID route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRequest {
    /// Entry type being routed.
    pub entry_type: EntryType,
    /// Technology or protocol mask; zero for the default AID route.
    pub value: u8,
    /// Target environment and power states.
    pub route: PowerRouteConfig,
}

impl RouteRequest {
    /// Expands the request into the table entries it produces.
    #[must_use]
    pub fn entries(&self) -> Vec<RoutingEntry> {
        let nfcee_id = self.route.target().id();
        let power = self.route.power_state();
        match self.entry_type {
            EntryType::Technology => expand_mask(self.value, &TECHNOLOGY_BITS)
                .map(|tech| RoutingEntry::technology(tech, nfcee_id, power))
                .collect(),
            EntryType::Protocol => expand_mask(self.value, &PROTOCOL_BITS)
                .map(|protocol| RoutingEntry::protocol(protocol, nfcee_id, power))
                .collect(),
            EntryType::Aid => RoutingEntry::new(EntryType::Aid, Vec::new(), nfcee_id, power)
                .map(|entry| vec![entry])
                .unwrap_or_default(),
            EntryType::SystemCode => Vec::new(),
        }
    }
}

fn expand_mask(mask: u8, table: &'static [(u8, u8)]) -> impl Iterator<Item = u8> {
    table
        .iter()
        .filter(move |(bit, _)| mask & bit != 0)
        .map(|(_, value)| *value)
}

/// Routes resolved for every category plus the requests that program them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPlan {
    routes: CategoryRoutes<PowerRouteConfig>,
    requests: Vec<RouteRequest>,
}

impl RoutingPlan {
    /// Resolved route for `category`.
    #[must_use]
    pub const fn route(&self, category: RouteCategory) -> PowerRouteConfig {
        *self.routes.get(category)
    }

    /// Resolved routes for every category.
    #[must_use]
    pub const fn routes(&self) -> &CategoryRoutes<PowerRouteConfig> {
        &self.routes
    }

    /// Programming requests in the order they are issued.
    #[must_use]
    pub fn requests(&self) -> &[RouteRequest] {
        &self.requests
    }

    /// Table entries the requests produce, in programming order.
    #[must_use]
    pub fn entries(&self) -> Vec<RoutingEntry> {
        self.requests.iter().flat_map(RouteRequest::entries).collect()
    }

    /// Encoded table bytes the requests produce.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(&self.entries())
    }
}

/// Resolves category routes against hardware defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPolicy {
    version: NciVersion,
    defaults: CategoryRoutes<PowerRouteConfig>,
}

impl RoutingPolicy {
    /// Builds a policy for the negotiated version and hardware defaults.
    #[must_use]
    pub const fn new(version: NciVersion, defaults: CategoryRoutes<PowerRouteConfig>) -> Self {
        Self { version, defaults }
    }

    /// Negotiated NCI version.
    #[must_use]
    pub const fn version(&self) -> NciVersion {
        self.version
    }

    /// Resolves one category from its stored preference.
    #[must_use]
    pub fn resolve(
        &self,
        category: RouteCategory,
        stored: Option<PowerRouteConfig>,
    ) -> PowerRouteConfig {
        stored
            .unwrap_or(*self.defaults.get(category))
            .normalized(self.version)
    }

    /// Computes the full routing plan.
    ///
    /// `overflow` retargets the default AID route while the controller's AID
    /// table is full.
    #[must_use]
    pub fn compute(
        &self,
        stored: &CategoryRoutes<Option<PowerRouteConfig>>,
        overflow: Option<ExecutionEnvironment>,
    ) -> RoutingPlan {
        let mut routes = CategoryRoutes::from_fn(|category| self.resolve(category, *stored.get(category)));
        if let Some(target) = overflow {
            routes.default_aid = routes.default_aid.with_target(target).normalized(self.version);
        }

        let mut requests = Vec::with_capacity(RouteCategory::ALL.len());
        if routes.mifare_clt == routes.felica_clt {
            requests.push(RouteRequest {
                entry_type: EntryType::Technology,
                value: TECH_MASK_A | TECH_MASK_F,
                route: routes.mifare_clt,
            });
        } else {
            requests.push(RouteRequest {
                entry_type: EntryType::Technology,
                value: TECH_MASK_A,
                route: routes.mifare_clt,
            });
            requests.push(RouteRequest {
                entry_type: EntryType::Technology,
                value: TECH_MASK_F,
                route: routes.felica_clt,
            });
        }
        requests.push(RouteRequest {
            entry_type: EntryType::Protocol,
            value: PROTOCOL_MASK_ISO_DEP,
            route: routes.mifare_desfire,
        });
        requests.push(RouteRequest {
            entry_type: EntryType::Aid,
            value: 0,
            route: routes.default_aid,
        });

        debug!(
            target: POLICY_TARGET,
            default_route = %routes.default_aid.target(),
            overflow = overflow.is_some(),
            requests = requests.len(),
            "routing plan computed"
        );
        RoutingPlan { routes, requests }
    }
}
