//! Listen-mode routing for the NFC control plane.
//!
//! The controller decides which execution environment (the host or an
//! attached secure element) receives incoming contactless traffic by
//! consulting a routing table. This crate owns everything about that table
//! that does not need hardware access:
//!
//! - [`codec`] encodes and decodes the binary TLV layout.
//! - [`RoutingTableSnapshot`] holds a decoded table, answers route lookups,
//!   and renders the diagnostic dump.
//! - [`power`] packs power-state masks and persisted route preferences.
//! - [`RoutingPolicy`] turns stored preferences and hardware defaults into
//!   the requests that program the table.
//!
//! The daemon in `nfcd` drives these pieces from its routing worker.

pub mod codec;
mod entry;
pub mod policy;
pub mod power;
mod snapshot;

#[cfg(test)]
mod tests;

pub use self::codec::{DecodeError, Decoded, decode, encode};
pub use self::entry::{
    EntryError, EntryType, HOST_NFCEE_ID, MAX_AID_LEN, MatchQualifier, RoutingEntry,
    SYSTEM_CODE_LEN,
};
pub use self::policy::{CategoryRoutes, RouteCategory, RouteRequest, RoutingPlan, RoutingPolicy};
pub use self::power::{ExecutionEnvironment, NciVersion, PowerFlags, PowerRouteConfig};
pub use self::snapshot::{RouteClass, RoutingTableSnapshot};
