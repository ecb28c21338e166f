//! Screen and lock state reported by the device.

use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Coarse screen state, ordered from least to most interactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ScreenState {
    /// State not yet reported.
    #[default]
    Unknown,
    /// Screen off, device unlocked.
    OffUnlocked,
    /// Screen off, device locked.
    OffLocked,
    /// Screen on behind the lock screen.
    OnLocked,
    /// Screen on and unlocked.
    OnUnlocked,
}

impl ScreenState {
    const ALL: [Self; 5] = [
        Self::Unknown,
        Self::OffUnlocked,
        Self::OffLocked,
        Self::OnLocked,
        Self::OnUnlocked,
    ];

    /// Value passed to the controller.
    #[must_use]
    pub const fn hardware_value(self) -> u32 {
        match self {
            Self::Unknown => 0x00,
            Self::OffUnlocked => 0x01,
            Self::OffLocked => 0x02,
            Self::OnLocked => 0x04,
            Self::OnUnlocked => 0x08,
        }
    }

    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::OffUnlocked => "off_unlocked",
            Self::OffLocked => "off_locked",
            Self::OnLocked => "on_locked",
            Self::OnUnlocked => "on_unlocked",
        }
    }

    const fn index(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::OffUnlocked => 1,
            Self::OffLocked => 2,
            Self::OnLocked => 3,
            Self::OnUnlocked => 4,
        }
    }
}

impl fmt::Display for ScreenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polling overlays OR-ed into the screen value sent to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PollingOverlay(u32);

impl PollingOverlay {
    /// No overlay.
    pub const NONE: Self = Self(0);
    /// Poll for tags while locked.
    pub const TAG: Self = Self(0x10);
    /// Poll for peers while locked.
    pub const PEER: Self = Self(0x20);
    /// Keep reader polling while locked.
    pub const READER: Self = Self(0x40);

    /// Raw overlay bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` when every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PollingOverlay {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Screen state plus overlays, as programmed into the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenStateMask {
    /// Base screen state.
    pub state: ScreenState,
    /// Polling overlays.
    pub overlay: PollingOverlay,
}

impl ScreenStateMask {
    /// Combined value passed to the controller.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.state.hardware_value() | self.overlay.bits()
    }
}

/// Reports the current screen state on demand.
pub trait ScreenStateSource: Send + Sync {
    /// Samples the current screen state.
    fn current(&self) -> ScreenState;
}

/// Screen source backed by a value the embedding service updates.
#[derive(Debug, Default)]
pub struct ScreenStateCell(AtomicU8);

impl ScreenStateCell {
    /// Builds a cell holding `state`.
    #[must_use]
    pub const fn new(state: ScreenState) -> Self {
        Self(AtomicU8::new(state.index()))
    }

    /// Replaces the stored state.
    pub fn set(&self, state: ScreenState) {
        self.0.store(state.index(), Ordering::SeqCst);
    }
}

impl ScreenStateSource for ScreenStateCell {
    fn current(&self) -> ScreenState {
        let index = usize::from(self.0.load(Ordering::SeqCst));
        ScreenState::ALL
            .get(index)
            .copied()
            .unwrap_or(ScreenState::Unknown)
    }
}
