//! Discovery configuration derived from the current device context.
//!
//! [`compute`] is a pure function: the same [`DiscoveryContext`] always yields
//! the same [`DiscoveryParameters`]. The controller applies the result through
//! the device host and skips reprogramming when nothing changed.

use std::fmt;
use std::ops::BitOr;

use crate::screen::ScreenState;

/// Lowest screen state at which normal polling runs.
pub const POLLING_THRESHOLD: ScreenState = ScreenState::OnUnlocked;

/// Set of RF technologies the controller polls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TechMask(u32);

impl TechMask {
    /// No technologies.
    pub const NONE: Self = Self(0);
    /// NFC-A.
    pub const A: Self = Self(0x01);
    /// NFC-B.
    pub const B: Self = Self(0x02);
    /// NFC-F.
    pub const F: Self = Self(0x04);
    /// NFC-V (ISO 15693).
    pub const V: Self = Self(0x08);
    /// Kovio barcode.
    pub const KOVIO: Self = Self(0x20);
    /// Every technology the controller supports.
    pub const DEFAULT: Self = Self(u32::MAX);

    /// Builds a mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw mask bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` when no technology is selected.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` when every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TechMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for TechMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Discovery configuration handed to the device host.
///
/// Peer-to-peer listening is always off; nothing in the parameters can turn
/// it on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryParameters {
    tech_mask: TechMask,
    low_power_discovery: bool,
    reader_mode: bool,
    host_routing: bool,
}

impl Default for DiscoveryParameters {
    fn default() -> Self {
        Self {
            tech_mask: TechMask::NONE,
            low_power_discovery: true,
            reader_mode: false,
            host_routing: false,
        }
    }
}

impl DiscoveryParameters {
    /// Technologies to poll for.
    #[must_use]
    pub const fn tech_mask(&self) -> TechMask {
        self.tech_mask
    }

    /// Whether low-power polling may be used.
    #[must_use]
    pub const fn low_power_discovery(&self) -> bool {
        self.low_power_discovery
    }

    /// Whether an application has claimed reader mode.
    #[must_use]
    pub const fn reader_mode(&self) -> bool {
        self.reader_mode
    }

    /// Whether listen-mode traffic is routed to the host.
    #[must_use]
    pub const fn host_routing(&self) -> bool {
        self.host_routing
    }

    /// Discovery must run when polling anything or when routing to the host.
    #[must_use]
    pub const fn should_enable_discovery(&self) -> bool {
        !self.tech_mask.is_empty() || self.host_routing
    }

    const fn with_tech_mask(mut self, mask: TechMask) -> Self {
        self.tech_mask = mask;
        self
    }

    const fn with_reader_mode(mut self) -> Self {
        self.reader_mode = true;
        self.low_power_discovery = false;
        self
    }

    const fn with_host_routing(mut self) -> Self {
        self.host_routing = true;
        self
    }
}

impl fmt::Display for DiscoveryParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tech_mask={} low_power={} reader_mode={} host_routing={}",
            self.tech_mask, self.low_power_discovery, self.reader_mode, self.host_routing
        )
    }
}

/// An application's request to take the controller into reader mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderModeRequest {
    /// Technologies to poll while reader mode is active.
    pub technologies: TechMask,
    /// Interval between presence checks, in milliseconds.
    pub presence_check_delay_ms: u32,
    /// Identifier of the requesting application.
    pub requester: String,
    /// Disables polling entirely while keeping listen mode available.
    pub disable_polling: bool,
}

impl ReaderModeRequest {
    /// Builds a polling request for `technologies`.
    #[must_use]
    pub fn new(requester: impl Into<String>, technologies: TechMask) -> Self {
        Self {
            technologies,
            presence_check_delay_ms: 125,
            requester: requester.into(),
            disable_polling: false,
        }
    }

    /// Marks the request as suspending polling.
    #[must_use]
    pub const fn with_polling_disabled(mut self) -> Self {
        self.disable_polling = true;
        self
    }

    /// Technologies the request actually polls for.
    #[must_use]
    pub const fn effective_technologies(&self) -> TechMask {
        if self.disable_polling {
            TechMask::NONE
        } else {
            self.technologies
        }
    }
}

/// Inputs that determine discovery parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryContext {
    /// Current screen state.
    pub screen: ScreenState,
    /// Active reader-mode request, if any.
    pub reader_mode: Option<ReaderModeRequest>,
    /// Whether device provisioning is in progress.
    pub provisioning: bool,
    /// Technologies registered for lock-screen unlock, if a handler exists.
    pub lockscreen_unlock: Option<TechMask>,
    /// Whether the reader option is enabled on the device.
    pub reader_option: bool,
    /// Whether secure mode is enabled.
    pub secure_mode: bool,
    /// Whether host card emulation is available.
    pub host_card_emulation: bool,
}

/// Chooses discovery parameters for `context`.
///
/// The first matching rule wins:
///
/// 1. screen at or above [`POLLING_THRESHOLD`] with the reader option on: an
///    active reader-mode request polls its own technologies, otherwise every
///    technology is polled;
/// 2. screen on and locked during provisioning: every technology is polled;
/// 3. screen on and locked with unlock technologies registered, the reader
///    option on, and secure mode off: the unlock technologies are polled;
/// 4. otherwise nothing is polled.
///
/// Finally, when no reader mode is active and host card emulation is
/// available, listen-mode traffic is routed to the host.
#[must_use]
pub fn compute(context: &DiscoveryContext) -> DiscoveryParameters {
    let mut params = DiscoveryParameters::default();

    if context.screen >= POLLING_THRESHOLD && context.reader_option {
        params = match &context.reader_mode {
            Some(request) => {
                let technologies = request.effective_technologies();
                let reader = params.with_tech_mask(technologies).with_reader_mode();
                if technologies.is_empty() {
                    reader.with_host_routing()
                } else {
                    reader
                }
            }
            None => params.with_tech_mask(TechMask::DEFAULT),
        };
    } else if context.screen == ScreenState::OnLocked && context.provisioning {
        params = params.with_tech_mask(TechMask::DEFAULT);
    } else if let Some(mask) = unlock_technologies(context) {
        params = params.with_tech_mask(mask);
    }

    if !params.reader_mode() && context.host_card_emulation {
        params = params.with_host_routing();
    }
    params
}

fn unlock_technologies(context: &DiscoveryContext) -> Option<TechMask> {
    if context.screen != ScreenState::OnLocked || context.secure_mode || !context.reader_option {
        return None;
    }
    context.lockscreen_unlock.filter(|mask| !mask.is_empty())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn context(screen: ScreenState) -> DiscoveryContext {
        DiscoveryContext {
            screen,
            reader_option: true,
            host_card_emulation: true,
            ..DiscoveryContext::default()
        }
    }

    #[rstest]
    fn unlocked_screen_polls_everything_and_routes_to_host() {
        let params = compute(&context(ScreenState::OnUnlocked));
        assert_eq!(params.tech_mask(), TechMask::DEFAULT);
        assert!(params.host_routing());
        assert!(params.low_power_discovery());
        assert!(!params.reader_mode());
    }

    #[rstest]
    fn reader_mode_polls_requested_technologies_only() {
        let mut ctx = context(ScreenState::OnUnlocked);
        ctx.reader_mode = Some(ReaderModeRequest::new("reader", TechMask::A | TechMask::B));

        let params = compute(&ctx);

        assert_eq!(params.tech_mask(), TechMask::A | TechMask::B);
        assert!(params.reader_mode());
        assert!(!params.low_power_discovery());
        assert!(!params.host_routing());
    }

    #[rstest]
    fn reader_mode_without_polling_routes_to_host_only() {
        let mut ctx = context(ScreenState::OnUnlocked);
        ctx.reader_mode =
            Some(ReaderModeRequest::new("wallet", TechMask::A).with_polling_disabled());

        let params = compute(&ctx);

        assert!(params.tech_mask().is_empty());
        assert!(params.reader_mode());
        assert!(params.host_routing());
        assert!(params.should_enable_discovery());
    }

    #[rstest]
    fn provisioning_on_lock_screen_polls_everything() {
        let mut ctx = context(ScreenState::OnLocked);
        ctx.provisioning = true;
        assert_eq!(compute(&ctx).tech_mask(), TechMask::DEFAULT);
    }

    #[rstest]
    #[case(false, TechMask::A)]
    #[case(true, TechMask::NONE)]
    fn secure_mode_suppresses_unlock_polling(#[case] secure: bool, #[case] expected: TechMask) {
        let mut ctx = context(ScreenState::OnLocked);
        ctx.lockscreen_unlock = Some(TechMask::A);
        ctx.secure_mode = secure;
        assert_eq!(compute(&ctx).tech_mask(), expected);
    }

    #[rstest]
    #[case(ScreenState::OnUnlocked)]
    #[case(ScreenState::OnLocked)]
    fn polling_requires_reader_option(#[case] screen: ScreenState) {
        let mut ctx = context(screen);
        ctx.reader_option = false;
        let params = compute(&ctx);
        assert!(params.tech_mask().is_empty());
        assert!(params.host_routing());
    }

    #[rstest]
    fn unlock_polling_requires_reader_option() {
        let mut ctx = context(ScreenState::OnLocked);
        ctx.lockscreen_unlock = Some(TechMask::A);
        ctx.reader_option = false;
        assert!(compute(&ctx).tech_mask().is_empty());
    }

    #[rstest]
    #[case(ScreenState::Unknown)]
    #[case(ScreenState::OffUnlocked)]
    #[case(ScreenState::OffLocked)]
    fn screen_off_disables_polling(#[case] screen: ScreenState) {
        let params = compute(&context(screen));
        assert!(params.tech_mask().is_empty());
        assert!(params.host_routing());
    }

    #[rstest]
    fn nothing_enabled_without_card_emulation() {
        let mut ctx = context(ScreenState::OffLocked);
        ctx.host_card_emulation = false;
        let params = compute(&ctx);
        assert_eq!(params, DiscoveryParameters::default());
        assert!(!params.should_enable_discovery());
    }

    #[rstest]
    fn compute_is_deterministic() {
        let mut ctx = context(ScreenState::OnLocked);
        ctx.lockscreen_unlock = Some(TechMask::F);
        assert_eq!(compute(&ctx), compute(&ctx.clone()));
    }
}
