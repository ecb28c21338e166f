//! Optional lock-screen unlock capability.
//!
//! Devices that can unlock by tapping a registered tag supply a
//! [`LockscreenUnlock`] implementation at startup. Devices without the feature
//! pass `None` and the lock-screen polling rule never applies.

use std::sync::{PoisonError, RwLock};

use crate::discovery::TechMask;

/// Reports the technologies registered for lock-screen unlock.
pub trait LockscreenUnlock: Send + Sync {
    /// Union of technologies registered by unlock handlers.
    fn registered_technologies(&self) -> TechMask;

    /// Whether lock-screen polling should run at all.
    fn is_polling_enabled(&self) -> bool {
        !self.registered_technologies().is_empty()
    }
}

/// Unlock capability whose registrations are updated in place.
#[derive(Debug, Default)]
pub struct UnlockRegistry {
    technologies: RwLock<TechMask>,
}

impl UnlockRegistry {
    /// Builds a registry holding `technologies`.
    #[must_use]
    pub const fn new(technologies: TechMask) -> Self {
        Self {
            technologies: RwLock::new(technologies),
        }
    }

    /// Replaces the registered technologies.
    ///
    /// The controller re-evaluates discovery only after
    /// [`crate::ControllerHandle::on_lockscreen_unlock_changed`] is called.
    pub fn set(&self, technologies: TechMask) {
        *self
            .technologies
            .write()
            .unwrap_or_else(PoisonError::into_inner) = technologies;
    }
}

impl LockscreenUnlock for UnlockRegistry {
    fn registered_technologies(&self) -> TechMask {
        *self
            .technologies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
