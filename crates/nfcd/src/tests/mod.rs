//! Test suites for the NFC control-plane daemon.

mod behaviour;
mod support;
