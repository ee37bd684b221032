//! Tracing subscriber setup for binaries and tests.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! embedding application's job. These helpers cover the common case: an
//! env-filtered fmt subscriber with ANSI output when stderr is a terminal.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

/// Install the default subscriber, honouring `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed, which is
/// normal when tests or embedding applications initialise first.
pub fn try_init() -> bool {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Install the default subscriber, panicking if one is already set.
///
/// Intended for `main`; prefer [`try_init`] anywhere re-entry is possible.
pub fn init() {
    assert!(try_init(), "a global tracing subscriber is already installed");
}
