//! Integration Test: Hardware Isolation
//!
//! **Policy**: Only the ticking cycle owns the output driver. The control
//! socket, its client stub and the request handler run in unprivileged-facing
//! code paths and MUST NOT reach the peripheral, so no request volume can
//! push frames past the rate governor.

use architectural_enforcement::{assert_clean, find_patterns, rust_sources};

const HARDWARE_SYMBOLS: [&str; 6] = [
    "crate::driver",
    "crate::ticker",
    "OutputDriver",
    "PixelSink",
    "Peripheral",
    "TickLoop",
];

#[test]
fn test_transport_never_touches_driver() {
    assert!(!rust_sources("halo/core/src/transport").is_empty());
    let violations = find_patterns(&["halo/core/src/transport"], &HARDWARE_SYMBOLS);
    assert_clean("Transport code must not reference the output driver", &violations);
}

#[test]
fn test_control_handler_never_touches_driver() {
    let violations = find_patterns(&["halo/core/src/control.rs"], &HARDWARE_SYMBOLS);
    assert_clean(
        "Control handling goes through DaemonState, never the driver",
        &violations,
    );
}

#[test]
fn test_client_binary_is_hardware_free() {
    let violations = find_patterns(&["haloctl/src"], &HARDWARE_SYMBOLS);
    assert_clean("haloctl must only speak the control protocol", &violations);
}

#[test]
fn test_state_lock_never_held_by_driver() {
    // The shared state may describe the driver mode but must not own it
    let violations = find_patterns(
        &["halo/core/src/state.rs"],
        &["OutputDriver", "PixelSink", "Box<dyn Peripheral"],
    );
    assert_clean("DaemonState must not hold a driver handle", &violations);
}
