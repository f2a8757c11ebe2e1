//! Integration Test: Production Code Hygiene
//!
//! **Policy**: Nothing in steady-state operation may crash the daemon, and
//! waiting is done on signals, never by sleeping a thread.
//! **Exceptions**: test code (everything after `#[cfg(test)]`, and the
//! `tests/` directories, which are not scanned).

use architectural_enforcement::{assert_clean, find_patterns};

const PRODUCTION_DIRS: [&str; 3] = ["halo/core/src", "halo/daemon/src", "haloctl/src"];

#[test]
fn test_no_unwrap_or_expect_in_production() {
    let violations = find_patterns(&PRODUCTION_DIRS, &[".unwrap()", ".expect("]);
    assert_clean(
        "Propagate errors with ? instead of unwrap()/expect()",
        &violations,
    );
}

#[test]
fn test_no_thread_sleep_in_production() {
    let violations = find_patterns(&PRODUCTION_DIRS, &["thread::sleep("]);
    assert_clean(
        "Use StopSignal::wait_until or async timers instead of thread::sleep",
        &violations,
    );
}

#[test]
fn test_no_process_exit_in_library() {
    let violations = find_patterns(&["halo/core/src"], &["process::exit(", "panic!("]);
    assert_clean("Library code must return errors, not exit", &violations);
}
