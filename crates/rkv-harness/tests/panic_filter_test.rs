// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PANIC FILTER TESTS — rkv-harness
//
// The filter wraps whatever hook is installed, the way libFuzzer's aborting
// hook is wrapped in the fuzz binaries. Its own test binary, since panic
// hooks are process-wide.
// Run: cargo test -p rkv-harness --test panic_filter_test
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::cell::Cell;
use std::panic;

use rkv_harness::{install_panic_filter, ENTRY_APPLY_ORACLE, REQUEST_APPLY_ORACLE};
use rkv_server::ApplyError;

thread_local! {
    static HOOK_CALLS: Cell<u32> = const { Cell::new(0) };
}

fn hook_calls() -> u32 {
    HOOK_CALLS.with(Cell::get)
}

fn panics_with(message: &'static str) -> impl FnOnce() -> Result<(), ApplyError> {
    move || panic!("{message}")
}

#[test]
fn test_filter_hides_only_suppressed_panics_from_previous_hook() {
    panic::set_hook(Box::new(|_| HOOK_CALLS.with(|c| c.set(c.get() + 1))));
    install_panic_filter();

    REQUEST_APPLY_ORACLE.check(panics_with("3.x is not in dotted-tri format"));
    ENTRY_APPLY_ORACLE.check(panics_with("unmarshal should never fail: truncated"));
    assert_eq!(hook_calls(), 0);

    // Allow-listed for requests only.
    let result = panic::catch_unwind(|| {
        ENTRY_APPLY_ORACLE.check(panics_with("3.x is not in dotted-tri format"))
    });
    assert!(result.is_err());
    assert_eq!(hook_calls(), 1);

    // Outside any check the previous hook always runs.
    let result = panic::catch_unwind(|| panic!("3.x is not in dotted-tri format"));
    assert!(result.is_err());
    assert_eq!(hook_calls(), 2);

    let _ = panic::take_hook();
}
