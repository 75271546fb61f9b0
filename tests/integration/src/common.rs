//! Helpers shared by the integration test targets

#![allow(dead_code)]

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use comharness::{BindingSet, Harness, HarnessConfig};
use std::sync::Arc;

/// The test servers' interface definitions
pub const TYPELIB: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../crates/servers/idl/Interfaces.idl");

static TRACING: Once = Once::new();

/// Log to the test output when RUST_LOG is set.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// A harness on the embedded servers with the test type library resolved
pub fn harness() -> (Harness, Arc<BindingSet>) {
    init_tracing();
    let harness = Harness::new(HarnessConfig::default());
    let bindings = harness.resolve_bindings(TYPELIB).expect("test type library resolves");
    (harness, bindings)
}

/// Poll `check` until it holds, for at most two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
