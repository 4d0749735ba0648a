pub mod builders;
pub mod fake_runner;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use beadflow::logging::LOG_ENV;
use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{EngineConfigBuilder, GraphBuilder, NodeSpecBuilder};
pub use fake_runner::FakeRunner;

static INIT: Once = Once::new();

/// Upper bound for any single async test step.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-captured tracing subscriber once per test binary.
///
/// The filter comes from `BEADFLOW_LOG` (e.g. `BEADFLOW_LOG=beadflow::engine=debug`)
/// and defaults to `warn`, so passing tests stay quiet. Output is only
/// shown for failing tests unless run with `--nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var(LOG_ENV)
            .ok()
            .and_then(|v| EnvFilter::try_new(v).ok())
            .unwrap_or_else(|| EnvFilter::new("warn"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step timed out after {TEST_TIMEOUT:?}"),
    }
}
