use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize a compact stdout subscriber for the process.
///
/// `filter` takes the usual env-filter syntax, e.g. `"troupe=debug"`.
/// Safe to call more than once; later calls are no-ops.
pub fn init(filter: &str) {
    let _ = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .try_init();
}
