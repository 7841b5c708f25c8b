use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a global subscriber that also captures `log` records, once per test binary.
pub fn setup_test_environment() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing_core::Level::TRACE)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    });
}
