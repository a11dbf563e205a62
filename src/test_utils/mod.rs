//! Helpers shared by the unit tests.

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = env_logger::builder().is_test(true).try_init();
});

/// Initializes `env_logger` once per test binary; `RUST_LOG` picks the level.
pub fn enable_logger() {
    *LOGGER_INIT;
}
