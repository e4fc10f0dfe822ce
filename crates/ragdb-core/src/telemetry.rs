use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber writing through the test harness. Honors
/// `RUST_LOG`, otherwise logs the ragdb crates at debug. Safe to call from
/// every test.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,ragdb_core=debug,ragdb_text=debug,ragdb_vector=debug,ragdb_hybrid=debug"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
