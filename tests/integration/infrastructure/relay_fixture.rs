use relaycheck::scenario::ScenarioConfig;

/// Path to the bundled known-good relay, built alongside the tests.
pub fn stub_relay_path() -> &'static str {
    env!("CARGO_BIN_EXE_relay-stub")
}

/// Scenario configuration pointed at the stub relay.
///
/// Seeds are per-test so a failure names the exact chunk sequences involved.
pub fn stub_relay_config(seed: u64) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::new(vec![stub_relay_path().to_string()]);
    cfg.seed = seed;
    cfg
}

/// Initialize tracing for test output; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
