pub mod relay_fixture;

pub use relay_fixture::{init_tracing, stub_relay_config, stub_relay_path};
