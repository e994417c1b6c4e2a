//! CLI subcommand implementations for the Paywire binary.

pub mod doctor;
pub mod sites;
pub mod start;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the defaults.
pub fn init_logging(verbose: bool, json: bool) {
    let default = if verbose {
        "paywire_runtime=debug"
    } else {
        "paywire_runtime=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
