// Logging setup
//
// Installs a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
// Output goes to stderr; stdout belongs to the consultation prompts.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber; a second call is a no-op
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
