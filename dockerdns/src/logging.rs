//! Process-wide logging setup.
//!
//! Timestamped lines on standard error, a `quiet` switch that drops
//! everything but errors, and a `verbose` switch that turns on
//! debug-level output. Built on `log` + `env_logger` so `RUST_LOG` still
//! overrides the default when set.

pub fn init(quiet: bool, verbose: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .target(env_logger::Target::Stderr)
        .init();
}
