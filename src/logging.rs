use std::io::{self, IsTerminal};

use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::ColorChoice;

/// Set up the console logging layer. `verbosity` is the number of times
/// `-v` was passed; `RUST_LOG` overrides it entirely when set.
pub fn init_logging(verbosity: u8, color: ColorChoice) {
    tracing_log::LogTracer::init().expect("failed to set log tracer");

    let default_filter = match verbosity {
        0 => "info",
        1 => "info,libquark=debug",
        2 => "info,libquark=trace",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let use_ansi = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stderr().is_terminal(),
    };

    fmt()
        .with_writer(io::stderr)
        .with_ansi(use_ansi)
        .without_time()
        .with_target(false)
        .with_thread_names(false)
        .with_level(true)
        .with_env_filter(env_filter)
        .init();
}
