use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log to stderr. `RUST_LOG` wins over the verbosity flags.
pub fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();
}
