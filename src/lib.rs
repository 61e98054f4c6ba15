pub mod args;
pub mod board;

/// Starts the logger. Verbose mode forces the debug level, otherwise `RUST_LOG` applies.
pub fn init_logging(verbose: bool) {
    if verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
}
