//! Utilities: logging bootstrap (verbosity-derived level, RUST_LOG override).
//!
//! Key items:
//!   derive_level / init_logging
//!
//! Logs always go to stderr: with the stdio transport, stdout is the
//! JSON-RPC channel and must only carry protocol frames.

/// Logging helpers.
pub mod logging {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::filter::LevelFilter;

    pub fn derive_level(verbose: u8, quiet: bool) -> LevelFilter {
        if quiet {
            return LevelFilter::ERROR;
        }
        match verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Build the filter: RUST_LOG wins when set, otherwise the derived level.
    pub fn build_filter(level: LevelFilter) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy()
    }

    /// Install the process subscriber. Called once from `main`; library code
    /// only emits events and never configures a writer.
    pub fn init_logging(level: LevelFilter) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(build_filter(level))
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn quiet_wins_over_verbose() {
            assert_eq!(derive_level(3, true), LevelFilter::ERROR);
        }

        #[test]
        fn verbosity_steps() {
            assert_eq!(derive_level(0, false), LevelFilter::INFO);
            assert_eq!(derive_level(1, false), LevelFilter::DEBUG);
            assert_eq!(derive_level(2, false), LevelFilter::TRACE);
            assert_eq!(derive_level(9, false), LevelFilter::TRACE);
        }
    }
}

pub use logging::{derive_level, init_logging};
