//! Logging Setup
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_tracing`] once at startup.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, or by
/// `default_directive` when `RUST_LOG` is unset or invalid
///
/// `default_directive` uses `EnvFilter` syntax, e.g. `"tapline_core=info"`.
/// If a global subscriber is already installed this is a no-op.
///
/// # Errors
///
/// Returns an error if `default_directive` does not parse.
pub fn init_tracing(default_directive: &str) -> Result<(), ParseError> {
    let default = EnvFilter::try_new(default_directive)?;
    let filter = env_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), default);

    // Already initialised (tests, embedding apps) is fine
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    Ok(())
}

/// `RUST_LOG` directives win over the default as a whole
fn env_filter(env: Option<&str>, default: EnvFilter) -> EnvFilter {
    match env.map(EnvFilter::try_new) {
        Some(Ok(filter)) => filter,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init_tracing("tapline_core=debug").is_ok());
        assert!(init_tracing("tapline_core=info").is_ok());
    }

    #[test]
    fn test_bad_directive() {
        assert!(init_tracing("tapline_core=loud").is_err());
    }

    #[test]
    fn test_env_directives_replace_default() {
        let default = EnvFilter::try_new("tapline_core=info").unwrap();
        let filter = env_filter(Some("tapline_core=debug"), default);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_default_without_env() {
        let default = EnvFilter::try_new("tapline_core=info").unwrap();
        assert_eq!(
            env_filter(None, default).max_level_hint(),
            Some(LevelFilter::INFO)
        );

        let default = EnvFilter::try_new("tapline_core=info").unwrap();
        assert_eq!(
            env_filter(Some("tapline_core=loud"), default).max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }
}
