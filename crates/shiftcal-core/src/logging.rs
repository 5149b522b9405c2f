use std::io::IsTerminal;

use anyhow::anyhow;
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub fn default_level(verbose: u8, quiet: u8) -> &'static str {
    if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    }
}

/// Installs the fmt subscriber. `RUST_LOG` takes precedence over the
/// verbosity-derived level; a second call keeps the first subscriber.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level(verbose, quiet)))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{default_level, init_tracing};

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(default_level(3, 2), "error");
        assert_eq!(default_level(3, 1), "warn");
        assert_eq!(default_level(2, 0), "debug");
        assert_eq!(default_level(0, 0), "warn");
    }

    #[test]
    fn repeated_init_is_tolerated() {
        init_tracing(1, 0).expect("first init");
        init_tracing(3, 0).expect("second init");
    }
}
