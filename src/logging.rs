//! Log subscriber for the native binary. The library itself only emits
//! `tracing` events; whoever embeds it owns the subscriber.

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. Dependencies stay at `warn`.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "warn,vaultframe=debug"
    } else {
        "warn,vaultframe=info"
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `debug`;
/// `VAULTFRAME_LOG_JSON=1` switches to JSON lines.
pub fn init_logging(debug: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));
    let json = std::env::var("VAULTFRAME_LOG_JSON").is_ok_and(|value| value == "1");

    let builder = fmt::Subscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.compact().with_target(false).try_init()
    };
    if installed.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_raises_only_crate_level() {
        assert_eq!(default_directive(false), "warn,vaultframe=info");
        assert_eq!(default_directive(true), "warn,vaultframe=debug");
        assert!(EnvFilter::try_new(default_directive(true)).is_ok());
    }
}
