//! # Telemetry
//!
//! JSON log output filtered by `RUST_LOG`.

use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install a global JSON subscriber
///
/// `RUST_LOG` directives are honoured; `default_directive` (for example
/// `strata_core=info`) is added on top. Returns `false` when a global
/// subscriber was already installed, which leaves that one in place.
///
/// # Errors
///
/// Returns `Error::Config` if `default_directive` does not parse.
pub fn init_tracing(default_directive: &str) -> Result<bool> {
    let directive = default_directive
        .parse()
        .map_err(|e| Error::config(format!("invalid log directive '{default_directive}': {e}")))?;
    let installed = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .json()
        .try_init()
        .is_ok();
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_directive() {
        assert!(init_tracing("strata_core=loud").is_err());
    }

    #[test]
    fn test_second_init_is_noop() {
        let first = init_tracing("strata_core=debug").unwrap();
        let second = init_tracing("strata_core=debug").unwrap();
        assert!(!(first && second));
    }
}
