//! Process-wide `tracing` subscriber setup.
//!
//! Initialization is idempotent for the same filter; asking for a different
//! filter after the fact is rejected rather than silently ignored.

use std::sync::{Mutex, PoisonError};

use tracing_subscriber::EnvFilter;

use crate::error::LoggingError;

static ACTIVE_FILTER: Mutex<Option<String>> = Mutex::new(None);

pub fn init_logging(filter: &str) -> Result<(), LoggingError> {
    let requested = filter.trim().to_string();
    let mut active = ACTIVE_FILTER.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(current) = active.as_ref() {
        if *current == requested {
            return Ok(());
        }
        return Err(LoggingError::Conflicting {
            current: current.clone(),
            requested,
        });
    }

    let env_filter = EnvFilter::try_new(&requested).map_err(|e| LoggingError::InvalidFilter {
        filter: requested.clone(),
        message: e.to_string(),
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    *active = Some(requested);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_idempotent_and_conflicts_are_rejected() {
        assert!(matches!(
            init_logging("neutrino_tau_bridge=loudest"),
            Err(LoggingError::InvalidFilter { .. })
        ));

        init_logging("neutrino_tau_bridge=debug").expect("first init");
        init_logging(" neutrino_tau_bridge=debug ").expect("same filter again");
        assert!(matches!(
            init_logging("warn"),
            Err(LoggingError::Conflicting { .. })
        ));
    }
}
