//! Shared server state.

use std::time::Duration;

use tokio::sync::Mutex;

use crate::registry::Registry;

/// Configuration surface consumed by the relay core.
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    /// Maximum members per room. Must be at least 2 to be useful; the CLI
    /// enforces that bound.
    pub max_room_size: usize,
    /// Connections idle longer than this are torn down by the background
    /// sweep. Zero disables the sweep.
    pub idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_room_size: 8,
            idle_timeout: Duration::from_secs(120),
        }
    }
}

/// Shared application state: the registry behind its single mutation
/// point, plus the immutable configuration.
pub struct AppState {
    pub registry: Mutex<Registry>,
    pub config: RelayConfig,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            config,
        }
    }
}
