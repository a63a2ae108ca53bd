//! Environment-derived configuration: the four `WORKFLOW_ENGINE_*` variables and the
//! log level/format setup. CLI flags win over these when both are present; these win
//! over the hard-coded fallbacks baked in here.

use tracing_subscriber::EnvFilter;

/// `WORKFLOW_ENGINE_TIMEOUT` (ms), `WORKFLOW_ENGINE_SHELL`, `WORKFLOW_ENGINE_WORKING_DIR`.
/// Each is `None` when unset; a caller applies these only where the workflow file and
/// CLI flags leave a gap.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub default_timeout_ms: Option<u64>,
    pub default_shell: Option<String>,
    pub default_working_dir: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            default_timeout_ms: std::env::var("WORKFLOW_ENGINE_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok()),
            default_shell: std::env::var("WORKFLOW_ENGINE_SHELL").ok(),
            default_working_dir: std::env::var("WORKFLOW_ENGINE_WORKING_DIR").ok(),
        }
    }
}

/// Initializes the global `tracing` subscriber. Honors `WORKFLOW_ENGINE_LOG_LEVEL`,
/// falling back to `RUST_LOG`, defaulting to `info`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let directive = std::env::var("WORKFLOW_ENGINE_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
