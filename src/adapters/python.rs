use super::logging::DebugAdapterLogger;
use serde_json::{json, Value};
use std::error::Error as StdError;
use tracing::error;

/// Descriptor for the `debugpy` DAP adapter backing the `py-runtime`
/// language tag. Spawned as `python3 -m debugpy.adapter` over stdio.
pub struct PythonAdapter;

impl PythonAdapter {
    pub fn command() -> String {
        "python3".to_string()
    }

    pub fn args() -> Vec<String> {
        vec!["-m".to_string(), "debugpy.adapter".to_string()]
    }

    pub fn adapter_id() -> &'static str {
        "debugpy"
    }

    /// Builds the `launch` request body. Follows debugpy's own expected
    /// shape (`type: "debugpy"`, `justMyCode`) rather than a generic DAP
    /// launch body.
    pub fn launch_args(program: &str, cwd: Option<&str>) -> Value {
        let resolved_cwd = cwd
            .map(|c| c.to_string())
            .or_else(|| {
                std::path::Path::new(program)
                    .parent()
                    .map(|p| p.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| ".".to_string());

        json!({
            "type": "debugpy",
            "request": "launch",
            "name": "Debug Python",
            "program": program,
            "cwd": resolved_cwd,
            "console": "internalConsole",
            "justMyCode": true,
        })
    }
}

impl DebugAdapterLogger for PythonAdapter {
    fn language_name(&self) -> &str {
        "Python"
    }

    fn language_emoji(&self) -> &str {
        "🐍"
    }

    fn transport_type(&self) -> &str {
        "STDIO"
    }

    fn adapter_id(&self) -> &str {
        Self::adapter_id()
    }

    fn command_line(&self) -> String {
        format!("{} {}", Self::command(), Self::args().join(" "))
    }

    fn log_spawn_error(&self, err: &dyn StdError) {
        error!(
            "❌ [PYTHON] Failed to spawn debugpy adapter: {}\n   Command: {}\n   Possible causes:\n   1. debugpy not installed → pip install debugpy\n   2. python3 not in PATH → which python3",
            err,
            self.command_line()
        );
    }

    fn log_connection_error(&self, err: &dyn StdError) {
        error!("❌ [PYTHON] Adapter connection failed: {}", err);
    }

    fn log_init_error(&self, err: &dyn StdError) {
        error!("❌ [PYTHON] DAP handshake failed: {}", err);
    }
}
