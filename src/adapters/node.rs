use super::logging::DebugAdapterLogger;
use std::error::Error as StdError;
use tracing::error;

/// Descriptor for the CDP backend behind the `js-runtime` language tag.
/// Not a spawnable DAP adapter — node itself is the inspector — but kept
/// alongside [`super::python::PythonAdapter`] so adapter selection gets
/// the same structured lifecycle logging regardless of backend.
pub struct NodeAdapter;

impl NodeAdapter {
    pub fn command() -> String {
        "node".to_string()
    }

    pub fn args() -> Vec<String> {
        vec!["--inspect-brk=0".to_string()]
    }
}

impl DebugAdapterLogger for NodeAdapter {
    fn language_name(&self) -> &str {
        "Node.js"
    }

    fn language_emoji(&self) -> &str {
        "🟢"
    }

    fn transport_type(&self) -> &str {
        "WebSocket (CDP)"
    }

    fn adapter_id(&self) -> &str {
        "node-inspector"
    }

    fn command_line(&self) -> String {
        format!("{} {} <program>", Self::command(), Self::args().join(" "))
    }

    fn log_spawn_error(&self, err: &dyn StdError) {
        error!(
            "❌ [NODE.JS] Failed to spawn node: {}\n   Command: {}\n   Possible causes:\n   1. node not installed → node --version\n   2. node not in PATH → which node",
            err,
            self.command_line()
        );
    }

    fn log_connection_error(&self, err: &dyn StdError) {
        error!("❌ [NODE.JS] Inspector WebSocket connection failed: {}", err);
    }

    fn log_init_error(&self, err: &dyn StdError) {
        error!("❌ [NODE.JS] CDP handshake failed: {}", err);
    }
}
