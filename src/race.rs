//! The stop/terminate race primitive shared by the DAP and CDP backends.
//!
//! Every resume-style operation (`continue_`, `next`, `step_in`) creates a
//! fresh pair of one-shot signals before asking the backend to resume the
//! debuggee, then races them here: whichever fires first wins, and the
//! loser is simply dropped (there is nothing to cancel on either side —
//! both signals are fulfilled by the backend's own event-reader task, which
//! keeps running regardless of which branch wins).

use crate::{Error, Result};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// Await whichever of `stopped`/`terminated` resolves first, within
/// `timeout`. If `terminated` wins (or the debuggee had already exited),
/// returns a fresh synthetic terminated body rather than whatever the
/// `terminated` channel carried, since DAP/CDP terminated events carry no
/// useful body of their own.
pub async fn wait_for_stop_or_terminate(
    stopped: oneshot::Receiver<Value>,
    terminated: oneshot::Receiver<()>,
    timeout: std::time::Duration,
) -> Result<Value> {
    tokio::select! {
        result = stopped => {
            result.map_err(|_| Error::ConnectionLost("stopped signal dropped".to_string()))
        }
        result = terminated => {
            result.map_err(|_| Error::ConnectionLost("terminated signal dropped".to_string()))?;
            Ok(terminated_body())
        }
        _ = tokio::time::sleep(timeout) => {
            Err(Error::Timeout(format!(
                "timed out after {:?} waiting for a stop or termination",
                timeout
            )))
        }
    }
}

fn terminated_body() -> Value {
    json!({
        "reason": "terminated",
        "description": "Program exited.",
    })
}
