//! Named timeout constants, centralized instead of inlined as magic numbers.
//!
//! Mirrors the module-level `TIMEOUT_*` constants of the Python reference
//! implementation this core was distilled from.
use std::time::Duration;

/// How long `continue_`/`next`/`step_in` wait for the debuggee to pause
/// again before the stop/terminate race times out.
pub const RESUME: Duration = Duration::from_secs(30);

/// How long to wait for the debug adapter (DAP) or inspector (CDP) to
/// become ready during launch.
pub const LAUNCH: Duration = Duration::from_secs(10);

/// Grace period for an adapter/debuggee subprocess to exit before it is
/// killed outright during disconnect.
pub const DISCONNECT: Duration = Duration::from_secs(3);

/// Per-line read timeout when scanning a debuggee's stderr for the
/// inspector's WebSocket URL.
pub const READLINE: Duration = Duration::from_secs(5);

/// How long the daemon waits to read one command line from a connected
/// client before giving up on that connection.
pub const DAEMON_CMD: Duration = Duration::from_secs(120);
