//! The session daemon: a local TCP server wrapping one live
//! `DebugSession`, speaking a line-delimited JSON request/response
//! protocol — one request, one response, then the connection closes.

use crate::session::DebugSession;
use crate::{Error, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

pub struct SessionDaemon {
    port: u16,
    session: Mutex<DebugSession>,
}

impl SessionDaemon {
    pub fn new(port: u16, persist_path: PathBuf) -> Self {
        Self {
            port,
            session: Mutex::new(DebugSession::new(persist_path)),
        }
    }

    /// Starts the debuggee, binds the listener, prints the readiness
    /// banner on stdout, and serves connections until a `stop` command
    /// (or the caller's shutdown signal) arrives. On startup failure,
    /// prints `{"error": "…"}` to stdout and returns `Err` so the caller
    /// exits non-zero without ever printing a readiness banner.
    pub async fn start_and_serve(&self, program: &str, language: &str) -> Result<()> {
        let start_result = {
            let mut session = self.session.lock().await;
            session.start(program, Some(language)).await
        };

        if start_result.starts_with("Error") {
            println!("{}", json!({"error": start_result}));
            return Err(Error::Configuration(start_result));
        }

        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(Error::Io)?;
        let bound_port = listener.local_addr().map_err(Error::Io)?.port();

        println!("{}", json!({"ready": true, "port": bound_port}));
        info!("daemon listening on 127.0.0.1:{}", bound_port);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let shutdown_tx = Mutex::new(Some(shutdown_tx));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted.map_err(Error::Io)?;
                    let shutdown_signalled = self.handle_client(stream).await;
                    if shutdown_signalled {
                        if let Some(tx) = shutdown_tx.lock().await.take() {
                            let _ = tx.send(());
                        }
                        break;
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }

        let mut session = self.session.lock().await;
        session.stop().await;

        Ok(())
    }

    /// Reads exactly one command line (bounded by `DAEMON_CMD`), dispatches
    /// it, writes exactly one response line, then closes the connection.
    /// Returns `true` if this command was `stop` (telling the caller to
    /// shut down the listener loop).
    async fn handle_client(&self, stream: TcpStream) -> bool {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        let read_result =
            tokio::time::timeout(crate::timeouts::DAEMON_CMD, reader.read_line(&mut line)).await;

        let response = match read_result {
            Ok(Ok(0)) => json!({"error": "connection closed before sending a command"}),
            Ok(Ok(_)) => match serde_json::from_str::<Value>(line.trim()) {
                Ok(cmd) => self.dispatch(&cmd).await,
                Err(e) => {
                    json!({"error": Error::DaemonInput(format!("invalid command JSON: {}", e)).to_string()})
                }
            },
            Ok(Err(e)) => json!({"error": format!("read error: {}", e)}),
            Err(_) => json!({"error": "timed out waiting for a command"}),
        };

        let is_stop = response
            .get("result")
            .and_then(Value::as_str)
            .map(|s| s == "Debug session ended.")
            .unwrap_or(false);

        let mut out = match serde_json::to_string(&response) {
            Ok(s) => s,
            Err(e) => format!("{{\"error\": \"failed to encode response: {}\"}}", e),
        };
        out.push('\n');

        if let Err(e) = write_half.write_all(out.as_bytes()).await {
            warn!("daemon: failed to write response: {}", e);
        }
        let _ = write_half.flush().await;
        let _ = write_half.shutdown().await;

        is_stop
    }

    async fn dispatch(&self, cmd: &Value) -> Value {
        let action = match cmd.get("action").and_then(Value::as_str) {
            Some(a) => a,
            None => {
                return json!({"error": Error::DaemonInput("missing 'action' field".to_string()).to_string()})
            }
        };

        let mut session = self.session.lock().await;

        let result = match action {
            "breakpoint" => {
                let file = cmd.get("file").and_then(Value::as_str).unwrap_or_default();
                let line = cmd.get("line").and_then(Value::as_i64).unwrap_or_default() as i32;
                session.add_breakpoint(file, line).await
            }
            "resume" => session.resume().await,
            "step" => {
                let action = cmd.get("step_action").and_then(Value::as_str).unwrap_or("next");
                session.step(action).await
            }
            "inspect" => {
                let expression = cmd.get("expression").and_then(Value::as_str).unwrap_or_default();
                session.inspect(expression).await
            }
            "variables" => session.get_local_variables().await,
            "stack" => session.get_stack().await,
            "stop" => session.stop().await,
            other => {
                return json!({"error": Error::DaemonInput(format!("unknown action: {}", other)).to_string()})
            }
        };

        json!({"result": result})
    }
}
