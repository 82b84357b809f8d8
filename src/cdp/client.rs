//! Chrome DevTools Protocol backend for `js-runtime` debuggees.
//!
//! Spawns the debuggee with `--inspect-brk=0`, scrapes the inspector's
//! `ws://` URL off its stderr, and drives the `Debugger`/`Runtime` domains
//! over a WebSocket. Every result is translated into the DAP-shaped types
//! from [`crate::dap::types`] so the session orchestrator can treat this
//! and the DAP backend identically.

use crate::dap::types::{Breakpoint, Scope, Source, StackFrame, Thread, Variable};
use crate::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

type PendingMap = Arc<RwLock<HashMap<i64, oneshot::Sender<Value>>>>;
type StopSlot = Arc<Mutex<Option<oneshot::Sender<Value>>>>;
type TerminateSlot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

/// Mirrors `debugger_core.cdp_client.CDPClient` from the original
/// implementation, driven through `tokio-tungstenite` instead of the
/// Python `websockets` library.
pub struct CdpClient {
    process: Arc<Mutex<Option<Child>>>,
    write_tx: Mutex<Option<tokio::sync::mpsc::UnboundedSender<WsMessage>>>,
    msg_id: AtomicI64,
    pending: PendingMap,
    stopped_slot: StopSlot,
    terminated_slot: TerminateSlot,
    output_lines: Arc<Mutex<Vec<String>>>,
    scripts: Arc<RwLock<HashMap<String, String>>>,
    breakpoint_ids: Arc<RwLock<HashMap<String, Vec<String>>>>,
    last_stack_frames: Arc<RwLock<Vec<StackFrame>>>,
    last_call_frames: Arc<RwLock<Vec<Value>>>,
    object_ids: Arc<RwLock<HashMap<i64, String>>>,
    next_var_ref: AtomicI64,
}

const MAX_OUTPUT_LINES: usize = 1000;

impl CdpClient {
    pub fn new() -> Self {
        Self {
            process: Arc::new(Mutex::new(None)),
            write_tx: Mutex::new(None),
            msg_id: AtomicI64::new(1),
            pending: Arc::new(RwLock::new(HashMap::new())),
            stopped_slot: Arc::new(Mutex::new(None)),
            terminated_slot: Arc::new(Mutex::new(None)),
            output_lines: Arc::new(Mutex::new(Vec::new())),
            scripts: Arc::new(RwLock::new(HashMap::new())),
            breakpoint_ids: Arc::new(RwLock::new(HashMap::new())),
            last_stack_frames: Arc::new(RwLock::new(Vec::new())),
            last_call_frames: Arc::new(RwLock::new(Vec::new())),
            object_ids: Arc::new(RwLock::new(HashMap::new())),
            next_var_ref: AtomicI64::new(1),
        }
    }

    /// No-op, kept to mirror the DAP backend's `start` step.
    pub async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Spawn `node --inspect-brk=0 <program>`, connect to its inspector,
    /// enable the `Debugger`/`Runtime` domains, and run until the debuggee
    /// pauses at its first statement.
    pub async fn launch(&self, program: &str, cwd: Option<&str>) -> Result<()> {
        let mut command = Command::new("node");
        command
            .arg("--inspect-brk=0")
            .arg(program)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::AdapterDiscovery(format!("failed to spawn node: {}", e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Protocol("failed to capture node stderr".to_string()))?;

        let ws_url = Self::read_ws_url(stderr, &mut child).await?;
        self.connect(&ws_url, Some(child)).await
    }

    /// Connect to an already-running inspector WebSocket, enable the
    /// `Debugger`/`Runtime` domains, and wait for the first pause. Split out
    /// of `launch` so tests can point this at an in-process fake inspector
    /// instead of a real `node` subprocess.
    async fn connect(&self, ws_url: &str, child: Option<Child>) -> Result<()> {
        info!("CDP connecting to {}", ws_url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| Error::ConnectionLost(format!("failed to connect to inspector: {}", e)))?;

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (write_tx, mut write_rx) = tokio::sync::mpsc::unbounded_channel::<WsMessage>();

        tokio::spawn(async move {
            while let Some(msg) = write_rx.recv().await {
                if ws_write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        *self.write_tx.lock().await = Some(write_tx);
        let has_child = child.is_some();
        *self.process.lock().await = child;

        // `Inspector.detached`/`Runtime.executionContextDestroyed` can be
        // missed if node is killed outright, so the debuggee's own exit
        // is an independent termination source (open question, §9).
        if has_child {
            let process_for_watch = self.process.clone();
            let terminated_slot_for_watch = self.terminated_slot.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    let mut guard = process_for_watch.lock().await;
                    match guard.as_mut() {
                        Some(child) => match child.try_wait() {
                            Ok(Some(_status)) => {
                                if let Some(sender) = terminated_slot_for_watch.lock().await.take() {
                                    let _ = sender.send(());
                                }
                                break;
                            }
                            Ok(None) => continue,
                            Err(_) => break,
                        },
                        None => break,
                    }
                }
            });
        }

        let pending = self.pending.clone();
        let stopped_slot = self.stopped_slot.clone();
        let terminated_slot = self.terminated_slot.clone();
        let output_lines = self.output_lines.clone();
        let scripts = self.scripts.clone();
        let last_stack_frames = self.last_stack_frames.clone();
        let last_call_frames = self.last_call_frames.clone();

        tokio::spawn(async move {
            while let Some(frame) = ws_read.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("CDP read loop: {}", e);
                        break;
                    }
                };

                let msg: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("CDP: failed to parse message: {}", e);
                        continue;
                    }
                };

                if let Some(id) = msg.get("id").and_then(Value::as_i64) {
                    let mut pending = pending.write().await;
                    if let Some(sender) = pending.remove(&id) {
                        let result = msg.get("result").cloned().unwrap_or(Value::Null);
                        let _ = sender.send(result);
                    }
                } else if let Some(method) = msg.get("method").and_then(Value::as_str) {
                    Self::handle_event(
                        method,
                        msg.get("params").cloned().unwrap_or(Value::Null),
                        &stopped_slot,
                        &terminated_slot,
                        &output_lines,
                        &scripts,
                        &last_stack_frames,
                        &last_call_frames,
                    )
                    .await;
                }
            }

            let mut pending = pending.write().await;
            for (_, sender) in pending.drain() {
                let _ = sender.send(Value::Null);
            }
        });

        self.send("Debugger.enable", json!({})).await?;
        self.send("Runtime.enable", json!({})).await?;

        let (stopped_tx, stopped_rx) = oneshot::channel();
        *self.stopped_slot.lock().await = Some(stopped_tx);

        self.send("Runtime.runIfWaitingForDebugger", json!({})).await?;

        tokio::time::timeout(crate::timeouts::LAUNCH, stopped_rx)
            .await
            .map_err(|_| Error::Timeout("timed out waiting for node to pause on entry".to_string()))?
            .map_err(|_| Error::ConnectionLost("stopped signal dropped during launch".to_string()))?;

        Ok(())
    }

    async fn read_ws_url(stderr: ChildStderr, child: &mut Child) -> Result<String> {
        let mut reader = BufReader::new(stderr);
        let re = Regex::new(r"ws://\S+").unwrap();
        let deadline = tokio::time::Instant::now() + crate::timeouts::LAUNCH;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(
                    "timed out waiting for inspector WebSocket URL".to_string(),
                ));
            }

            let mut line = String::new();
            let read = tokio::time::timeout(crate::timeouts::READLINE, reader.read_line(&mut line)).await;

            match read {
                Ok(Ok(0)) => {
                    let status = child.wait().await.ok();
                    return Err(Error::AdapterDiscovery(format!(
                        "node exited before printing inspector URL (status: {:?})",
                        status
                    )));
                }
                Ok(Ok(_)) => {
                    if let Some(m) = re.find(&line) {
                        return Ok(m.as_str().to_string());
                    }
                }
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => continue,
            }

            if let Ok(Some(status)) = child.try_wait() {
                return Err(Error::AdapterDiscovery(format!(
                    "node exited before printing inspector URL (status: {})",
                    status
                )));
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_event(
        method: &str,
        params: Value,
        stopped_slot: &StopSlot,
        terminated_slot: &TerminateSlot,
        output_lines: &Arc<Mutex<Vec<String>>>,
        scripts: &Arc<RwLock<HashMap<String, String>>>,
        last_stack_frames: &Arc<RwLock<Vec<StackFrame>>>,
        last_call_frames: &Arc<RwLock<Vec<Value>>>,
    ) {
        match method {
            "Debugger.paused" => {
                let call_frames = params
                    .get("callFrames")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                let frames = Self::convert_frames(&call_frames, scripts).await;
                *last_call_frames.write().await = call_frames;
                *last_stack_frames.write().await = frames;

                let reason = params.get("reason").and_then(Value::as_str).unwrap_or("other");
                let dap_reason = match reason {
                    "breakpoint" => "breakpoint",
                    "exception" => "exception",
                    "other" => "step",
                    other => other,
                };

                if let Some(sender) = stopped_slot.lock().await.take() {
                    let _ = sender.send(json!({"reason": dap_reason, "threadId": 1}));
                }
            }
            "Debugger.scriptParsed" => {
                if let (Some(id), Some(url)) = (
                    params.get("scriptId").and_then(Value::as_str),
                    params.get("url").and_then(Value::as_str),
                ) {
                    scripts.write().await.insert(id.to_string(), url.to_string());
                }
            }
            "Runtime.consoleAPICalled" => {
                let parts: Vec<String> = params
                    .get("args")
                    .and_then(Value::as_array)
                    .map(|args| {
                        args.iter()
                            .map(|a| {
                                a.get("description")
                                    .or_else(|| a.get("value"))
                                    .map(|v| v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string()))
                                    .unwrap_or_default()
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Self::push_output(output_lines, parts.join(" ")).await;
            }
            "Runtime.exceptionThrown" => {
                let text = params
                    .get("exceptionDetails")
                    .and_then(|d| d.get("exception"))
                    .and_then(|e| e.get("description").or_else(|| e.get("text")))
                    .and_then(Value::as_str)
                    .unwrap_or("(unknown exception)")
                    .to_string();
                Self::push_output(output_lines, text).await;
            }
            "Inspector.detached" | "Runtime.executionContextDestroyed" => {
                if let Some(sender) = terminated_slot.lock().await.take() {
                    let _ = sender.send(());
                }
            }
            _ => {}
        }
    }

    async fn push_output(output_lines: &Arc<Mutex<Vec<String>>>, line: String) {
        let mut lines = output_lines.lock().await;
        if lines.len() >= MAX_OUTPUT_LINES {
            lines.remove(0);
        }
        lines.push(line);
    }

    /// Drain and clear the captured console/exception output lines.
    pub async fn drain_output(&self) -> Vec<String> {
        let mut lines = self.output_lines.lock().await;
        std::mem::take(&mut *lines)
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.msg_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(id, tx);

        let payload = json!({"id": id, "method": method, "params": params});
        let text = serde_json::to_string(&payload)?;

        let write_tx = self.write_tx.lock().await;
        let write_tx = write_tx
            .as_ref()
            .ok_or_else(|| Error::InvalidState("CDP client not connected".to_string()))?;
        write_tx
            .send(WsMessage::Text(text))
            .map_err(|_| Error::ConnectionLost("inspector write channel closed".to_string()))?;
        drop(write_tx);

        debug!("CDP -> {} {}", method, id);

        rx.await
            .map_err(|_| Error::ConnectionLost("inspector connection lost".to_string()))
    }

    pub async fn set_breakpoints(&self, file_path: &str, lines: &[i32]) -> Result<Vec<Breakpoint>> {
        let existing_ids = self
            .breakpoint_ids
            .write()
            .await
            .remove(file_path)
            .unwrap_or_default();

        for id in existing_ids {
            let _ = self.send("Debugger.removeBreakpoint", json!({"breakpointId": id})).await;
        }

        let url = format!("file://{}", file_path);
        let mut new_ids = Vec::with_capacity(lines.len());
        let mut results = Vec::with_capacity(lines.len());

        for &line in lines {
            let response = self
                .send(
                    "Debugger.setBreakpointByUrl",
                    json!({"lineNumber": line - 1, "url": url}),
                )
                .await;

            match response {
                Ok(body) => {
                    let id = body.get("breakpointId").and_then(Value::as_str).map(|s| s.to_string());
                    let resolved_line = body
                        .get("locations")
                        .and_then(Value::as_array)
                        .and_then(|locs| locs.first())
                        .and_then(|loc| loc.get("lineNumber"))
                        .and_then(Value::as_i64)
                        .map(|n| n as i32 + 1)
                        .unwrap_or(line);

                    if let Some(id) = id.clone() {
                        new_ids.push(id);
                    }

                    results.push(Breakpoint {
                        id: None,
                        verified: id.is_some(),
                        message: None,
                        source: Some(Source {
                            name: None,
                            path: Some(file_path.to_string()),
                            source_reference: None,
                        }),
                        line: Some(resolved_line),
                        column: None,
                    });
                }
                Err(_) => {
                    results.push(Breakpoint {
                        id: None,
                        verified: false,
                        message: Some("failed to set breakpoint".to_string()),
                        source: Some(Source {
                            name: None,
                            path: Some(file_path.to_string()),
                            source_reference: None,
                        }),
                        line: Some(line),
                        column: None,
                    });
                }
            }
        }

        self.breakpoint_ids.write().await.insert(file_path.to_string(), new_ids);

        Ok(results)
    }

    async fn fresh_slots(&self) -> (oneshot::Receiver<Value>, oneshot::Receiver<()>) {
        let (stopped_tx, stopped_rx) = oneshot::channel();
        let (terminated_tx, terminated_rx) = oneshot::channel();
        *self.stopped_slot.lock().await = Some(stopped_tx);
        *self.terminated_slot.lock().await = Some(terminated_tx);
        (stopped_rx, terminated_rx)
    }

    async fn resume_and_wait(&self, method: &str) -> Result<Value> {
        let (stopped_rx, terminated_rx) = self.fresh_slots().await;
        self.send(method, json!({})).await?;
        crate::race::wait_for_stop_or_terminate(stopped_rx, terminated_rx, crate::timeouts::RESUME).await
    }

    pub async fn continue_(&self) -> Result<Value> {
        self.resume_and_wait("Debugger.resume").await
    }

    pub async fn next_(&self) -> Result<Value> {
        self.resume_and_wait("Debugger.stepOver").await
    }

    pub async fn step_in(&self) -> Result<Value> {
        self.resume_and_wait("Debugger.stepInto").await
    }

    /// Returns the stack captured by the last `Debugger.paused` event; CDP
    /// has no separate stack-trace request.
    pub async fn stack_trace(&self) -> Result<Vec<StackFrame>> {
        Ok(self.last_stack_frames.read().await.clone())
    }

    pub async fn scopes(&self, frame_id: i32) -> Result<Vec<Scope>> {
        let call_frames = self.last_call_frames.read().await;
        let frame = call_frames
            .get(frame_id as usize)
            .ok_or_else(|| Error::Protocol(format!("no such frame: {}", frame_id)))?;

        let mut scopes = Vec::new();
        if let Some(scope_list) = frame.get("scopeChain").and_then(Value::as_array) {
            for scope in scope_list {
                let scope_type = scope.get("type").and_then(Value::as_str).unwrap_or("unknown");
                let object_id = scope
                    .get("object")
                    .and_then(|o| o.get("objectId"))
                    .and_then(Value::as_str);

                let var_ref = match object_id {
                    Some(id) => self.store_object_id(id).await,
                    None => 0,
                };

                let mut name = scope_type.to_string();
                if let Some(first) = name.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }

                scopes.push(Scope {
                    name,
                    variables_reference: var_ref as i32,
                    expensive: scope_type == "global",
                });
            }
        }

        Ok(scopes)
    }

    pub async fn variables(&self, variables_reference: i32) -> Result<Vec<Variable>> {
        let object_id = {
            let object_ids = self.object_ids.read().await;
            object_ids.get(&(variables_reference as i64)).cloned()
        };

        let object_id = match object_id {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        let response = self
            .send(
                "Runtime.getProperties",
                json!({"objectId": object_id, "ownProperties": true, "generatePreview": true}),
            )
            .await?;

        let mut variables = Vec::new();
        if let Some(props) = response.get("result").and_then(Value::as_array) {
            for prop in props {
                let name = prop.get("name").and_then(Value::as_str).unwrap_or("").to_string();
                let value_obj = prop.get("value").cloned().unwrap_or(Value::Null);

                let value_str = Self::resolve_value_string(&value_obj);
                let type_ = value_obj
                    .get("type")
                    .and_then(Value::as_str)
                    .map(|s| s.to_string());

                let child_ref = match value_obj.get("objectId").and_then(Value::as_str) {
                    Some(id) => self.store_object_id(id).await as i32,
                    None => 0,
                };

                variables.push(Variable {
                    name,
                    value: value_str,
                    type_,
                    variables_reference: child_ref,
                });
            }
        }

        Ok(variables)
    }

    fn resolve_value_string(value_obj: &Value) -> String {
        if let Some(v) = value_obj.get("value") {
            if let Some(s) = v.as_str() {
                return s.to_string();
            }
            return v.to_string();
        }
        if let Some(desc) = value_obj.get("description").and_then(Value::as_str) {
            return desc.to_string();
        }
        if value_obj.get("subtype").and_then(Value::as_str) == Some("null") {
            return "null".to_string();
        }
        if let Some(unserializable) = value_obj.get("unserializableValue").and_then(Value::as_str) {
            return unserializable.to_string();
        }
        value_obj.to_string()
    }

    pub async fn evaluate(&self, expression: &str, frame_id: Option<i32>) -> Result<(String, Option<String>)> {
        let response = match frame_id {
            Some(frame_id) => {
                let call_frames = self.last_call_frames.read().await;
                let call_frame_id = call_frames
                    .get(frame_id as usize)
                    .and_then(|f| f.get("callFrameId"))
                    .and_then(Value::as_str)
                    .map(|s| s.to_string());
                drop(call_frames);

                match call_frame_id {
                    Some(call_frame_id) => {
                        self.send(
                            "Debugger.evaluateOnCallFrame",
                            json!({"callFrameId": call_frame_id, "expression": expression, "generatePreview": true}),
                        )
                        .await?
                    }
                    None => {
                        self.send(
                            "Runtime.evaluate",
                            json!({"expression": expression, "generatePreview": true}),
                        )
                        .await?
                    }
                }
            }
            None => {
                self.send(
                    "Runtime.evaluate",
                    json!({"expression": expression, "generatePreview": true}),
                )
                .await?
            }
        };

        let result = response.get("result").cloned().unwrap_or(Value::Null);
        let formatted = result
            .get("description")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| Self::resolve_value_string(&result));
        let type_ = result.get("type").and_then(Value::as_str).map(|s| s.to_string());

        Ok((formatted, type_))
    }

    pub async fn threads(&self) -> Result<Vec<Thread>> {
        Ok(vec![Thread {
            id: 1,
            name: "main".to_string(),
        }])
    }

    pub async fn disconnect(&self) -> Result<()> {
        *self.write_tx.lock().await = None;

        if let Some(mut child) = self.process.lock().await.take() {
            let _ = tokio::time::timeout(crate::timeouts::DISCONNECT, child.wait()).await;
            let _ = child.start_kill();
        }

        let mut pending = self.pending.write().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Value::Null);
        }

        Ok(())
    }

    async fn store_object_id(&self, object_id: &str) -> i64 {
        let var_ref = self.next_var_ref.fetch_add(1, Ordering::SeqCst);
        self.object_ids.write().await.insert(var_ref, object_id.to_string());
        var_ref
    }

    async fn convert_frames(
        call_frames: &[Value],
        scripts: &Arc<RwLock<HashMap<String, String>>>,
    ) -> Vec<StackFrame> {
        let scripts = scripts.read().await;
        let mut frames = Vec::with_capacity(call_frames.len());

        for (index, frame) in call_frames.iter().enumerate() {
            let name = frame
                .get("functionName")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("(anonymous)")
                .to_string();

            let location = frame.get("location");
            let line = location
                .and_then(|l| l.get("lineNumber"))
                .and_then(Value::as_i64)
                .map(|n| n as i32 + 1)
                .unwrap_or(0);
            let column = location
                .and_then(|l| l.get("columnNumber"))
                .and_then(Value::as_i64)
                .map(|n| n as i32 + 1)
                .unwrap_or(0);

            let script_id = location.and_then(|l| l.get("scriptId")).and_then(Value::as_str);
            let url = frame
                .get("url")
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .or_else(|| script_id.and_then(|id| scripts.get(id).cloned()))
                .unwrap_or_default();

            let path = url.strip_prefix("file://").unwrap_or(&url).to_string();
            let file_name = std::path::Path::new(&path)
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| path.clone());

            frames.push(StackFrame {
                id: index as i32,
                name,
                source: Some(Source {
                    name: Some(file_name),
                    path: Some(path),
                    source_reference: None,
                }),
                line,
                column,
                end_line: None,
                end_column: None,
            });
        }

        frames
    }
}

impl Default for CdpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_value_string_prefers_value_field() {
        let v = json!({"value": "hello", "type": "string"});
        assert_eq!(CdpClient::resolve_value_string(&v), "hello");
    }

    #[test]
    fn resolve_value_string_falls_back_to_description() {
        let v = json!({"description": "Object", "type": "object"});
        assert_eq!(CdpClient::resolve_value_string(&v), "Object");
    }

    #[test]
    fn resolve_value_string_null_subtype() {
        let v = json!({"type": "object", "subtype": "null"});
        assert_eq!(CdpClient::resolve_value_string(&v), "null");
    }

    #[test]
    fn resolve_value_string_unserializable() {
        let v = json!({"unserializableValue": "NaN", "type": "number"});
        assert_eq!(CdpClient::resolve_value_string(&v), "NaN");
    }

    #[tokio::test]
    async fn convert_frames_maps_location_to_one_based_line() {
        let scripts = Arc::new(RwLock::new(HashMap::new()));
        let frames = vec![json!({
            "functionName": "main",
            "url": "file:///tmp/app.js",
            "location": {"lineNumber": 9, "columnNumber": 2, "scriptId": "1"},
        })];

        let converted = CdpClient::convert_frames(&frames, &scripts).await;
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].line, 10);
        assert_eq!(converted[0].name, "main");
        assert_eq!(converted[0].source.as_ref().unwrap().path.as_deref(), Some("/tmp/app.js"));
    }

    #[tokio::test]
    async fn convert_frames_falls_back_to_anonymous() {
        let scripts = Arc::new(RwLock::new(HashMap::new()));
        let frames = vec![json!({
            "functionName": "",
            "url": "file:///tmp/app.js",
            "location": {"lineNumber": 0, "columnNumber": 0, "scriptId": "1"},
        })];

        let converted = CdpClient::convert_frames(&frames, &scripts).await;
        assert_eq!(converted[0].name, "(anonymous)");
    }

    /// Minimal in-process stand-in for a node inspector: upgrades one TCP
    /// connection to a WebSocket and replies to exactly the CDP methods
    /// `CdpClient::connect`/`set_breakpoints`/`continue_`/`evaluate` send,
    /// so the S2 happy path (spec §8) can be exercised without a real node
    /// binary on PATH.
    async fn spawn_fake_inspector() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws.split();

            while let Some(Ok(WsMessage::Text(text))) = read.next().await {
                let msg: Value = serde_json::from_str(&text).unwrap();
                let id = msg.get("id").and_then(Value::as_i64).unwrap();
                let method = msg.get("method").and_then(Value::as_str).unwrap();

                let result = match method {
                    "Debugger.setBreakpointByUrl" => json!({
                        "breakpointId": "bp1",
                        "locations": [{"lineNumber": 2, "columnNumber": 0}],
                    }),
                    "Debugger.evaluateOnCallFrame" | "Runtime.evaluate" => {
                        json!({"result": {"type": "number", "value": 30, "description": "30"}})
                    }
                    _ => json!({}),
                };
                write
                    .send(WsMessage::Text(json!({"id": id, "result": result}).to_string()))
                    .await
                    .unwrap();

                if method == "Runtime.runIfWaitingForDebugger" || method == "Debugger.resume" {
                    let reason = if method == "Runtime.runIfWaitingForDebugger" {
                        "other"
                    } else {
                        "breakpoint"
                    };
                    let paused = json!({
                        "method": "Debugger.paused",
                        "params": {
                            "reason": reason,
                            "callFrames": [{
                                "callFrameId": "cf1",
                                "functionName": "main",
                                "url": "file:///tmp/app.js",
                                "location": {"scriptId": "1", "lineNumber": 2, "columnNumber": 0},
                                "scopeChain": [],
                            }],
                        },
                    });
                    write.send(WsMessage::Text(paused.to_string())).await.unwrap();
                }
            }
        });

        format!("ws://127.0.0.1:{}", port)
    }

    #[tokio::test]
    async fn cdp_happy_path_against_fake_inspector() {
        let ws_url = spawn_fake_inspector().await;

        let client = CdpClient::new();
        client.connect(&ws_url, None).await.unwrap();

        let breakpoints = client.set_breakpoints("/tmp/app.js", &[3]).await.unwrap();
        assert!(breakpoints[0].verified);
        assert_eq!(breakpoints[0].line, Some(3));

        let stop_info = client.continue_().await.unwrap();
        assert_eq!(stop_info["reason"], "breakpoint");

        let frames = client.stack_trace().await.unwrap();
        assert_eq!(frames[0].name, "main");

        let (result, type_) = client.evaluate("a+b", Some(0)).await.unwrap();
        assert_eq!(result, "30");
        assert_eq!(type_.as_deref(), Some("number"));

        client.disconnect().await.unwrap();
    }
}
