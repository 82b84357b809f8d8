use super::transport::DapTransport;
use super::transport_trait::DapTransportTrait;
use super::types::*;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex, Notify, RwLock};
use tracing::{debug, error, info, warn};

type ResponseSender = oneshot::Sender<Response>;
type EventNotifier = Arc<Notify>;
type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// DAP client driving the lifecycle state machine:
/// `Spawned -> Initializing -> Initialized -> Configuring -> Running ->
/// Stopped <-> Running -> Terminated/Disconnected`.
///
/// A background reader task demultiplexes responses (routed to pending
/// request slots) from events (dispatched to registered callbacks); a
/// background writer task drains a channel so senders never contend for
/// the transport lock with the reader.
type StopSlot = Arc<tokio::sync::Mutex<Option<oneshot::Sender<Value>>>>;
type TerminateSlot = Arc<tokio::sync::Mutex<Option<oneshot::Sender<()>>>>;

const MAX_OUTPUT_LINES: usize = 1000;

pub struct DapClient {
    transport: Arc<Mutex<Box<dyn DapTransportTrait>>>,
    seq_counter: Arc<AtomicI32>,
    pending_requests: Arc<RwLock<HashMap<i32, ResponseSender>>>,
    event_notifiers: Arc<RwLock<HashMap<String, EventNotifier>>>,
    event_callbacks: Arc<RwLock<HashMap<String, Vec<EventCallback>>>>,
    write_tx: mpsc::UnboundedSender<Message>,
    configured: Arc<tokio::sync::Mutex<bool>>,
    launch_response: Arc<tokio::sync::Mutex<Option<oneshot::Receiver<Result<()>>>>>,
    stopped_slot: StopSlot,
    terminated_slot: TerminateSlot,
    output_lines: Arc<tokio::sync::Mutex<Vec<String>>>,
    _child: Option<Child>,
}

impl DapClient {
    /// Spawn a DAP adapter subprocess over stdio, per the adapter descriptor's argv.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self> {
        info!("Spawning DAP adapter: {} {:?}", command, args);

        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::AdapterDiscovery(format!("Failed to spawn debug adapter: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Protocol("Failed to get adapter stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Protocol("Failed to get adapter stdout".to_string()))?;

        let transport: Box<dyn DapTransportTrait> = Box::new(DapTransport::new(stdin, stdout));
        Self::new_with_transport(transport, Some(child)).await
    }

    /// Build a client over a caller-supplied transport (used for mock-based testing).
    pub async fn new_with_transport(
        transport: Box<dyn DapTransportTrait>,
        child: Option<Child>,
    ) -> Result<Self> {
        let transport = Arc::new(Mutex::new(transport));
        let seq_counter = Arc::new(AtomicI32::new(1));
        let pending_requests = Arc::new(RwLock::new(HashMap::new()));
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let event_notifiers = Arc::new(RwLock::new(HashMap::new()));
        let event_callbacks = Arc::new(RwLock::new(HashMap::new()));

        let client = Self {
            transport: transport.clone(),
            seq_counter: seq_counter.clone(),
            pending_requests: pending_requests.clone(),
            event_notifiers: event_notifiers.clone(),
            event_callbacks: event_callbacks.clone(),
            write_tx: write_tx.clone(),
            configured: Arc::new(tokio::sync::Mutex::new(false)),
            launch_response: Arc::new(tokio::sync::Mutex::new(None)),
            stopped_slot: Arc::new(tokio::sync::Mutex::new(None)),
            terminated_slot: Arc::new(tokio::sync::Mutex::new(None)),
            output_lines: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            _child: child,
        };

        tokio::spawn(Self::message_reader(
            transport.clone(),
            pending_requests.clone(),
            event_notifiers.clone(),
            event_callbacks.clone(),
        ));

        tokio::spawn(Self::message_writer(transport.clone(), write_rx));

        client.register_stop_terminate_handlers().await;

        Ok(client)
    }

    /// Registers the `stopped`/`terminated` event callbacks once, feeding
    /// whichever one-shot slot is currently armed by `resume_and_wait`.
    async fn register_stop_terminate_handlers(&self) {
        let stopped_slot = self.stopped_slot.clone();
        self.on_event("stopped", move |event| {
            let slot = stopped_slot.clone();
            let body = event.body.unwrap_or_else(|| serde_json::json!({}));
            tokio::spawn(async move {
                if let Some(sender) = slot.lock().await.take() {
                    let _ = sender.send(body);
                }
            });
        })
        .await;

        let terminated_slot = self.terminated_slot.clone();
        self.on_event("terminated", move |_event| {
            let slot = terminated_slot.clone();
            tokio::spawn(async move {
                if let Some(sender) = slot.lock().await.take() {
                    let _ = sender.send(());
                }
            });
        })
        .await;

        let output_lines = self.output_lines.clone();
        self.on_event("output", move |event| {
            let output_lines = output_lines.clone();
            let line = event
                .body
                .as_ref()
                .and_then(|b| b.get("output"))
                .and_then(|v| v.as_str())
                .map(|s| s.trim_end().to_string());
            if let Some(line) = line {
                tokio::spawn(async move {
                    Self::push_output(&output_lines, line).await;
                });
            }
        })
        .await;
    }

    async fn push_output(output_lines: &Arc<tokio::sync::Mutex<Vec<String>>>, line: String) {
        let mut lines = output_lines.lock().await;
        if lines.len() >= MAX_OUTPUT_LINES {
            lines.remove(0);
        }
        lines.push(line);
    }

    /// Drain and clear the captured `output` event text.
    pub async fn drain_output(&self) -> Vec<String> {
        let mut lines = self.output_lines.lock().await;
        std::mem::take(&mut *lines)
    }

    async fn resume_and_wait(&self, command: &str, thread_id: i32) -> Result<Value> {
        let (stopped_tx, stopped_rx) = oneshot::channel();
        let (terminated_tx, terminated_rx) = oneshot::channel();
        *self.stopped_slot.lock().await = Some(stopped_tx);
        *self.terminated_slot.lock().await = Some(terminated_tx);

        match command {
            "continue" => self.continue_execution_request(thread_id).await?,
            "next" => self.next_request(thread_id).await?,
            "stepIn" => self.step_in_request(thread_id).await?,
            other => return Err(Error::Configuration(format!("unknown resume command: {}", other))),
        }

        crate::race::wait_for_stop_or_terminate(stopped_rx, terminated_rx, crate::timeouts::RESUME).await
    }

    /// Reads messages from the transport and dispatches them to pending
    /// request slots (responses) or registered callbacks (events).
    async fn message_reader(
        transport: Arc<Mutex<Box<dyn DapTransportTrait>>>,
        pending_requests: Arc<RwLock<HashMap<i32, ResponseSender>>>,
        event_notifiers: Arc<RwLock<HashMap<String, EventNotifier>>>,
        event_callbacks: Arc<RwLock<HashMap<String, Vec<EventCallback>>>>,
    ) {
        loop {
            let msg_result = {
                let mut transport = transport.lock().await;
                let read_future = transport.read_message();
                tokio::select! {
                    result = read_future => Some(result),
                    _ = tokio::time::sleep(tokio::time::Duration::from_millis(50)) => None,
                }
            };

            let msg = match msg_result {
                None => {
                    tokio::time::sleep(tokio::time::Duration::from_micros(100)).await;
                    continue;
                }
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    error!("DAP reader: connection lost: {}", e);
                    break;
                }
            };

            match msg {
                Message::Response(resp) => {
                    debug!("DAP received response for seq {}", resp.request_seq);
                    let mut pending = pending_requests.write().await;
                    if let Some(sender) = pending.remove(&resp.request_seq) {
                        if sender.send(resp).is_err() {
                            warn!("DAP reader: no one waiting for response");
                        }
                    } else {
                        warn!("DAP reader: response for unknown request {}", resp.request_seq);
                    }
                }
                Message::Event(event) => {
                    debug!("DAP event: {}", event.event);

                    let notifiers = event_notifiers.read().await;
                    if let Some(notifier) = notifiers.get(&event.event) {
                        notifier.notify_waiters();
                    }
                    drop(notifiers);

                    let callbacks = event_callbacks.read().await;
                    if let Some(handlers) = callbacks.get(&event.event) {
                        for callback in handlers.iter() {
                            callback(event.clone());
                        }
                    }
                }
                Message::Request(_) => {
                    warn!("DAP reader: reverse requests from adapter are not supported");
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_micros(100)).await;
        }

        // Tear down: fail every outstanding slot so no caller hangs forever.
        let mut pending = pending_requests.write().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Response {
                seq: -1,
                request_seq: -1,
                command: String::new(),
                success: false,
                message: Some("Adapter connection lost.".to_string()),
                body: None,
            });
        }
    }

    async fn message_writer(
        transport: Arc<Mutex<Box<dyn DapTransportTrait>>>,
        mut write_rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(message) = write_rx.recv().await {
            let mut transport = transport.lock().await;
            if let Err(e) = transport.write_message(&message).await {
                error!("DAP writer: failed to write message: {}", e);
                break;
            }
        }
    }

    /// Register a callback invoked every time `event_name` is received.
    pub async fn on_event<F>(&self, event_name: &str, callback: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let mut callbacks = self.event_callbacks.write().await;
        callbacks
            .entry(event_name.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    async fn send_request_nowait(&self, command: &str, arguments: Option<Value>) -> Result<i32> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);
        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };
        self.write_tx
            .send(Message::Request(request))
            .map_err(|_| Error::ConnectionLost("write channel closed".to_string()))?;
        Ok(seq)
    }

    async fn send_request(&self, command: &str, arguments: Option<Value>) -> Result<Response> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);
        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_requests.write().await;
            pending.insert(seq, tx);
        }

        self.write_tx
            .send(Message::Request(request))
            .map_err(|_| Error::ConnectionLost("write channel closed".to_string()))?;

        let response = rx
            .await
            .map_err(|_| Error::ConnectionLost("request cancelled".to_string()))?;

        if response.seq == -1 && response.request_seq == -1 {
            return Err(Error::ConnectionLost(
                response.message.unwrap_or_else(|| "connection lost".to_string()),
            ));
        }

        debug!("DAP '{}' response success={}", command, response.success);
        Ok(response)
    }

    async fn initialize(&self, adapter_id: &str) -> Result<Capabilities> {
        let args = InitializeRequestArguments {
            client_id: Some("debug-mediator".to_string()),
            client_name: Some("debug-mediator".to_string()),
            adapter_id: adapter_id.to_string(),
            locale: Some("en-US".to_string()),
            lines_start_at_1: Some(true),
            columns_start_at_1: Some(true),
            path_format: Some("path".to_string()),
            supports_run_in_terminal_request: Some(false),
        };

        let response = self
            .send_request("initialize", Some(serde_json::to_value(args)?))
            .await?;

        if !response.success {
            return Err(Error::Protocol(format!("initialize failed: {:?}", response.message)));
        }

        let caps: Capabilities = response
            .body
            .ok_or_else(|| Error::Protocol("no capabilities in initialize response".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| Error::Protocol(format!("failed to parse capabilities: {}", e)))
            })?;

        Ok(caps)
    }

    /// Spawn the adapter and send `initialize`, per §4.B step 1.
    pub async fn start(&self, adapter_id: &str) -> Result<Capabilities> {
        self.initialize(adapter_id).await
    }

    /// Send `launch` and wait for the adapter's `initialized` event, per
    /// §4.B step 2. `configurationDone` is deferred to the first
    /// `continue_execution` call (step 3) so breakpoints set in between
    /// are registered before the debuggee starts running.
    pub async fn launch(&self, args: Value) -> Result<()> {
        let (init_tx, init_rx) = oneshot::channel();
        let init_tx = Arc::new(tokio::sync::Mutex::new(Some(init_tx)));

        self.on_event("initialized", move |_event| {
            let tx = init_tx.clone();
            tokio::spawn(async move {
                if let Some(sender) = tx.lock().await.take() {
                    let _ = sender.send(());
                }
            });
        })
        .await;

        let (launch_tx, launch_rx) = oneshot::channel();
        *self.launch_response.lock().await = Some(launch_rx);

        let seq = self.send_request_nowait("launch", Some(args)).await?;
        let pending_requests = self.pending_requests.clone();

        // Register a oneshot for the launch response ourselves, bypassing
        // send_request's blocking wait (we don't await it until configurationDone).
        let (resp_tx, resp_rx) = oneshot::channel();
        {
            let mut pending = pending_requests.write().await;
            pending.insert(seq, resp_tx);
        }
        tokio::spawn(async move {
            let result = match resp_rx.await {
                Ok(response) if response.seq == -1 && response.request_seq == -1 => Err(
                    Error::ConnectionLost(response.message.unwrap_or_default()),
                ),
                Ok(response) if !response.success => {
                    Err(Error::Protocol(format!("launch failed: {:?}", response.message)))
                }
                Ok(_) => Ok(()),
                Err(_) => Err(Error::ConnectionLost("launch request cancelled".to_string())),
            };
            let _ = launch_tx.send(result);
        });

        match tokio::time::timeout(crate::timeouts::LAUNCH, init_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Protocol("'initialized' signal cancelled".to_string())),
            Err(_) => Err(Error::Timeout(
                "timed out waiting for 'initialized' event".to_string(),
            )),
        }
    }

    /// Send `configurationDone` exactly once, then await the deferred
    /// launch response. No-op if already configured.
    async fn ensure_configured(&self) -> Result<()> {
        let mut configured = self.configured.lock().await;
        if *configured {
            return Ok(());
        }
        *configured = true;
        drop(configured);

        let response = self.send_request("configurationDone", None).await?;
        if !response.success {
            return Err(Error::Protocol(format!(
                "configurationDone failed: {:?}",
                response.message
            )));
        }

        let launch_rx = self.launch_response.lock().await.take();
        if let Some(rx) = launch_rx {
            match tokio::time::timeout(crate::timeouts::LAUNCH, rx).await {
                Ok(Ok(result)) => result?,
                Ok(Err(_)) => return Err(Error::ConnectionLost("launch task dropped".to_string())),
                Err(_) => return Err(Error::Timeout("timed out waiting for launch response".to_string())),
            }
        }

        Ok(())
    }

    pub async fn set_breakpoints(
        &self,
        source: Source,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<Breakpoint>> {
        let args = SetBreakpointsArguments {
            source,
            breakpoints: Some(breakpoints),
            source_modified: Some(false),
        };

        let response = self
            .send_request("setBreakpoints", Some(serde_json::to_value(args)?))
            .await?;

        if !response.success {
            return Err(Error::Protocol(format!("setBreakpoints failed: {:?}", response.message)));
        }

        #[derive(serde::Deserialize)]
        struct SetBreakpointsResponse {
            breakpoints: Vec<Breakpoint>,
        }

        let body: SetBreakpointsResponse = response
            .body
            .ok_or_else(|| Error::Protocol("no breakpoints in response".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| Error::Protocol(format!("failed to parse breakpoints: {}", e)))
            })?;

        Ok(body.breakpoints)
    }

    async fn continue_execution_request(&self, thread_id: i32) -> Result<()> {
        if !*self.configured.lock().await {
            return self.ensure_configured().await;
        }
        let args = ContinueArguments { thread_id };
        let response = self
            .send_request("continue", Some(serde_json::to_value(args)?))
            .await?;
        if !response.success {
            return Err(Error::Protocol(format!("continue failed: {:?}", response.message)));
        }
        Ok(())
    }

    async fn next_request(&self, thread_id: i32) -> Result<()> {
        let args = NextArguments { thread_id };
        let response = self
            .send_request("next", Some(serde_json::to_value(args)?))
            .await?;
        if !response.success {
            return Err(Error::Protocol(format!("next failed: {:?}", response.message)));
        }
        Ok(())
    }

    async fn step_in_request(&self, thread_id: i32) -> Result<()> {
        let args = StepInArguments { thread_id };
        let response = self
            .send_request("stepIn", Some(serde_json::to_value(args)?))
            .await?;
        if !response.success {
            return Err(Error::Protocol(format!("stepIn failed: {:?}", response.message)));
        }
        Ok(())
    }

    /// Resume execution and race the adapter's `stopped`/`terminated`
    /// events, per §4.D. On the first call this sends `configurationDone`
    /// (starting the debuggee) instead of `continue`.
    pub async fn continue_execution(&self, thread_id: i32) -> Result<Value> {
        self.resume_and_wait("continue", thread_id).await
    }

    pub async fn next(&self, thread_id: i32) -> Result<Value> {
        self.resume_and_wait("next", thread_id).await
    }

    pub async fn step_in(&self, thread_id: i32) -> Result<Value> {
        self.resume_and_wait("stepIn", thread_id).await
    }

    pub async fn stack_trace(&self, thread_id: i32, levels: i32) -> Result<Vec<StackFrame>> {
        let args = StackTraceArguments {
            thread_id,
            start_frame: Some(0),
            levels: Some(levels),
        };

        let response = self
            .send_request("stackTrace", Some(serde_json::to_value(args)?))
            .await?;

        if !response.success {
            return Err(Error::Protocol(format!("stackTrace failed: {:?}", response.message)));
        }

        #[derive(serde::Deserialize)]
        struct StackTraceResponse {
            #[serde(rename = "stackFrames")]
            stack_frames: Vec<StackFrame>,
        }

        let body: StackTraceResponse = response
            .body
            .ok_or_else(|| Error::Protocol("no stack frames in response".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| Error::Protocol(format!("failed to parse stack frames: {}", e)))
            })?;

        Ok(body.stack_frames)
    }

    pub async fn scopes(&self, frame_id: i32) -> Result<Vec<Scope>> {
        let args = ScopesArguments { frame_id };
        let response = self
            .send_request("scopes", Some(serde_json::to_value(args)?))
            .await?;
        if !response.success {
            return Err(Error::Protocol(format!("scopes failed: {:?}", response.message)));
        }

        #[derive(serde::Deserialize)]
        struct ScopesResponse {
            scopes: Vec<Scope>,
        }

        let body: ScopesResponse = response
            .body
            .ok_or_else(|| Error::Protocol("no scopes in response".to_string()))
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| Error::Protocol(format!("failed to parse scopes: {}", e)))
            })?;

        Ok(body.scopes)
    }

    pub async fn variables(&self, variables_reference: i32) -> Result<Vec<Variable>> {
        let response = self
            .send_request(
                "variables",
                Some(serde_json::json!({ "variablesReference": variables_reference })),
            )
            .await?;
        if !response.success {
            return Err(Error::Protocol(format!("variables failed: {:?}", response.message)));
        }

        #[derive(serde::Deserialize)]
        struct VariablesResponse {
            variables: Vec<Variable>,
        }

        let body: VariablesResponse = response
            .body
            .ok_or_else(|| Error::Protocol("no variables in response".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| Error::Protocol(format!("failed to parse variables: {}", e)))
            })?;

        Ok(body.variables)
    }

    pub async fn evaluate(&self, expression: &str, frame_id: Option<i32>) -> Result<(String, Option<String>)> {
        let args = EvaluateArguments {
            expression: expression.to_string(),
            frame_id,
            context: Some("repl".to_string()),
        };

        let response = self
            .send_request("evaluate", Some(serde_json::to_value(args)?))
            .await?;

        if !response.success {
            return Err(Error::Protocol(format!("evaluate failed: {:?}", response.message)));
        }

        #[derive(serde::Deserialize)]
        struct EvaluateResponse {
            result: String,
            #[serde(rename = "type")]
            type_: Option<String>,
        }

        let body: EvaluateResponse = response
            .body
            .ok_or_else(|| Error::Protocol("no result in evaluate response".to_string()))
            .and_then(|v| {
                serde_json::from_value(v)
                    .map_err(|e| Error::Protocol(format!("failed to parse evaluate result: {}", e)))
            })?;

        Ok((body.result, body.type_))
    }

    pub async fn threads(&self) -> Result<Vec<Thread>> {
        let response = self.send_request("threads", None).await?;
        if !response.success {
            return Err(Error::Protocol(format!("threads failed: {:?}", response.message)));
        }

        #[derive(serde::Deserialize)]
        struct ThreadsResponse {
            threads: Vec<Thread>,
        }

        let body: ThreadsResponse = response
            .body
            .ok_or_else(|| Error::Protocol("no threads in response".to_string()))
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| Error::Protocol(format!("failed to parse threads: {}", e)))
            })?;

        Ok(body.threads)
    }

    /// Best-effort `disconnect` request, then terminate the subprocess
    /// with a short grace period before hard-killing it.
    pub async fn disconnect(&self) -> Result<()> {
        let _ = tokio::time::timeout(
            crate::timeouts::DISCONNECT,
            self.send_request(
                "disconnect",
                Some(serde_json::json!({"restart": false, "terminateDebuggee": true})),
            ),
        )
        .await;

        Ok(())
    }
}
