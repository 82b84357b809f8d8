//! The session orchestrator: selects a backend by language tag, tracks
//! breakpoints, and renders every outcome as a caller-facing plain-text
//! string. No error kind ever crosses this boundary — every public method
//! catches failures internally and returns an `"Error: …"` string instead.

use crate::adapters::{DebugAdapterLogger, NodeAdapter, PythonAdapter};
use crate::cdp::CdpClient;
use crate::dap::client::DapClient;
use crate::dap::types::{Source, SourceBreakpoint};
use crate::persistence::SessionDocument;
use crate::{formatters, Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;

const DAP_LANGUAGES: &[&str] = &["py-runtime"];
const CDP_LANGUAGES: &[&str] = &["js-runtime"];

enum Backend {
    Dap(DapClient),
    Cdp(CdpClient),
}

/// Orchestrates one debug session: at most one active backend
/// connection, serialized command-by-command (callers are expected not
/// to issue a second command before the first replies — the backend
/// clients themselves are `Send + Sync` but this orchestrator is not
/// meant to be driven concurrently).
pub struct DebugSession {
    backend: Option<Backend>,
    language: Option<String>,
    program: Option<String>,
    breakpoints: HashMap<String, Vec<i32>>,
    persist_path: PathBuf,
}

impl DebugSession {
    pub fn new(persist_path: PathBuf) -> Self {
        Self {
            backend: None,
            language: None,
            program: None,
            breakpoints: HashMap::new(),
            persist_path,
        }
    }

    /// Restore `program`/`breakpoints` unconditionally from the
    /// persistence file if present; `language` is restored too unless
    /// the caller supplies an explicit override.
    pub fn from_file_or_new(language: Option<String>, persist_path: PathBuf) -> Self {
        let mut session = Self::new(persist_path.clone());

        if let Some(doc) = SessionDocument::load(&persist_path) {
            session.language = doc.language;
            session.program = doc.program;
            session.breakpoints = doc.breakpoints;
        }

        if language.is_some() {
            session.language = language;
        }

        session
    }

    fn save(&self) {
        let doc = SessionDocument {
            language: self.language.clone(),
            program: self.program.clone(),
            breakpoints: self.breakpoints.clone(),
        };
        if let Err(e) = doc.save(&self.persist_path) {
            tracing::warn!("failed to persist session state: {}", e);
        }
    }

    fn delete_persist_file(&self) {
        if let Err(e) = SessionDocument::delete(&self.persist_path) {
            tracing::warn!("failed to remove session file: {}", e);
        }
    }

    pub async fn start(&mut self, program: &str, language: Option<&str>) -> String {
        match self.start_inner(program, language).await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn start_inner(&mut self, program: &str, language: Option<&str>) -> Result<String> {
        let language = language
            .map(|s| s.to_string())
            .or_else(|| self.language.clone())
            .ok_or_else(|| Error::Configuration("no language specified and none remembered".to_string()))?;

        if !DAP_LANGUAGES.contains(&language.as_str()) && !CDP_LANGUAGES.contains(&language.as_str()) {
            return Err(Error::Configuration(format!(
                "unsupported language: {} (supported: py-runtime, js-runtime)",
                language
            )));
        }

        let program_path = std::fs::canonicalize(program)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| program.to_string());

        let backend = if DAP_LANGUAGES.contains(&language.as_str()) {
            let adapter = PythonAdapter;
            adapter.log_selection();
            adapter.log_transport_init();
            adapter.log_spawn_attempt();

            let client = DapClient::spawn(&PythonAdapter::command(), &PythonAdapter::args())
                .await
                .inspect_err(|e| adapter.log_spawn_error(e))?;

            client
                .start(PythonAdapter::adapter_id())
                .await
                .inspect_err(|e| adapter.log_init_error(e))?;

            client
                .launch(PythonAdapter::launch_args(&program_path, None))
                .await
                .inspect_err(|e| adapter.log_init_error(e))
                .map_err(|e| Error::Protocol(format!("error launching debugger: {}", e)))?;

            adapter.log_connection_success();
            adapter.log_workaround_applied();
            Backend::Dap(client)
        } else {
            let adapter = NodeAdapter;
            adapter.log_selection();
            adapter.log_transport_init();
            adapter.log_spawn_attempt();

            let client = CdpClient::new();
            client.start().await?;
            client
                .launch(&program_path, None)
                .await
                .inspect_err(|e| adapter.log_connection_error(e))
                .map_err(|e| match e {
                    Error::AdapterDiscovery(_) => e,
                    other => Error::Protocol(format!("error launching debugger: {}", other)),
                })?;

            adapter.log_connection_success();
            adapter.log_workaround_applied();
            Backend::Cdp(client)
        };

        self.backend = Some(backend);
        self.language = Some(language.clone());
        self.program = Some(program_path.clone());
        self.breakpoints.clear();
        self.save();

        let basename = std::path::Path::new(&program_path)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| program_path.clone());

        Ok(format!(
            "Debugger started for {} ({}). Ready for breakpoints.",
            basename, language
        ))
    }

    pub async fn stop(&mut self) -> String {
        if let Some(backend) = self.backend.take() {
            let result = match &backend {
                Backend::Dap(c) => {
                    PythonAdapter.log_shutdown();
                    c.disconnect().await
                }
                Backend::Cdp(c) => {
                    NodeAdapter.log_shutdown();
                    c.disconnect().await
                }
            };
            if let Err(e) = result {
                tracing::warn!("error during disconnect: {}", e);
            }
        }
        self.delete_persist_file();
        "Debug session ended.".to_string()
    }

    pub async fn add_breakpoint(&mut self, file: &str, line: i32) -> String {
        match self.add_breakpoint_inner(file, line).await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn add_breakpoint_inner(&mut self, file: &str, line: i32) -> Result<String> {
        let backend = self
            .backend
            .as_ref()
            .ok_or(Error::SessionNotFound)?;

        let lines = self.breakpoints.entry(file.to_string()).or_default();
        if !lines.contains(&line) {
            lines.push(line);
        }
        let lines = lines.clone();

        let verified_count = match backend {
            Backend::Dap(client) => {
                let source = Source {
                    name: std::path::Path::new(file)
                        .file_name()
                        .map(|s| s.to_string_lossy().to_string()),
                    path: Some(file.to_string()),
                    source_reference: None,
                };
                let source_bps: Vec<SourceBreakpoint> = lines
                    .iter()
                    .map(|&l| SourceBreakpoint {
                        line: l,
                        column: None,
                        condition: None,
                        hit_condition: None,
                    })
                    .collect();
                let result = client.set_breakpoints(source, source_bps).await?;
                result.iter().filter(|b| b.verified).count()
            }
            Backend::Cdp(client) => {
                let result = client.set_breakpoints(file, &lines).await?;
                result.iter().filter(|b| b.verified).count()
            }
        };

        self.save();

        if verified_count == lines.len() {
            Ok(format!("Breakpoint set at {}:{} (verified).", file, line))
        } else {
            Ok(format!(
                "Breakpoint set at {}:{} ({}/{} verified).",
                file,
                line,
                verified_count,
                lines.len()
            ))
        }
    }

    pub async fn resume(&mut self) -> String {
        match self.resume_inner().await {
            Ok(msg) => msg,
            Err(Error::Timeout(_)) => {
                "Execution resumed but no breakpoint hit within 30 s.".to_string()
            }
            Err(e) => format!("Error resuming: {}", e),
        }
    }

    async fn resume_inner(&mut self) -> Result<String> {
        let backend = self.backend.as_ref().ok_or(Error::SessionNotFound)?;
        let stop_info = match backend {
            Backend::Dap(client) => client.continue_execution(1).await?,
            Backend::Cdp(client) => client.continue_().await?,
        };
        self.describe_stop(&stop_info).await
    }

    pub async fn step(&mut self, action: &str) -> String {
        match self.step_inner(action).await {
            Ok(msg) => msg,
            Err(Error::Timeout(_)) => {
                "Execution resumed but no breakpoint hit within 30 s.".to_string()
            }
            Err(e) => format!("Error stepping: {}", e),
        }
    }

    async fn step_inner(&mut self, action: &str) -> Result<String> {
        let backend = self.backend.as_ref().ok_or(Error::SessionNotFound)?;
        let stop_info = match backend {
            Backend::Dap(client) => match action {
                "next" => client.next(1).await?,
                "step_in" => client.step_in(1).await?,
                other => return Err(Error::Configuration(format!("unknown step action: {}", other))),
            },
            Backend::Cdp(client) => match action {
                "next" => client.next_().await?,
                "step_in" => client.step_in().await?,
                other => return Err(Error::Configuration(format!("unknown step action: {}", other))),
            },
        };
        self.describe_stop(&stop_info).await
    }

    async fn describe_stop(&self, stop_info: &serde_json::Value) -> Result<String> {
        let reason = stop_info
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("breakpoint");

        match self.top_frame_location().await {
            Ok(Some((file, line))) => Ok(formatters::format_stopped_at(&file, line, reason, None, 3)),
            _ => Ok(format!("Stopped ({}).", reason)),
        }
    }

    async fn top_frame_location(&self) -> Result<Option<(String, i32)>> {
        let backend = self.backend.as_ref().ok_or(Error::SessionNotFound)?;
        let frames = match backend {
            Backend::Dap(client) => client.stack_trace(1, 1).await?,
            Backend::Cdp(client) => client.stack_trace().await?,
        };
        Ok(frames.first().and_then(|f| {
            f.source
                .as_ref()
                .and_then(|s| s.path.clone())
                .map(|path| (path, f.line))
        }))
    }

    async fn top_frame_id(&self) -> Result<Option<i32>> {
        let backend = self.backend.as_ref().ok_or(Error::SessionNotFound)?;
        let frames = match backend {
            Backend::Dap(client) => client.stack_trace(1, 1).await?,
            Backend::Cdp(client) => client.stack_trace().await?,
        };
        Ok(frames.first().map(|f| f.id))
    }

    pub async fn inspect(&self, expression: &str) -> String {
        match self.inspect_inner(expression).await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn inspect_inner(&self, expression: &str) -> Result<String> {
        let backend = self.backend.as_ref().ok_or(Error::SessionNotFound)?;
        let frame_id = self.top_frame_id().await?;

        let (result, type_) = match backend {
            Backend::Dap(client) => client.evaluate(expression, frame_id).await?,
            Backend::Cdp(client) => client.evaluate(expression, frame_id).await?,
        };

        Ok(match type_ {
            Some(t) if !t.is_empty() => format!("({}) {}", t, result),
            _ => result,
        })
    }

    /// Drain and clear captured program output (stdout/stderr/console
    /// lines) accumulated since the last call, if a session is active.
    pub async fn drain_output(&self) -> Vec<String> {
        match self.backend.as_ref() {
            Some(Backend::Dap(client)) => client.drain_output().await,
            Some(Backend::Cdp(client)) => client.drain_output().await,
            None => Vec::new(),
        }
    }

    pub async fn get_stack(&self) -> String {
        match self.get_stack_inner().await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn get_stack_inner(&self) -> Result<String> {
        let backend = self.backend.as_ref().ok_or(Error::SessionNotFound)?;
        let frames = match backend {
            Backend::Dap(client) => client.stack_trace(1, 20).await?,
            Backend::Cdp(client) => client.stack_trace().await?,
        };
        Ok(formatters::format_stack_trace(&frames))
    }

    pub async fn get_local_variables(&self) -> String {
        match self.get_local_variables_inner().await {
            Ok(msg) => msg,
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn get_local_variables_inner(&self) -> Result<String> {
        let vars = self.fetch_locals().await?;
        Ok(formatters::format_variables(&vars))
    }

    async fn fetch_locals(&self) -> Result<Vec<crate::dap::types::Variable>> {
        let backend = self.backend.as_ref().ok_or(Error::SessionNotFound)?;
        let frame_id = match self.top_frame_id().await? {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        let scopes = match backend {
            Backend::Dap(client) => client.scopes(frame_id).await?,
            Backend::Cdp(client) => client.scopes(frame_id).await?,
        };

        let locals_scope = scopes
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case("locals") || s.name.eq_ignore_ascii_case("local"))
            .or_else(|| scopes.first());

        let Some(scope) = locals_scope else {
            return Ok(Vec::new());
        };

        match backend {
            Backend::Dap(client) => client.variables(scope.variables_reference).await,
            Backend::Cdp(client) => client.variables(scope.variables_reference).await,
        }
    }

    /// Composes `start` → `add_breakpoint` → `resume` → collect stack +
    /// locals → `stop`, always calling `stop()` before returning so a
    /// probe never leaves a dangling session behind.
    pub async fn probe(
        &mut self,
        program: &str,
        file: &str,
        line: i32,
        language: Option<&str>,
    ) -> String {
        let start_result = self.start(program, language).await;
        if start_result.starts_with("Error") {
            self.stop().await;
            return start_result;
        }

        let bp_result = self.add_breakpoint(file, line).await;
        if bp_result.starts_with("Error") {
            self.stop().await;
            return bp_result;
        }

        let resume_result = self.resume().await;
        if resume_result.starts_with("Error") {
            self.stop().await;
            return resume_result;
        }

        let reason = resume_result
            .split('(')
            .nth(1)
            .and_then(|s| s.split(')').next())
            .unwrap_or("breakpoint")
            .to_string();

        let frames = match self.backend.as_ref() {
            Some(Backend::Dap(client)) => client.stack_trace(1, 20).await.unwrap_or_default(),
            Some(Backend::Cdp(client)) => client.stack_trace().await.unwrap_or_default(),
            None => Vec::new(),
        };
        let locals = self.fetch_locals().await.unwrap_or_default();

        self.stop().await;

        formatters::format_probe_result(file, line, &frames, &locals, &reason)
    }
}
