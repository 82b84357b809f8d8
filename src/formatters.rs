//! Plain-text formatters turning DAP-shaped results into the compact
//! replies the session orchestrator hands back to its caller.

use crate::dap::types::{StackFrame, Variable};
use std::path::Path;

const MAX_VALUE_LENGTH: usize = 200;
const MAX_VARIABLES: usize = 30;

pub fn format_stack_trace(frames: &[StackFrame]) -> String {
    if frames.is_empty() {
        return "(empty stack)".to_string();
    }

    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let file_name = frame
                .source
                .as_ref()
                .and_then(|s| s.name.clone().or_else(|| s.path.clone()))
                .unwrap_or_else(|| "?".to_string());
            format!("#{:<3} {:<30} ({}:{})", i, frame.name, file_name, frame.line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_variables(variables: &[Variable]) -> String {
    if variables.is_empty() {
        return "(no variables)".to_string();
    }

    let shown = variables.iter().take(MAX_VARIABLES);
    let mut lines: Vec<String> = shown
        .map(|v| {
            let mut value = v.value.clone();
            if value.chars().count() > MAX_VALUE_LENGTH {
                value = format!("{}...", value.chars().take(MAX_VALUE_LENGTH).collect::<String>());
            }

            match &v.type_ {
                Some(t) if !t.is_empty() => format!("  {}: {} = {}", v.name, t, value),
                _ => format!("  {} = {}", v.name, value),
            }
        })
        .collect();

    if variables.len() > MAX_VARIABLES {
        lines.push(format!("... and {} more variables", variables.len() - MAX_VARIABLES));
    }

    lines.join("\n")
}

pub fn format_stopped_at(
    file_path: &str,
    line: i32,
    reason: &str,
    source_lines: Option<&[String]>,
    context_radius: i32,
) -> String {
    let file_name = Path::new(file_path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string());

    let header = format!("Stopped ({}) at {}:{}", reason, file_name, line);

    let owned_lines;
    let code_lines: &[String] = match source_lines {
        Some(lines) => lines,
        None => {
            owned_lines = read_source_lines(file_path);
            &owned_lines
        }
    };

    if code_lines.is_empty() {
        return header;
    }

    let start = (line - 1 - context_radius).max(0);
    let end = ((line + context_radius) as usize).min(code_lines.len() as usize);

    let mut snippet = vec![header];
    for i in start as usize..end {
        let lineno = i as i32 + 1;
        let marker = if lineno == line { ">>>" } else { "   " };
        snippet.push(format!("  {} {:>4} | {}", marker, lineno, code_lines[i]));
    }

    snippet.join("\n")
}

pub fn format_probe_result(
    file_path: &str,
    line: i32,
    frames: &[StackFrame],
    local_vars: &[Variable],
    reason: &str,
) -> String {
    let mut parts = vec![format_stopped_at(file_path, line, reason, None, 3)];
    parts.push(String::new());
    parts.push("--- Stack Trace ---".to_string());
    parts.push(format_stack_trace(frames));
    parts.push(String::new());
    parts.push("--- Local Variables ---".to_string());
    parts.push(format_variables(local_vars));
    parts.join("\n")
}

fn read_source_lines(file_path: &str) -> Vec<String> {
    std::fs::read_to_string(file_path)
        .map(|content| content.lines().map(|l| l.to_string()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dap::types::Source;

    fn frame(name: &str, path: &str, line: i32) -> StackFrame {
        StackFrame {
            id: 0,
            name: name.to_string(),
            source: Some(Source {
                name: Some(path.to_string()),
                path: Some(path.to_string()),
                source_reference: None,
            }),
            line,
            column: 1,
            end_line: None,
            end_column: None,
        }
    }

    #[test]
    fn empty_stack_trace() {
        assert_eq!(format_stack_trace(&[]), "(empty stack)");
    }

    #[test]
    fn stack_trace_numbers_frames_from_zero() {
        let frames = vec![frame("main", "app.py", 10), frame("helper", "app.py", 3)];
        let out = format_stack_trace(&frames);
        assert!(out.starts_with("#0  "));
        assert!(out.contains("#1  "));
        assert!(out.contains("app.py:10"));
    }

    #[test]
    fn empty_variables() {
        assert_eq!(format_variables(&[]), "(no variables)");
    }

    #[test]
    fn variables_truncate_long_values() {
        let long_value = "x".repeat(300);
        let vars = vec![Variable {
            name: "big".to_string(),
            value: long_value,
            type_: Some("str".to_string()),
            variables_reference: 0,
        }];
        let out = format_variables(&vars);
        assert!(out.contains("..."));
        assert!(out.len() < 300);
    }

    #[test]
    fn variables_cap_at_30_with_overflow_note() {
        let vars: Vec<Variable> = (0..35)
            .map(|i| Variable {
                name: format!("v{}", i),
                value: i.to_string(),
                type_: None,
                variables_reference: 0,
            })
            .collect();
        let out = format_variables(&vars);
        assert!(out.contains("... and 5 more variables"));
    }

    #[test]
    fn stopped_at_without_source_falls_back_to_header_only() {
        let out = format_stopped_at("/nonexistent/app.py", 5, "breakpoint", None, 3);
        assert_eq!(out, "Stopped (breakpoint) at app.py:5");
    }

    #[test]
    fn stopped_at_marks_current_line() {
        let lines: Vec<String> = (1..=10).map(|i| format!("line{}", i)).collect();
        let out = format_stopped_at("app.py", 5, "breakpoint", Some(&lines), 2);
        assert!(out.contains(">>>    5 | line5"));
        assert!(out.contains("      3 | line3"));
    }

    #[test]
    fn probe_result_combines_sections() {
        let frames = vec![frame("main", "app.py", 5)];
        let vars = vec![Variable {
            name: "x".to_string(),
            value: "1".to_string(),
            type_: Some("int".to_string()),
            variables_reference: 0,
        }];
        let out = format_probe_result("/nonexistent/app.py", 5, &frames, &vars, "breakpoint");
        assert!(out.contains("--- Stack Trace ---"));
        assert!(out.contains("--- Local Variables ---"));
        assert!(out.contains("x: int = 1"));
    }
}
