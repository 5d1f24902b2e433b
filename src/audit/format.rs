//! Audit record formats.

use super::AuditLog;
use crate::error::{Error, Result};
use std::fmt::Write;

/// `SecAuditLogFormat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditLogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// ModSecurity sectioned layout (`--boundary-A--` ...).
    Native,
}

impl AuditLogFormat {
    /// Parse `JSON` or `Native`, ignoring case.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "native" => Some(Self::Native),
            _ => None,
        }
    }

    /// Render a record. The result has no trailing newline.
    pub fn format(&self, log: &AuditLog) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string(log).map_err(|e| Error::AuditLog {
                message: e.to_string(),
            }),
            Self::Native => Ok(native(log)),
        }
    }
}

fn native(log: &AuditLog) -> String {
    let tx = &log.transaction;
    let boundary: String = tx.id.chars().filter(char::is_ascii_alphanumeric).take(8).collect();
    let mut out = String::new();
    let section = |out: &mut String, letter: char| {
        let _ = writeln!(out, "--{}-{}--", boundary, letter);
    };

    section(&mut out, 'A');
    let _ = writeln!(
        out,
        "[{}] {} {} {} {} {}",
        tx.started.format("%d/%b/%Y:%H:%M:%S %z"),
        tx.id,
        tx.client_ip,
        tx.client_port,
        tx.host_ip,
        tx.host_port
    );

    if let Some(request) = &tx.request {
        if let Some(method) = &request.method {
            section(&mut out, 'B');
            let _ = writeln!(
                out,
                "{} {} {}",
                method,
                request.uri.as_deref().unwrap_or_default(),
                request.http_version.as_deref().unwrap_or_default()
            );
            for (name, value) in request.headers.iter().flatten() {
                let _ = writeln!(out, "{}: {}", name, value);
            }
        }
        if let Some(body) = &request.body {
            section(&mut out, 'C');
            let _ = writeln!(out, "{}", body);
        }
    }

    if let Some(response) = &tx.response {
        if let Some(body) = &response.body {
            section(&mut out, 'E');
            let _ = writeln!(out, "{}", body);
        }
        if let Some(headers) = &response.headers {
            section(&mut out, 'F');
            if let Some(code) = response.http_code {
                let _ = writeln!(
                    out,
                    "{} {}",
                    response.http_version.as_deref().unwrap_or_default(),
                    code
                );
            }
            for (name, value) in headers {
                let _ = writeln!(out, "{}: {}", name, value);
            }
        }
    }

    if let Some(producer) = &tx.producer {
        section(&mut out, 'H');
        for message in &log.messages {
            let d = &message.details;
            let _ = write!(out, "Message: [id \"{}\"]", d.rule_id);
            if !d.file.is_empty() {
                let _ = write!(out, " [file \"{}\"] [line \"{}\"]", d.file, d.line_number);
            }
            if !message.message.is_empty() {
                let _ = write!(out, " [msg \"{}\"]", message.message);
            }
            if !d.data.is_empty() {
                let _ = write!(out, " [data \"{}\"]", d.data);
            }
            if let Some(severity) = d.severity {
                let _ = write!(out, " [severity \"{}\"]", severity);
            }
            for tag in &d.tags {
                let _ = write!(out, " [tag \"{}\"]", tag);
            }
            out.push('\n');
        }
        if let Some(i) = &producer.intervention {
            let _ = writeln!(
                out,
                "Action: Intercepted ({} {}, phase {})",
                i.action, i.status, i.phase
            );
        }
        let _ = writeln!(
            out,
            "Stopwatch: {} {}",
            tx.started.timestamp_micros(),
            producer.stopwatch
        );
        let mut line = producer.name.clone();
        for component in &producer.components {
            line.push_str("; ");
            line.push_str(component);
        }
        let _ = writeln!(out, "Producer: {}", line);
        let _ = writeln!(out, "Engine-Mode: \"{}\"", producer.rule_engine);
    }

    if let Some(files) = tx.request.as_ref().and_then(|r| r.files.as_ref()) {
        section(&mut out, 'J');
        for file in files {
            let _ = writeln!(out, "{} {} {} {}", file.name, file.file_name, file.mime, file.size);
        }
    }

    let rules: Vec<&String> = log
        .messages
        .iter()
        .filter_map(|m| m.details.rule.as_ref())
        .flatten()
        .collect();
    if !rules.is_empty() {
        section(&mut out, 'K');
        for rule in rules {
            let _ = writeln!(out, "{}", rule);
        }
    }

    section(&mut out, 'Z');
    out.truncate(out.trim_end().len());
    out
}
