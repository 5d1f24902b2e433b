//! Interventions and matched-rule records.

use super::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// What the host must do with an interrupted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disruption {
    /// Respond with this status and stop forwarding.
    Status(u16),
    /// Close the connection without responding.
    Drop,
    /// Respond with a redirect.
    Redirect {
        /// 301, 302, 303 or 307.
        status: u16,
        /// Target URL.
        url: String,
    },
}

impl Disruption {
    /// Name of the disruptive action that produced this.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => "deny",
            Self::Drop => "drop",
            Self::Redirect { .. } => "redirect",
        }
    }

    /// Status code. A drop reports 403 for logging.
    pub fn status(&self) -> u16 {
        match self {
            Self::Status(status) => *status,
            Self::Drop => 403,
            Self::Redirect { status, .. } => *status,
        }
    }

    /// Redirect target, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Redirect { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Whether the connection must be closed.
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::Drop)
    }
}

/// An interruption of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intervention {
    /// What the host must do.
    pub disruption: Disruption,
    /// Rule that interrupted; `None` for body limit rejections.
    pub rule_id: Option<u64>,
    /// Phase the interruption happened in.
    pub phase: Phase,
    /// Expanded `msg` of the rule, or the limit that was crossed.
    pub message: Option<String>,
}

impl Intervention {
    /// Status code to respond with.
    pub fn status(&self) -> u16 {
        self.disruption.status()
    }

    /// One-line summary for logs.
    pub fn format_log(&self) -> String {
        let mut parts = vec![format!("[{} {}]", self.disruption.name(), self.status())];
        if let Some(id) = self.rule_id {
            parts.push(format!("[id \"{}\"]", id));
        }
        if let Some(msg) = &self.message {
            parts.push(format!("[msg \"{}\"]", msg));
        }
        if let Some(url) = self.disruption.url() {
            parts.push(format!("[redirect \"{}\"]", url));
        }
        parts.push(format!("[phase {}]", self.phase.number()));
        parts.join(" ")
    }
}

fn rfc3339<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339())
}

/// Record of a matched chain (or single rule).
#[derive(Debug, Clone, Serialize)]
pub struct MatchedRule {
    /// Id of the chain head.
    pub rule_id: u64,
    /// Phase number.
    pub phase: u8,
    /// Disruptive action that applied, `pass` when none.
    pub disruptive: String,
    /// Expanded `msg` of every link that has one.
    pub messages: Vec<String>,
    /// Expanded `logdata` of every link that has one.
    pub log_data: Vec<String>,
    /// `collection:key:value` of every match.
    pub matched_data: Vec<String>,
    /// Severity, 0-7.
    pub severity: Option<u8>,
    /// Tags of the head.
    pub tags: Vec<String>,
    /// `rev`
    pub rev: Option<String>,
    /// `ver`
    pub ver: Option<String>,
    /// `maturity`
    pub maturity: Option<u8>,
    /// `accuracy`
    pub accuracy: Option<u8>,
    /// Rules file, `None` for inline rules.
    pub file: Option<String>,
    /// Line of the head.
    pub line: usize,
    /// Source text of every link.
    pub rule_text: Vec<String>,
    /// `log` flag.
    pub log: bool,
    /// `auditlog` flag.
    pub audit_log: bool,
    /// When the chain matched.
    #[serde(serialize_with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
}

impl MatchedRule {
    /// ModSecurity style error-log line.
    pub fn format_log(&self) -> String {
        let mut line = format!("[id \"{}\"]", self.rule_id);
        if let Some(file) = &self.file {
            line.push_str(&format!(" [file \"{}\"]", file));
        }
        line.push_str(&format!(" [line \"{}\"]", self.line));
        for msg in &self.messages {
            line.push_str(&format!(" [msg \"{}\"]", msg));
        }
        for data in &self.log_data {
            line.push_str(&format!(" [data \"{}\"]", data));
        }
        if let Some(severity) = self.severity {
            line.push_str(&format!(" [severity \"{}\"]", severity));
        }
        for tag in &self.tags {
            line.push_str(&format!(" [tag \"{}\"]", tag));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disruption_accessors() {
        assert_eq!(Disruption::Status(429).status(), 429);
        assert_eq!(Disruption::Status(429).name(), "deny");
        assert!(Disruption::Drop.is_drop());
        let redirect = Disruption::Redirect {
            status: 302,
            url: "https://example.com/blocked".into(),
        };
        assert_eq!(redirect.url(), Some("https://example.com/blocked"));
        assert_eq!(redirect.status(), 302);
    }

    #[test]
    fn test_format_log() {
        let intervention = Intervention {
            disruption: Disruption::Status(403),
            rule_id: Some(942100),
            phase: Phase::RequestBody,
            message: Some("SQL Injection".into()),
        };
        let log = intervention.format_log();
        assert!(log.starts_with("[deny 403]"));
        assert!(log.contains("[id \"942100\"]"));
        assert!(log.ends_with("[phase 2]"));
    }

    #[test]
    fn test_matched_rule_serializes_timestamp() {
        let rule = MatchedRule {
            rule_id: 1,
            phase: 1,
            disruptive: "pass".into(),
            messages: vec![],
            log_data: vec![],
            matched_data: vec!["args:q:evil".into()],
            severity: None,
            tags: vec![],
            rev: None,
            ver: None,
            maturity: None,
            accuracy: None,
            file: None,
            line: 1,
            rule_text: vec![],
            log: true,
            audit_log: true,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(json["matched_data"][0], "args:q:evil");
    }
}
