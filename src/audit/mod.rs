//! Audit log records.
//!
//! At the end of a transaction the engine projects its state into an
//! [`AuditLog`] holding only the parts selected by `SecAuditLogParts` (or
//! changed with `ctl:auditLogParts`). The record serializes to the JSON
//! layout with serde; [`AuditLogFormat::Native`] renders the sectioned
//! ModSecurity layout instead.

mod format;
mod parts;
mod writer;

pub use format::AuditLogFormat;
pub use parts::{AuditLogParts, AuditPart, PartsEdit};
pub use writer::{AuditWriter, MemoryAuditWriter, SerialAuditWriter};

use crate::bodyprocessors::UploadedFile;
use crate::engine::{EngineMode, Intervention, MatchedRule};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Producer name written in part H.
pub const PRODUCER: &str = concat!("zentinel-waf/", env!("CARGO_PKG_VERSION"));

/// `SecAuditEngine` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditEngineMode {
    /// Log every transaction.
    On,
    /// Log nothing.
    #[default]
    Off,
    /// Log transactions whose status matches `SecAuditLogRelevantStatus`.
    RelevantOnly,
}

impl AuditEngineMode {
    /// Parse `On`, `Off` or `RelevantOnly`, ignoring case.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            "relevantonly" => Some(Self::RelevantOnly),
            _ => None,
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    /// Transaction data.
    pub transaction: AuditTransaction,
    /// One entry per matched rule that was not marked `noauditlog`.
    pub messages: Vec<AuditMessage>,
}

/// Part A plus the nested request, response and producer parts.
#[derive(Debug, Clone, Serialize)]
pub struct AuditTransaction {
    /// Start time, RFC 3339.
    pub timestamp: String,
    /// Start time, unix seconds.
    pub unix_timestamp: i64,
    /// Transaction id.
    pub id: String,
    /// Client address.
    pub client_ip: String,
    /// Client port.
    pub client_port: u16,
    /// Server address.
    pub host_ip: String,
    /// Server port.
    pub host_port: u16,
    /// `SecSensorId`, empty when unset.
    pub server_id: String,
    /// Parts B, C, I and J.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AuditRequest>,
    /// Parts E and F.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AuditResponse>,
    /// Part H.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<AuditProducer>,
    #[serde(skip)]
    pub(crate) started: DateTime<Utc>,
}

/// Request parts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditRequest {
    /// HTTP method (part B).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request URI (part B).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Protocol (part B).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_version: Option<String>,
    /// Headers in arrival order, repeated names joined with `, ` (part B).
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "headers_as_map")]
    pub headers: Option<Vec<(String, String)>>,
    /// Request body (part C, or part I without file contents).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Uploaded files (part J).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<AuditFile>>,
}

/// Response parts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditResponse {
    /// Status code (part F).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
    /// Protocol (part F).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_version: Option<String>,
    /// Headers (part F).
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "headers_as_map")]
    pub headers: Option<Vec<(String, String)>>,
    /// Response body (part E).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// An uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct AuditFile {
    /// Form field.
    pub name: String,
    /// Client-supplied file name.
    pub file_name: String,
    /// Declared content type.
    pub mime: String,
    /// Size in bytes.
    pub size: usize,
}

/// Producer part.
#[derive(Debug, Clone, Serialize)]
pub struct AuditProducer {
    /// Library name and version.
    pub name: String,
    /// `SecComponentSignature` values.
    pub components: Vec<String>,
    /// Rule engine mode.
    pub rule_engine: String,
    /// Microseconds from transaction start to record creation.
    pub stopwatch: u64,
    /// Interruption, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervention: Option<AuditIntervention>,
}

/// How the transaction was interrupted.
#[derive(Debug, Clone, Serialize)]
pub struct AuditIntervention {
    /// `deny`, `drop` or `redirect`.
    pub action: String,
    /// Status sent to the client.
    pub status: u16,
    /// Phase the interruption happened in.
    pub phase: u8,
    /// Rule that interrupted, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<u64>,
}

/// One matched rule.
#[derive(Debug, Clone, Serialize)]
pub struct AuditMessage {
    /// Rule message (`msg`), empty when the rule has none.
    pub message: String,
    /// Rule metadata and match details.
    pub details: AuditMessageDetails,
}

/// Details of a matched rule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMessageDetails {
    /// Rule id.
    pub rule_id: String,
    /// File the rule was loaded from.
    pub file: String,
    /// Line of the rule.
    pub line_number: usize,
    /// Expanded `logdata`.
    pub data: String,
    /// Matched data tags.
    #[serde(rename = "match")]
    pub matched: Vec<String>,
    /// Severity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    /// `ver`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver: Option<String>,
    /// `rev`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// `maturity`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maturity: Option<u8>,
    /// `accuracy`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<u8>,
    /// Rule text including chain children (part K).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Vec<String>>,
}

fn headers_as_map<S: Serializer>(
    headers: &Option<Vec<(String, String)>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match headers {
        Some(headers) => serializer.collect_map(headers.iter().map(|(k, v)| (k, v))),
        None => serializer.serialize_none(),
    }
}

/// Join repeated header names with `, `, keeping first-seen order.
fn join_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for (name, value) in headers {
        match out.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => out.push((name.clone(), value.clone())),
        }
    }
    out
}

/// Terminal transaction state the record is built from.
#[derive(Debug)]
pub struct AuditContext<'a> {
    /// Transaction id.
    pub id: &'a str,
    /// Start time.
    pub started: DateTime<Utc>,
    /// Time spent so far.
    pub elapsed: Duration,
    /// Client address and port.
    pub client: (&'a str, u16),
    /// Server address and port.
    pub server: (&'a str, u16),
    /// `SecSensorId`
    pub sensor_id: Option<&'a str>,
    /// Request line parts.
    pub method: &'a str,
    /// Request URI.
    pub uri: &'a str,
    /// Request protocol.
    pub protocol: &'a str,
    /// Request headers as received.
    pub request_headers: &'a [(String, String)],
    /// Buffered request body.
    pub request_body: Option<String>,
    /// Request body with file contents removed.
    pub request_body_no_files: Option<String>,
    /// Uploaded files.
    pub files: &'a [UploadedFile],
    /// Response status and protocol, once known.
    pub response_status: Option<(u16, &'a str)>,
    /// Response headers as received.
    pub response_headers: &'a [(String, String)],
    /// Buffered response body.
    pub response_body: Option<String>,
    /// Rule engine mode.
    pub engine: EngineMode,
    /// `SecComponentSignature` values.
    pub components: &'a [String],
    /// Matched rules.
    pub matched: &'a [MatchedRule],
    /// Interruption.
    pub intervention: Option<&'a Intervention>,
}

impl AuditLog {
    /// Build a record with the selected parts. Part A is always present.
    pub fn build(ctx: AuditContext<'_>, parts: AuditLogParts) -> Self {
        let has = |p| parts.contains(p);

        let request = if has(AuditPart::B) || has(AuditPart::C) || has(AuditPart::I) || has(AuditPart::J) {
            let mut request = AuditRequest::default();
            if has(AuditPart::B) {
                request.method = Some(ctx.method.to_string());
                request.uri = Some(ctx.uri.to_string());
                request.http_version = Some(ctx.protocol.to_string());
                request.headers = Some(join_headers(ctx.request_headers));
            }
            if has(AuditPart::C) {
                request.body = ctx.request_body;
            } else if has(AuditPart::I) {
                request.body = ctx.request_body_no_files.or(ctx.request_body);
            }
            if has(AuditPart::J) {
                request.files = Some(
                    ctx.files
                        .iter()
                        .map(|f| AuditFile {
                            name: f.field.clone(),
                            file_name: f.filename.clone(),
                            mime: f.content_type.clone(),
                            size: f.size,
                        })
                        .collect(),
                );
            }
            Some(request)
        } else {
            None
        };

        let response = if has(AuditPart::E) || has(AuditPart::F) {
            let mut response = AuditResponse::default();
            if has(AuditPart::F) {
                if let Some((status, protocol)) = ctx.response_status {
                    response.http_code = Some(status);
                    response.http_version = Some(protocol.to_string());
                }
                response.headers = Some(join_headers(ctx.response_headers));
            }
            if has(AuditPart::E) {
                response.body = ctx.response_body;
            }
            Some(response)
        } else {
            None
        };

        let producer = has(AuditPart::H).then(|| AuditProducer {
            name: PRODUCER.to_string(),
            components: ctx.components.to_vec(),
            rule_engine: ctx.engine.as_str().to_string(),
            stopwatch: ctx.elapsed.as_micros() as u64,
            intervention: ctx.intervention.map(|i| AuditIntervention {
                action: i.disruption.name().to_string(),
                status: i.disruption.status(),
                phase: i.phase.number(),
                rule_id: i.rule_id,
            }),
        });

        let with_rule_text = has(AuditPart::K);
        let messages = ctx
            .matched
            .iter()
            .filter(|m| m.audit_log)
            .map(|m| AuditMessage {
                message: m.messages.first().cloned().unwrap_or_default(),
                details: AuditMessageDetails {
                    rule_id: m.rule_id.to_string(),
                    file: m.file.clone().unwrap_or_default(),
                    line_number: m.line,
                    data: m.log_data.join(" "),
                    matched: m.matched_data.clone(),
                    severity: m.severity,
                    ver: m.ver.clone(),
                    rev: m.rev.clone(),
                    tags: m.tags.clone(),
                    maturity: m.maturity,
                    accuracy: m.accuracy,
                    rule: with_rule_text.then(|| m.rule_text.clone()),
                },
            })
            .collect();

        AuditLog {
            transaction: AuditTransaction {
                timestamp: ctx.started.to_rfc3339(),
                unix_timestamp: ctx.started.timestamp(),
                id: ctx.id.to_string(),
                client_ip: ctx.client.0.to_string(),
                client_port: ctx.client.1,
                host_ip: ctx.server.0.to_string(),
                host_port: ctx.server.1,
                server_id: ctx.sensor_id.unwrap_or_default().to_string(),
                request,
                response,
                producer,
                started: ctx.started,
            },
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Disruption, Phase};

    fn matched() -> MatchedRule {
        MatchedRule {
            rule_id: 942100,
            phase: 2,
            disruptive: "deny".into(),
            messages: vec!["SQL Injection".into()],
            log_data: vec!["Matched ARGS:q".into()],
            matched_data: vec!["args:q:1' or 1=1".into()],
            severity: Some(2),
            tags: vec!["attack-sqli".into()],
            rev: None,
            ver: Some("CRS/4.0".into()),
            maturity: None,
            accuracy: None,
            file: None,
            line: 3,
            rule_text: vec![r#"SecRule ARGS "@detectSQLi" "id:942100""#.into()],
            log: true,
            audit_log: true,
            timestamp: Utc::now(),
        }
    }

    fn context<'a>(
        headers: &'a [(String, String)],
        rules: &'a [MatchedRule],
        intervention: Option<&'a Intervention>,
    ) -> AuditContext<'a> {
        AuditContext {
            id: "tx-1",
            started: Utc::now(),
            elapsed: Duration::from_micros(250),
            client: ("10.0.0.1", 51000),
            server: ("10.0.0.2", 443),
            sensor_id: Some("sensor-a"),
            method: "GET",
            uri: "/search?q=x",
            protocol: "HTTP/1.1",
            request_headers: headers,
            request_body: Some("a=1".into()),
            request_body_no_files: None,
            files: &[],
            response_status: Some((403, "HTTP/1.1")),
            response_headers: &[],
            response_body: None,
            engine: EngineMode::On,
            components: &[],
            matched: rules,
            intervention,
        }
    }

    #[test]
    fn test_parts_select_fields() {
        let headers = vec![
            ("Host".to_string(), "example.com".to_string()),
            ("Accept".to_string(), "a".to_string()),
            ("accept".to_string(), "b".to_string()),
        ];
        let rules = vec![matched()];
        let log = AuditLog::build(context(&headers, &rules, None), AuditLogParts::parse("B").unwrap());
        let request = log.transaction.request.as_ref().unwrap();
        assert_eq!(request.method.as_deref(), Some("GET"));
        assert!(request.body.is_none());
        let joined = request.headers.as_ref().unwrap();
        assert_eq!(joined[1], ("Accept".to_string(), "a, b".to_string()));
        assert!(log.transaction.response.is_none());
        assert!(log.transaction.producer.is_none());
        assert!(log.messages[0].details.rule.is_none());
    }

    #[test]
    fn test_json_layout() {
        let intervention = Intervention {
            disruption: Disruption::Status(403),
            rule_id: Some(942100),
            phase: Phase::RequestBody,
            message: None,
        };
        let rules = vec![matched()];
        let log = AuditLog::build(
            context(&[], &rules, Some(&intervention)),
            AuditLogParts::parse("ABCFHKZ").unwrap(),
        );
        let json: serde_json::Value = serde_json::to_value(&log).unwrap();
        assert_eq!(json["transaction"]["client_ip"], "10.0.0.1");
        assert_eq!(json["transaction"]["server_id"], "sensor-a");
        assert_eq!(json["transaction"]["request"]["body"], "a=1");
        assert_eq!(json["transaction"]["response"]["http_code"], 403);
        assert_eq!(json["transaction"]["producer"]["intervention"]["status"], 403);
        assert_eq!(json["messages"][0]["message"], "SQL Injection");
        assert_eq!(json["messages"][0]["details"]["ruleId"], "942100");
        assert_eq!(json["messages"][0]["details"]["match"][0], "args:q:1' or 1=1");
        assert!(json["messages"][0]["details"]["rule"].is_array());
    }

    #[test]
    fn test_noauditlog_rules_are_left_out() {
        let mut quiet = matched();
        quiet.audit_log = false;
        let rules = vec![quiet];
        let log = AuditLog::build(context(&[], &rules, None), AuditLogParts::default());
        assert!(log.messages.is_empty());
    }

    #[test]
    fn test_engine_mode_names() {
        assert_eq!(AuditEngineMode::from_name("RelevantOnly"), Some(AuditEngineMode::RelevantOnly));
        assert_eq!(AuditEngineMode::from_name("on"), Some(AuditEngineMode::On));
        assert_eq!(AuditEngineMode::from_name("sometimes"), None);
    }
}
