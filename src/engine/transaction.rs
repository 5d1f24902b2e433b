//! Transaction processing.
//!
//! A [`Transaction`] follows one request/response exchange. The host feeds
//! it connection data, the request line, headers and bodies in order and
//! asks after every phase whether it must interrupt:
//!
//! ```ignore
//! let mut tx = waf.new_transaction();
//! tx.process_connection("192.0.2.7", 51234, "10.0.0.1", 443);
//! tx.process_uri("GET", "/search?q=x", "HTTP/1.1");
//! tx.add_request_header("Host", "example.com");
//! if let Some(disruption) = tx.process_request_headers() {
//!     // respond with disruption.status() and stop
//! }
//! ```

use super::config::{BodyLimitAction, EngineMode, TransactionPolicy};
use super::intervention::{Disruption, Intervention, MatchedRule};
use super::phase::Phase;
use super::scheduler::RuntimeRemovals;
use super::WafInner;
use crate::actions::persistent::{self, LoadedCollection};
use crate::audit::{AuditContext, AuditEngineMode, AuditLog};
use crate::body::BodyBuffer;
use crate::bodyprocessors::{self, BodyProcessorKind, UploadedFile};
use crate::debuglog::DebugScope;
use crate::error::Result;
use crate::parser::AllowScope;
use crate::variables::{request, response, CollectionStore, VariableName};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

/// One request/response exchange.
pub struct Transaction {
    pub(crate) waf: Arc<WafInner>,
    pub(crate) id: Arc<str>,
    pub(crate) store: CollectionStore,
    pub(crate) policy: TransactionPolicy,
    pub(crate) matched: Vec<MatchedRule>,
    pub(crate) intervention: Option<Intervention>,
    pub(crate) allow: Option<(AllowScope, Phase)>,
    pub(crate) removals: RuntimeRemovals,
    pub(crate) persistent: Vec<LoadedCollection>,
    pub(crate) phases_done: [bool; 5],
    started: DateTime<Utc>,
    clock: Instant,
    client: (String, u16),
    server: (String, u16),
    method: String,
    uri: String,
    protocol: String,
    request_headers: Vec<(String, String)>,
    response_headers: Vec<(String, String)>,
    response_status: Option<(u16, String)>,
    request_body: BodyBuffer,
    response_body: BodyBuffer,
    request_body_full: bool,
    response_body_full: bool,
    request_body_processed: bool,
    files: Vec<UploadedFile>,
    request_body_no_files: Option<String>,
    logged: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("matched", &self.matched.len())
            .field("intervention", &self.intervention)
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(waf: Arc<WafInner>, id: String) -> Self {
        let policy = TransactionPolicy::from(&waf.config);
        let started = Utc::now();
        let mut store = CollectionStore::new();
        store.set_value(VariableName::UniqueId, id.as_str());
        store.set_value(VariableName::Timestamp, started.timestamp().to_string());
        store.set_value(VariableName::Duration, "0");
        store.set_value(VariableName::InboundDataError, "0");
        store.set_value(VariableName::OutboundDataError, "0");

        let tmp_dir = waf.config.tmp_dir.clone();
        let request_body = BodyBuffer::new(policy.request_body_in_memory_limit, tmp_dir.clone());
        let response_body = BodyBuffer::new(policy.response_body_limit, tmp_dir);

        Self {
            waf,
            id: Arc::from(id),
            store,
            policy,
            matched: Vec::new(),
            intervention: None,
            allow: None,
            removals: RuntimeRemovals::default(),
            persistent: Vec::new(),
            phases_done: [false; 5],
            started,
            clock: Instant::now(),
            client: (String::new(), 0),
            server: (String::new(), 0),
            method: String::new(),
            uri: String::new(),
            protocol: String::new(),
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            response_status: None,
            request_body,
            response_body,
            request_body_full: false,
            response_body_full: false,
            request_body_processed: false,
            files: Vec::new(),
            request_body_no_files: None,
            logged: false,
        }
    }

    /// Transaction id, also exposed as `UNIQUE_ID`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Record the connection endpoints.
    pub fn process_connection(&mut self, client_ip: &str, client_port: u16, server_ip: &str, server_port: u16) {
        self.client = (client_ip.to_string(), client_port);
        self.server = (server_ip.to_string(), server_port);
        self.store.set_value(VariableName::RemoteAddr, client_ip);
        self.store.set_value(VariableName::RemoteHost, client_ip);
        self.store.set_value(VariableName::RemotePort, client_port.to_string());
        self.store.set_value(VariableName::ServerAddr, server_ip);
        self.store.set_value(VariableName::ServerPort, server_port.to_string());
    }

    /// Record the request line and parse the query string.
    pub fn process_uri(&mut self, method: &str, uri: &str, protocol: &str) {
        self.method = method.to_string();
        self.uri = uri.to_string();
        self.protocol = protocol.to_string();
        request::populate_uri(&mut self.store, method, uri, protocol, self.waf.config.argument_separator);
    }

    /// Record one request header.
    pub fn add_request_header(&mut self, name: &str, value: &str) {
        request::add_request_header(&mut self.store, name, value);
        self.request_headers.push((name.to_string(), value.to_string()));
    }

    /// Run phase 1.
    pub fn process_request_headers(&mut self) -> Option<Disruption> {
        self.run_phase(Phase::RequestHeaders);
        self.disruption()
    }

    /// Buffer a request body chunk. Returns the bytes kept and whether the
    /// body limit has been reached. With `Reject` the first chunk that
    /// crosses the limit interrupts with 413.
    pub fn write_request_body(&mut self, chunk: &[u8]) -> Result<(usize, bool)> {
        if !self.policy.request_body_access
            || self.policy.rule_engine == EngineMode::Off
            || self.intervention.is_some()
        {
            return Ok((0, false));
        }
        if self.request_body_full {
            return Ok((0, true));
        }

        let room = self.policy.request_body_limit.saturating_sub(self.request_body.size());
        if chunk.len() <= room {
            self.request_body.write(chunk)?;
            return Ok((chunk.len(), false));
        }

        self.request_body_full = true;
        if self.rejects(self.policy.request_body_limit_action) {
            self.interrupt_for_limit(Phase::RequestBody, 413, "request body limit exceeded");
            return Ok((0, true));
        }
        self.request_body.write(&chunk[..room])?;
        self.store.set_value(VariableName::InboundDataError, "1");
        tracing::debug!(tx = %self.id, limit = self.policy.request_body_limit, "request body truncated");
        Ok((room, true))
    }

    /// Run the body processor and phase 2.
    pub fn process_request_body(&mut self) -> Result<Option<Disruption>> {
        if !self.request_body_processed {
            self.request_body_processed = true;
            if self.policy.rule_engine != EngineMode::Off && self.intervention.is_none() {
                self.prepare_request_body()?;
            }
        }
        self.run_phase(Phase::RequestBody);
        Ok(self.disruption())
    }

    fn prepare_request_body(&mut self) -> Result<()> {
        let mut full_request = format!("{} {} {}\r\n", self.method, self.uri, self.protocol);
        for (name, value) in &self.request_headers {
            full_request.push_str(&format!("{}: {}\r\n", name, value));
        }
        full_request.push_str("\r\n");

        if self.policy.request_body_access {
            let body = self.request_body.bytes()?;
            let text = String::from_utf8_lossy(&body).into_owned();
            self.store.set_value(VariableName::RequestBodyLength, body.len().to_string());

            let content_type = self
                .store
                .value(VariableName::RequestContentType)
                .unwrap_or_default()
                .to_string();
            let kind = self
                .policy
                .body_processor
                .or_else(|| BodyProcessorKind::from_content_type(&content_type));
            if let Some(kind) = kind {
                let separator = self.waf.config.argument_separator;
                let out = bodyprocessors::process(kind, &body, &content_type, &mut self.store, separator);
                self.store.set_value(VariableName::ReqbodyProcessor, kind.as_str());
                match &out.error {
                    Some(message) => {
                        self.debug().warn(format_args!("request body processor failed: {}", message));
                        self.store.set_value(VariableName::ReqbodyError, "1");
                        self.store.set_value(VariableName::ReqbodyErrorMsg, message.as_str());
                    }
                    None => {
                        self.store.set_value(VariableName::ReqbodyError, "0");
                        self.store.set_value(VariableName::ReqbodyErrorMsg, "");
                    }
                }
                self.files = out.files;
                self.request_body_no_files = out.no_files_body;
            } else {
                self.store.set_value(VariableName::ReqbodyError, "0");
            }

            let without_files = self.request_body_no_files.as_ref().map_or(body.len(), String::len);
            if without_files > self.policy.request_body_no_files_limit {
                if self.rejects(self.policy.request_body_limit_action) {
                    self.interrupt_for_limit(Phase::RequestBody, 413, "request body no files limit exceeded");
                } else {
                    self.store.set_value(VariableName::InboundDataError, "1");
                }
            }

            full_request.push_str(&text);
            self.store.set_value(VariableName::RequestBody, text);
        }

        self.store
            .set_value(VariableName::FullRequestLength, full_request.len().to_string());
        self.store.set_value(VariableName::FullRequest, full_request);
        Ok(())
    }

    /// Record one response header.
    pub fn add_response_header(&mut self, name: &str, value: &str) {
        response::add_response_header(&mut self.store, name, value);
        self.response_headers.push((name.to_string(), value.to_string()));
    }

    /// Record the response status and run phase 3.
    pub fn process_response_headers(&mut self, status: u16, protocol: &str) -> Option<Disruption> {
        response::set_status(&mut self.store, status, protocol);
        self.response_status = Some((status, protocol.to_string()));
        self.run_phase(Phase::ResponseHeaders);
        self.disruption()
    }

    /// Buffer a response body chunk. Only bodies of the configured MIME
    /// types are kept. With `Reject` the first chunk that crosses the
    /// limit interrupts with 500.
    pub fn write_response_body(&mut self, chunk: &[u8]) -> Result<(usize, bool)> {
        if !self.policy.response_body_access
            || self.policy.rule_engine == EngineMode::Off
            || self.intervention.is_some()
            || !response::mime_allowed(&self.store, &self.waf.config.response_body_mime_types)
        {
            return Ok((0, false));
        }
        if self.response_body_full {
            return Ok((0, true));
        }

        let room = self.policy.response_body_limit.saturating_sub(self.response_body.size());
        if chunk.len() <= room {
            self.response_body.write(chunk)?;
            return Ok((chunk.len(), false));
        }

        self.response_body_full = true;
        if self.rejects(self.policy.response_body_limit_action) {
            self.interrupt_for_limit(Phase::ResponseBody, 500, "response body limit exceeded");
            return Ok((0, true));
        }
        self.response_body.write(&chunk[..room])?;
        self.store.set_value(VariableName::OutboundDataError, "1");
        Ok((room, true))
    }

    /// Run phase 4.
    pub fn process_response_body(&mut self) -> Result<Option<Disruption>> {
        if !self.phases_done[Phase::ResponseBody.index()] && self.response_body.size() > 0 {
            let body = self.response_body.string()?;
            self.store.set_value(VariableName::ResponseBody, body);
        }
        self.run_phase(Phase::ResponseBody);
        Ok(self.disruption())
    }

    /// Run phase 5, store changed persistent collections and produce the
    /// audit record when the transaction is relevant. Only the first call
    /// does anything.
    pub fn process_logging(&mut self) -> Option<AuditLog> {
        if self.logged {
            return None;
        }
        self.logged = true;
        self.run_phase(Phase::Logging);
        persistent::write_back(self);

        if !self.audit_relevant() {
            return None;
        }
        let log = self.audit_record();
        if let Some(writer) = &self.waf.audit {
            if let Err(e) = writer.write(&log) {
                tracing::error!(tx = %self.id, error = %e, "failed to write audit record");
            }
        }
        Some(log)
    }

    /// Finish the transaction: runs logging if the host did not, then
    /// releases the body buffers.
    pub fn close(&mut self) {
        if !self.logged {
            self.process_logging();
        }
        self.request_body.close();
        self.response_body.close();
    }

    /// The disruption the host must apply, if a rule or a body limit
    /// interrupted the transaction.
    pub fn is_interrupted(&self) -> Option<Disruption> {
        self.disruption()
    }

    /// The interruption, if any.
    pub fn intervention(&self) -> Option<&Intervention> {
        self.intervention.as_ref()
    }

    /// Matched rules in match order.
    pub fn matched_rules(&self) -> &[MatchedRule] {
        &self.matched
    }

    /// Current policy, including `ctl:` changes.
    pub fn policy(&self) -> &TransactionPolicy {
        &self.policy
    }

    /// First value of a variable, e.g. `variable("TX", Some("score"))`.
    pub fn variable(&self, name: &str, key: Option<&str>) -> Option<&str> {
        self.store.first(VariableName::from_name(name)?, key)
    }

    /// Every value of a collection.
    pub fn collection(&self, name: &str) -> Vec<(String, String)> {
        let Some(name) = VariableName::from_name(name) else {
            return Vec::new();
        };
        self.store.collection(name).map_or_else(Vec::new, |c| {
            c.iter()
                .flat_map(|(k, values)| values.iter().map(move |v| (k.to_string(), v.clone())))
                .collect()
        })
    }

    pub(crate) fn debug(&self) -> DebugScope<'_> {
        self.waf.debug.scope(self.policy.debug_log_level, &self.id)
    }

    pub(crate) fn disruption(&self) -> Option<Disruption> {
        self.intervention.as_ref().map(|i| i.disruption.clone())
    }

    /// Mark a persistent collection as changed.
    pub(crate) fn touch(&mut self, collection: VariableName) {
        if !collection.is_persistent() {
            return;
        }
        if let Some(record) = self.persistent.iter_mut().find(|p| p.collection == collection) {
            record.dirty = true;
            return;
        }
        self.debug()
            .warn(format_args!("{} changed without initcol; it will not be stored", collection));
    }

    pub(crate) fn elapsed_micros(&self) -> u128 {
        self.clock.elapsed().as_micros()
    }

    fn rejects(&self, action: BodyLimitAction) -> bool {
        action == BodyLimitAction::Reject && self.policy.rule_engine == EngineMode::On
    }

    fn interrupt_for_limit(&mut self, phase: Phase, status: u16, message: &str) {
        tracing::warn!(tx = %self.id, status, "{}", message);
        self.intervention = Some(Intervention {
            disruption: Disruption::Status(status),
            rule_id: None,
            phase,
            message: Some(message.to_string()),
        });
    }

    fn audit_relevant(&self) -> bool {
        match self.policy.audit_engine {
            AuditEngineMode::Off => false,
            AuditEngineMode::On => true,
            AuditEngineMode::RelevantOnly => {
                let status = self
                    .response_status
                    .as_ref()
                    .map(|(s, _)| *s)
                    .or_else(|| self.intervention.as_ref().map(Intervention::status));
                status.is_some_and(|s| self.waf.config.audit_log_relevant_status.is_match(&s.to_string()))
            }
        }
    }

    fn audit_record(&mut self) -> AuditLog {
        let request_body = if self.policy.request_body_access {
            self.request_body.string().ok()
        } else {
            None
        };
        let response_body = if self.response_body.size() > 0 {
            self.response_body.string().ok()
        } else {
            None
        };
        let config = &self.waf.config;
        let ctx = AuditContext {
            id: &self.id,
            started: self.started,
            elapsed: self.clock.elapsed(),
            client: (&self.client.0, self.client.1),
            server: (&self.server.0, self.server.1),
            sensor_id: config.sensor_id.as_deref(),
            method: &self.method,
            uri: &self.uri,
            protocol: &self.protocol,
            request_headers: &self.request_headers,
            request_body,
            request_body_no_files: self.request_body_no_files.clone(),
            files: &self.files,
            response_status: self.response_status.as_ref().map(|(s, p)| (*s, p.as_str())),
            response_headers: &self.response_headers,
            response_body,
            engine: self.policy.rule_engine,
            components: &config.component_signatures,
            matched: &self.matched,
            intervention: self.intervention.as_ref(),
        };
        AuditLog::build(ctx, self.policy.audit_log_parts)
    }
}
