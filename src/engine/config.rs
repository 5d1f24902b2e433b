//! Engine configuration set by directives.

use crate::audit::{AuditEngineMode, AuditLogFormat, AuditLogParts};
use crate::bodyprocessors::BodyProcessorKind;
use crate::parser::ConfigDirective;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

/// `4xx` except 404, and every `5xx`. Written without lookahead because the
/// regex crate does not support it.
pub const DEFAULT_RELEVANT_STATUS: &str = "^(?:5|4(?:$|[^0]|0$|0[^4]))";

static RELEVANT_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_RELEVANT_STATUS).expect("default relevant status regex is valid"));

/// Rule engine operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    /// Rules run and disruptive actions take effect.
    #[default]
    On,
    /// Rules are not evaluated.
    Off,
    /// Rules run and matches are recorded, but nothing is interrupted.
    DetectionOnly,
}

impl EngineMode {
    /// Parse `On`, `Off` or `DetectionOnly`, ignoring case.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            "detectiononly" => Some(Self::DetectionOnly),
            _ => None,
        }
    }

    /// Directive spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "On",
            Self::Off => "Off",
            Self::DetectionOnly => "DetectionOnly",
        }
    }
}

/// What to do when a body exceeds its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyLimitAction {
    /// Interrupt the transaction (413 for requests, 500 for responses).
    #[default]
    Reject,
    /// Keep the first `limit` bytes and flag the truncation.
    ProcessPartial,
}

impl BodyLimitAction {
    /// Parse `Reject` or `ProcessPartial`, ignoring case.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "processpartial" => Some(Self::ProcessPartial),
            _ => None,
        }
    }
}

/// Configuration of a WAF instance, built from configuration directives.
#[derive(Debug, Clone)]
pub struct WafConfig {
    /// `SecRuleEngine`
    pub rule_engine: EngineMode,
    /// `SecRequestBodyAccess`
    pub request_body_access: bool,
    /// `SecRequestBodyLimit`
    pub request_body_limit: usize,
    /// `SecRequestBodyNoFilesLimit`
    pub request_body_no_files_limit: usize,
    /// `SecRequestBodyInMemoryLimit`
    pub request_body_in_memory_limit: usize,
    /// `SecRequestBodyLimitAction`
    pub request_body_limit_action: BodyLimitAction,
    /// `SecResponseBodyAccess`
    pub response_body_access: bool,
    /// `SecResponseBodyLimit`
    pub response_body_limit: usize,
    /// `SecResponseBodyLimitAction`
    pub response_body_limit_action: BodyLimitAction,
    /// `SecResponseBodyMimeType`, lower case.
    pub response_body_mime_types: Vec<String>,
    /// `SecAuditEngine`
    pub audit_engine: AuditEngineMode,
    /// `SecAuditLog`
    pub audit_log: Option<PathBuf>,
    /// `SecAuditLogParts`
    pub audit_log_parts: AuditLogParts,
    /// `SecAuditLogRelevantStatus`
    pub audit_log_relevant_status: Regex,
    /// `SecAuditLogFormat`
    pub audit_log_format: AuditLogFormat,
    /// `SecDebugLog`
    pub debug_log: Option<PathBuf>,
    /// `SecDebugLogLevel`
    pub debug_log_level: u8,
    /// `SecTmpDir`: where body spill files go.
    pub tmp_dir: Option<PathBuf>,
    /// `SecUploadDir`
    pub upload_dir: Option<PathBuf>,
    /// `SecDataDir`: where [`FilePersistence`](crate::persistence::FilePersistence) keeps records.
    pub data_dir: Option<PathBuf>,
    /// `SecGeoLookupDb`
    pub geo_lookup_db: Option<PathBuf>,
    /// `SecSensorId`
    pub sensor_id: Option<String>,
    /// `SecComponentSignature`, in order.
    pub component_signatures: Vec<String>,
    /// `SecWebAppId`: partitions persistent collections.
    pub web_app_id: String,
    /// `SecArgumentSeparator`
    pub argument_separator: char,
    /// `SecPcreMatchLimit`. Recorded only; the regex engine has no
    /// backtracking limit to apply it to.
    pub pcre_match_limit: Option<u64>,
    /// `SecPcreMatchLimitRecursion`. Recorded only.
    pub pcre_match_limit_recursion: Option<u64>,
    /// `SecCollectionTimeout`, seconds.
    pub collection_timeout: u64,
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            rule_engine: EngineMode::On,
            request_body_access: false,
            request_body_limit: 13_107_200,
            request_body_no_files_limit: 1_048_576,
            request_body_in_memory_limit: 131_072,
            request_body_limit_action: BodyLimitAction::Reject,
            response_body_access: false,
            response_body_limit: 524_288,
            response_body_limit_action: BodyLimitAction::Reject,
            response_body_mime_types: vec!["text/plain".to_string(), "text/html".to_string()],
            audit_engine: AuditEngineMode::Off,
            audit_log: None,
            audit_log_parts: AuditLogParts::default(),
            audit_log_relevant_status: RELEVANT_STATUS.clone(),
            audit_log_format: AuditLogFormat::Json,
            debug_log: None,
            debug_log_level: 0,
            tmp_dir: None,
            upload_dir: None,
            data_dir: None,
            geo_lookup_db: None,
            sensor_id: None,
            component_signatures: Vec::new(),
            web_app_id: "default".to_string(),
            argument_separator: '&',
            pcre_match_limit: None,
            pcre_match_limit_recursion: None,
            collection_timeout: 3600,
        }
    }
}

impl WafConfig {
    /// Apply one configuration directive. Later directives override earlier
    /// ones, except the MIME type list which accumulates.
    pub fn apply(&mut self, directive: ConfigDirective) {
        use ConfigDirective as C;
        match directive {
            C::RuleEngine(mode) => self.rule_engine = mode,
            C::RequestBodyAccess(on) => self.request_body_access = on,
            C::RequestBodyLimit(n) => self.request_body_limit = n,
            C::RequestBodyNoFilesLimit(n) => self.request_body_no_files_limit = n,
            C::RequestBodyInMemoryLimit(n) => self.request_body_in_memory_limit = n,
            C::RequestBodyLimitAction(action) => self.request_body_limit_action = action,
            C::ResponseBodyAccess(on) => self.response_body_access = on,
            C::ResponseBodyLimit(n) => self.response_body_limit = n,
            C::ResponseBodyLimitAction(action) => self.response_body_limit_action = action,
            C::ResponseBodyMimeType(types) => {
                for t in types {
                    if !self.response_body_mime_types.contains(&t) {
                        self.response_body_mime_types.push(t);
                    }
                }
            }
            C::ResponseBodyMimeTypesClear => self.response_body_mime_types.clear(),
            C::AuditEngine(mode) => self.audit_engine = mode,
            C::AuditLog(path) => self.audit_log = Some(path),
            C::AuditLogParts(parts) => self.audit_log_parts = parts,
            C::AuditLogRelevantStatus(regex) => self.audit_log_relevant_status = regex,
            C::AuditLogFormat(format) => self.audit_log_format = format,
            C::DebugLog(path) => self.debug_log = Some(path),
            C::DebugLogLevel(level) => self.debug_log_level = level,
            C::TmpDir(path) => self.tmp_dir = Some(path),
            C::UploadDir(path) => self.upload_dir = Some(path),
            C::DataDir(path) => self.data_dir = Some(path),
            C::GeoLookupDb(path) => self.geo_lookup_db = Some(path),
            C::SensorId(id) => self.sensor_id = Some(id),
            C::ComponentSignature(sig) => self.component_signatures.push(sig),
            C::WebAppId(id) => self.web_app_id = id,
            C::ArgumentSeparator(c) => self.argument_separator = c,
            C::PcreMatchLimit(n) => self.pcre_match_limit = Some(n),
            C::PcreMatchLimitRecursion(n) => self.pcre_match_limit_recursion = Some(n),
            C::CollectionTimeout(n) => self.collection_timeout = n,
        }
    }
}

/// The part of [`WafConfig`] a transaction may change through `ctl:`.
#[derive(Debug, Clone)]
pub struct TransactionPolicy {
    /// Rule engine mode.
    pub rule_engine: EngineMode,
    /// Whether the request body is buffered and processed.
    pub request_body_access: bool,
    /// Whether the response body is buffered and inspected.
    pub response_body_access: bool,
    /// Request body limit in bytes.
    pub request_body_limit: usize,
    /// Request body limit excluding uploaded files.
    pub request_body_no_files_limit: usize,
    /// In-memory part of a body buffer.
    pub request_body_in_memory_limit: usize,
    /// Action when the request body limit is crossed.
    pub request_body_limit_action: BodyLimitAction,
    /// Response body limit in bytes.
    pub response_body_limit: usize,
    /// Action when the response body limit is crossed.
    pub response_body_limit_action: BodyLimitAction,
    /// Audit engine mode.
    pub audit_engine: AuditEngineMode,
    /// Audit parts.
    pub audit_log_parts: AuditLogParts,
    /// Debug log level.
    pub debug_log_level: u8,
    /// Body processor forced with `ctl:requestBodyProcessor`.
    pub body_processor: Option<BodyProcessorKind>,
    /// `ctl:forceRequestBodyVariable`
    pub force_request_body_variable: bool,
}

impl From<&WafConfig> for TransactionPolicy {
    fn from(config: &WafConfig) -> Self {
        Self {
            rule_engine: config.rule_engine,
            request_body_access: config.request_body_access,
            response_body_access: config.response_body_access,
            request_body_limit: config.request_body_limit,
            request_body_no_files_limit: config.request_body_no_files_limit,
            request_body_in_memory_limit: config.request_body_in_memory_limit,
            request_body_limit_action: config.request_body_limit_action,
            response_body_limit: config.response_body_limit,
            response_body_limit_action: config.response_body_limit_action,
            audit_engine: config.audit_engine,
            audit_log_parts: config.audit_log_parts,
            debug_log_level: config.debug_log_level,
            body_processor: None,
            force_request_body_variable: false,
        }
    }
}
