//! WAF instances and transaction processing.
//!
//! A [`Waf`] owns a loaded rule group and its configuration. It is cheap to
//! clone and safe to share between threads; every request gets its own
//! [`Transaction`].

mod config;
mod intervention;
mod phase;
mod rule;
mod ruleset;
mod scheduler;
mod transaction;

pub use config::{BodyLimitAction, EngineMode, TransactionPolicy, WafConfig, DEFAULT_RELEVANT_STATUS};
pub use intervention::{Disruption, Intervention, MatchedRule};
pub use phase::Phase;
pub use rule::Rule;
pub use ruleset::{build, RuleEntry, RuleGroup};
pub use transaction::Transaction;

use crate::audit::{AuditWriter, SerialAuditWriter};
use crate::debuglog::DebugLogger;
use crate::error::Result;
use crate::operators::{CidrGeoDatabase, GeoDatabase};
use crate::parser::{Directive, Parser};
use crate::persistence::{FilePersistence, InMemoryPersistence, PersistenceEngine};
use std::path::Path;
use std::sync::Arc;

/// State shared by every transaction of a WAF instance.
pub(crate) struct WafInner {
    pub rules: Arc<RuleGroup>,
    pub config: WafConfig,
    pub persistence: Arc<dyn PersistenceEngine>,
    pub audit: Option<Arc<dyn AuditWriter>>,
    pub debug: Arc<DebugLogger>,
    pub geo: Option<Arc<dyn GeoDatabase>>,
}

/// A loaded rule set with its configuration.
#[derive(Clone)]
pub struct Waf {
    inner: Arc<WafInner>,
}

impl Waf {
    /// Load rules from a string. Relative `Include` paths resolve against
    /// the current directory.
    pub fn from_string(rules: &str) -> Result<Self> {
        let mut parser = Parser::new();
        parser.parse(rules)?;
        Self::from_directives(parser.into_directives())
    }

    /// Load rules from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut parser = Parser::new();
        parser.parse_file(path.as_ref())?;
        Self::from_directives(parser.into_directives())
    }

    /// Load every file matching a glob pattern, in sorted order.
    pub fn from_glob(pattern: &str) -> Result<Self> {
        let mut parser = Parser::new();
        parser.parse_glob(pattern)?;
        Self::from_directives(parser.into_directives())
    }

    /// Build from parsed directives. Opens the data directory, audit log,
    /// debug log and geo database the configuration names.
    pub fn from_directives(directives: Vec<Directive>) -> Result<Self> {
        let (rules, config) = build(directives)?;

        let persistence: Arc<dyn PersistenceEngine> = match &config.data_dir {
            Some(dir) => Arc::new(FilePersistence::new(dir)?),
            None => Arc::new(InMemoryPersistence::new()),
        };
        let audit: Option<Arc<dyn AuditWriter>> = match &config.audit_log {
            Some(path) => Some(Arc::new(SerialAuditWriter::open(path, config.audit_log_format)?)),
            None => None,
        };
        let debug = match &config.debug_log {
            Some(path) => DebugLogger::with_file(path)?,
            None => DebugLogger::new(),
        };
        let geo: Option<Arc<dyn GeoDatabase>> = match &config.geo_lookup_db {
            Some(path) => Some(Arc::new(CidrGeoDatabase::open(path)?)),
            None => None,
        };

        tracing::info!(
            rules = rules.rule_count(),
            engine = config.rule_engine.as_str(),
            "rule set loaded"
        );
        Ok(Self {
            inner: Arc::new(WafInner {
                rules: Arc::new(rules),
                config,
                persistence,
                audit,
                debug: Arc::new(debug),
                geo,
            }),
        })
    }

    /// Replace the persistence adapter.
    pub fn with_persistence(self, persistence: Arc<dyn PersistenceEngine>) -> Self {
        self.rebuild(|inner| inner.persistence = persistence)
    }

    /// Replace the audit writer.
    pub fn with_audit_writer(self, writer: Arc<dyn AuditWriter>) -> Self {
        self.rebuild(|inner| inner.audit = Some(writer))
    }

    /// Replace the geo database used by `@geoLookup`.
    pub fn with_geo_database(self, geo: Arc<dyn GeoDatabase>) -> Self {
        self.rebuild(|inner| inner.geo = Some(geo))
    }

    fn rebuild(self, change: impl FnOnce(&mut WafInner)) -> Self {
        let current = &self.inner;
        let mut inner = WafInner {
            rules: Arc::clone(&current.rules),
            config: current.config.clone(),
            persistence: Arc::clone(&current.persistence),
            audit: current.audit.clone(),
            debug: Arc::clone(&current.debug),
            geo: current.geo.clone(),
        };
        change(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Start a transaction with a generated id.
    pub fn new_transaction(&self) -> Transaction {
        self.new_transaction_with_id(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Start a transaction with a host-supplied id.
    pub fn new_transaction_with_id(&self, id: impl Into<String>) -> Transaction {
        Transaction::new(Arc::clone(&self.inner), id.into())
    }

    /// The loaded rules.
    pub fn rules(&self) -> &RuleGroup {
        &self.inner.rules
    }

    /// The configuration the directives produced.
    pub fn config(&self) -> &WafConfig {
        &self.inner.config
    }

    /// Number of rules; a chain counts once.
    pub fn rule_count(&self) -> usize {
        self.inner.rules.rule_count()
    }
}

impl std::fmt::Debug for Waf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waf")
            .field("rule_count", &self.rule_count())
            .field("rule_engine", &self.inner.config.rule_engine)
            .field("audit", &self.inner.audit.is_some())
            .finish()
    }
}
