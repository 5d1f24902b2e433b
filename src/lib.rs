//! # zentinel-waf
//!
//! Pure Rust web application firewall engine that loads ModSecurity rule
//! files (including the OWASP CRS) and evaluates HTTP transactions against
//! them.
//!
//! ## Features
//!
//! - SecRule language: rules, chains, markers, defaults, removals and updates
//! - Variables, transformations, operators and actions of the rule language
//! - Persistent collections (`SESSION`, `IP`, `GLOBAL`, `USER`, `RESOURCE`)
//! - URL-encoded, multipart, JSON and XML request body processors
//! - JSON and native audit logs
//! - Pure Rust libinjection for `@detectSQLi` and `@detectXSS`
//!
//! ## Quick Start
//!
//! ```ignore
//! use zentinel_waf::Waf;
//!
//! let waf = Waf::from_string(r#"
//!     SecRuleEngine On
//!     SecRule ARGS "@contains evil" "id:1,phase:1,deny,status:403"
//! "#)?;
//!
//! let mut tx = waf.new_transaction();
//! tx.process_connection("192.0.2.7", 51234, "10.0.0.1", 443);
//! tx.process_uri("GET", "/search?q=evil", "HTTP/1.1");
//! tx.add_request_header("Host", "example.com");
//!
//! if let Some(disruption) = tx.process_request_headers() {
//!     println!("blocked with {}", disruption.status());
//! }
//! tx.close();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod actions;
pub mod audit;
pub mod body;
pub mod bodyprocessors;
pub mod debuglog;
pub mod engine;
pub mod error;
pub mod libinjection;
pub mod macros;
pub mod operators;
pub mod parser;
pub mod persistence;
pub mod transformations;
pub mod variables;

// Re-export main types at crate root
pub use audit::{AuditLog, AuditWriter};
pub use engine::{Disruption, EngineMode, Intervention, MatchedRule, Phase, Transaction, Waf, WafConfig};
pub use error::{Error, Result};
pub use persistence::PersistenceEngine;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
