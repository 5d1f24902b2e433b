//! Error types for zentinel-waf.

use std::path::PathBuf;
use thiserror::Error;

/// Shorthand for results carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building or driving a [`crate::Waf`].
///
/// Everything except [`Error::Body`] is raised while loading a rule set; rule
/// evaluation itself never fails a transaction.
#[derive(Debug, Error)]
pub enum Error {
    /// A directive could not be parsed.
    #[error("parse error at {location}: {message}")]
    Parse {
        /// What was wrong.
        message: String,
        /// `file:line`, or `line N` for inline rules.
        location: String,
        /// The joined directive text.
        source_text: Option<String>,
    },

    /// A rule file, data file or body file could not be read.
    #[error("failed to load file {path}: {source}")]
    RuleFileLoad {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// `@rx` or a regex target key did not compile.
    #[error("invalid regex pattern '{pattern}': {source}")]
    RegexCompile {
        /// Offending pattern.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// `@pm` phrase list could not be built.
    #[error("invalid pattern set: {message}")]
    PatternSet {
        /// Details.
        message: String,
    },

    /// `@ipMatch` entry that is neither an address nor a CIDR block.
    #[error("invalid IP address or network '{value}': {message}")]
    InvalidIp {
        /// Offending entry.
        value: String,
        /// Details.
        message: String,
    },

    /// Target names no known collection.
    #[error("unknown variable: {name}")]
    UnknownVariable {
        /// Name as written.
        name: String,
    },

    /// `@name` is not a known operator.
    #[error("unknown operator: @{name}")]
    UnknownOperator {
        /// Name as written.
        name: String,
    },

    /// `t:name` is not a known transformation.
    #[error("unknown transformation: t:{name}")]
    UnknownTransformation {
        /// Name as written.
        name: String,
    },

    /// Action list contains an unknown action.
    #[error("unknown action: {name}")]
    UnknownAction {
        /// Name as written.
        name: String,
    },

    /// Line starts with an unknown `Sec*` directive.
    #[error("unknown directive: {name}")]
    UnknownDirective {
        /// Name as written.
        name: String,
    },

    /// Action argument is missing or malformed.
    #[error("invalid argument for action '{action}': {message}")]
    InvalidActionArgument {
        /// Action name.
        action: String,
        /// Details.
        message: String,
    },

    /// Directive argument is missing or malformed.
    #[error("invalid argument for directive '{directive}': {message}")]
    InvalidDirectiveArgument {
        /// Directive name.
        directive: String,
        /// Details.
        message: String,
    },

    /// A chain head has no `id:`.
    #[error("rule is missing required 'id' action")]
    MissingRuleId,

    /// Two rules share an `id:`.
    #[error("duplicate rule id: {id}")]
    DuplicateRuleId {
        /// Repeated id.
        id: u64,
    },

    /// The last rule in the set still has `chain`.
    #[error("incomplete rule chain: chain action without following rule")]
    IncompleteChain,

    /// Malformed macro in an action argument or operator parameter.
    #[error("invalid macro '{text}': {message}")]
    Macro {
        /// The macro text.
        text: String,
        /// Details.
        message: String,
    },

    /// I/O error while buffering a request or response body.
    #[error("body buffer error: {source}")]
    Body {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Persistence backend failure.
    #[error("persistence error: {message}")]
    Persistence {
        /// Details.
        message: String,
    },

    /// Audit log sink failure.
    #[error("audit log error: {message}")]
    AuditLog {
        /// Details.
        message: String,
    },

    /// Inconsistent configuration.
    #[error("configuration error: {message}")]
    Config {
        /// Details.
        message: String,
    },
}

impl Error {
    /// Parse error at `location`.
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            location: location.into(),
            source_text: None,
        }
    }

    /// Parse error at `location` carrying the directive text.
    pub fn parse_with_source(
        message: impl Into<String>,
        location: impl Into<String>,
        source_text: impl Into<String>,
    ) -> Self {
        Self::Parse {
            message: message.into(),
            location: location.into(),
            source_text: Some(source_text.into()),
        }
    }

    /// Wrap a load-time error with the location of the directive that raised it.
    ///
    /// Errors that already carry a location are returned unchanged so the
    /// innermost (included) file wins; parse errors raised without one pick
    /// up `location`.
    pub fn at(self, location: &SourceLocation, source_text: &str) -> Self {
        match self {
            Self::Parse {
                message, location: l, ..
            } if l.is_empty() => Self::parse_with_source(message, location.to_string(), source_text),
            Self::Parse { .. } => self,
            other => Self::parse_with_source(other.to_string(), location.to_string(), source_text),
        }
    }

    pub(crate) fn invalid_action(action: &str, message: impl Into<String>) -> Self {
        Self::InvalidActionArgument {
            action: action.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_directive(directive: &str, message: impl Into<String>) -> Self {
        Self::InvalidDirectiveArgument {
            directive: directive.to_string(),
            message: message.into(),
        }
    }
}

/// Where a directive came from.
#[derive(Debug, Clone, Default)]
pub struct SourceLocation {
    /// `None` for rules loaded from a string.
    pub file: Option<PathBuf>,
    /// Line number (1-indexed) of the first physical line of the directive.
    pub line: usize,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:{}", file.display(), self.line)
        } else {
            write!(f, "line {}", self.line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let loc = SourceLocation {
            file: Some(PathBuf::from("rules/main.conf")),
            line: 12,
        };
        assert_eq!(loc.to_string(), "rules/main.conf:12");

        let inline = SourceLocation { file: None, line: 3 };
        assert_eq!(inline.to_string(), "line 3");
    }

    #[test]
    fn test_error_at_keeps_innermost_location() {
        let loc = SourceLocation { file: None, line: 7 };
        let err = Error::UnknownAction { name: "bogus".into() }.at(&loc, "SecAction bogus");
        match &err {
            Error::Parse { location, message, .. } => {
                assert_eq!(location, "line 7");
                assert!(message.contains("bogus"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let outer = SourceLocation { file: None, line: 99 };
        match err.at(&outer, "Include x.conf") {
            Error::Parse { location, .. } => assert_eq!(location, "line 7"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
