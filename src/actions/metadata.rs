//! Descriptive rule actions.

use crate::macros::MacroString;
use crate::parser::MetadataAction;

/// Named `severity:` levels, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

const LEVELS: [(Severity, &str); 8] = [
    (Severity::Emergency, "EMERGENCY"),
    (Severity::Alert, "ALERT"),
    (Severity::Critical, "CRITICAL"),
    (Severity::Error, "ERROR"),
    (Severity::Warning, "WARNING"),
    (Severity::Notice, "NOTICE"),
    (Severity::Info, "INFO"),
    (Severity::Debug, "DEBUG"),
];

impl Severity {
    /// Parse either a level name (any case) or a digit 0-7.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Ok(n) = input.parse::<usize>() {
            return LEVELS.get(n).map(|(s, _)| *s);
        }
        LEVELS
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(input))
            .map(|(s, _)| *s)
    }

    /// Upper-case level name.
    pub fn name(&self) -> &'static str {
        LEVELS[*self as usize].1
    }
}

/// Descriptive actions of a rule.
#[derive(Debug, Clone, Default)]
pub struct RuleMetadata {
    /// `msg`, expanded when the rule matches.
    pub msg: Option<MacroString>,
    /// `logdata`, expanded when the rule matches.
    pub log_data: Option<MacroString>,
    /// Severity (0-7).
    pub severity: Option<u8>,
    /// Tags in declared order.
    pub tags: Vec<String>,
    /// Maturity level.
    pub maturity: Option<u8>,
    /// Accuracy level.
    pub accuracy: Option<u8>,
    /// Revision.
    pub rev: Option<String>,
    /// Version.
    pub ver: Option<String>,
}

impl RuleMetadata {
    /// Record a metadata action. The id goes to `id`; phase is read from
    /// the rule source.
    pub(crate) fn apply(&mut self, action: &MetadataAction, id: &mut u64) {
        match action {
            MetadataAction::Id(value) => *id = *value,
            MetadataAction::Phase(_) => {}
            MetadataAction::Msg(msg) => self.msg = Some(msg.clone()),
            MetadataAction::Tag(tag) => self.tags.push(tag.clone()),
            MetadataAction::Severity(sev) => self.severity = Some(*sev),
            MetadataAction::Rev(rev) => self.rev = Some(rev.clone()),
            MetadataAction::Ver(ver) => self.ver = Some(ver.clone()),
            MetadataAction::Maturity(m) => self.maturity = Some(*m),
            MetadataAction::Accuracy(a) => self.accuracy = Some(*a),
        }
    }

    /// Whether the rule carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_actions;
    use crate::parser::Action;

    #[test]
    fn test_severity_names_and_digits() {
        assert_eq!(Severity::parse("critical"), Some(Severity::Critical));
        assert_eq!(Severity::parse(" 4 "), Some(Severity::Warning));
        assert_eq!(Severity::parse("8"), None);
        assert_eq!(Severity::parse("LOUD"), None);
        assert_eq!(Severity::Notice.name(), "NOTICE");
        assert!(Severity::Alert < Severity::Info);
    }

    #[test]
    fn test_apply_collects_metadata() {
        let mut meta = RuleMetadata::default();
        let mut id = 0;
        for action in parse_actions("id:942100,msg:'SQL Injection Attack',severity:2,tag:attack-sqli,tag:OWASP_CRS")
            .unwrap()
        {
            if let Action::Metadata(m) = action {
                meta.apply(&m, &mut id);
            }
        }
        assert_eq!(id, 942100);
        assert!(meta.has_tag("OWASP_CRS"));
        assert!(!meta.has_tag("attack"));
        assert_eq!(meta.severity, Some(2));
        assert_eq!(meta.tags, vec!["attack-sqli", "OWASP_CRS"]);
        assert_eq!(meta.msg.as_ref().map(|m| m.to_string()).as_deref(), Some("SQL Injection Attack"));
    }
}
