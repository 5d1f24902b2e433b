//! Rule-language parser.
//!
//! This module turns configuration text into a flat list of [`Directive`]s:
//! - SecRule / SecAction: rules, with their operators compiled
//! - SecMarker: named markers for skipAfter
//! - SecDefaultAction and the SecRuleRemove* / SecRuleUpdate* family
//! - Engine configuration directives (SecRuleEngine, SecAuditLog, ...)
//! - Include: file inclusion, expanded in place
//!
//! ## SecRule Syntax
//!
//! ```text
//! SecRule VARIABLES "OPERATOR" "ACTIONS"
//! ```
//!
//! Where:
//! - VARIABLES: Pipe-separated list of variables to inspect
//! - OPERATOR: Pattern to match (e.g., @rx, @contains); a bare pattern is @rx
//! - ACTIONS: Comma-separated list of actions (e.g., id:1,deny,log)
//!
//! Defaults, chains and removals are resolved later when the rule group is
//! built; the parser only checks each directive in isolation.

mod action;
mod directive;
mod lexer;
mod operator;
mod variable;

pub use action::{
    parse_actions, parse_id_ranges, parse_phase, parse_single_action, Action, AllowScope, Ctl,
    DataAction, DisruptiveAction, FlowAction, MetadataAction, NonDisruptiveAction, RuleIdRange,
    SetVar, SetVarOp,
};
pub use directive::{ConfigDirective, Directive, DirectiveKind, SecRule};
pub use lexer::{tokenize, Lexer, LogicalLine, Token};
pub use operator::{parse_operator, OperatorName, OperatorSpec};
pub use variable::{
    apply_exclusions, parse_target, parse_variable_list, parse_variables, VariableList,
    VariableSelector,
};

use crate::audit::{AuditEngineMode, AuditLogFormat, AuditLogParts};
use crate::engine::{BodyLimitAction, EngineMode};
use crate::error::{Error, Result, SourceLocation};
use crate::operators::compile_operator;
use std::path::{Path, PathBuf};

/// Nesting limit for `Include`.
const MAX_INCLUDE_DEPTH: usize = 100;

/// Parser for rule-language configuration.
pub struct Parser {
    /// Parsed directives, includes expanded.
    directives: Vec<Directive>,
    /// Directory relative paths resolve against when parsing inline text.
    root: PathBuf,
    /// Current `Include` nesting.
    depth: usize,
}

impl Parser {
    /// Create a new parser rooted at the current directory.
    pub fn new() -> Self {
        Self::with_root(".")
    }

    /// Create a parser whose inline text resolves relative paths against
    /// `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            directives: Vec::new(),
            root: root.into(),
            depth: 0,
        }
    }

    /// Parse a configuration string.
    pub fn parse(&mut self, input: &str) -> Result<()> {
        self.parse_with_location(input, None)
    }

    /// Parse a configuration string with file location.
    pub fn parse_with_location(&mut self, input: &str, file: Option<&Path>) -> Result<()> {
        let base = match file.and_then(Path::parent) {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            Some(_) => PathBuf::from("."),
            None => self.root.clone(),
        };
        let included = self.depth > 0;

        for line in Lexer::new(input) {
            let location = SourceLocation {
                file: file.map(Path::to_path_buf),
                line: line.line,
            };
            let tokens = tokenize(&line.text).map_err(|e| e.at(&location, &line.text))?;
            let Some(name) = tokens.first() else {
                continue;
            };

            if name.text.eq_ignore_ascii_case("include") {
                let pattern = argument(&tokens, 1, "Include").map_err(|e| e.at(&location, &line.text))?;
                self.include(pattern, &base)
                    .map_err(|e| e.at(&location, &line.text))?;
                continue;
            }

            let kind = parse_directive(&name.text, &tokens[1..], &base)
                .map_err(|e| e.at(&location, &line.text))?;
            if let Some(kind) = kind {
                self.directives.push(Directive {
                    kind,
                    location,
                    text: line.text,
                    included,
                });
            }
        }

        Ok(())
    }

    /// Parse a configuration file.
    pub fn parse_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::RuleFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(file = %path.display(), "parsing rules file");
        self.parse_with_location(&content, Some(path))
    }

    /// Parse every file matching a glob pattern, in sorted order. A pattern
    /// that matches nothing is an error.
    pub fn parse_glob(&mut self, pattern: &str) -> Result<()> {
        let paths = glob::glob(pattern)
            .map_err(|e| Error::parse(format!("invalid glob pattern: {}", e), pattern))?;

        let mut files = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "error reading glob entry");
                }
            }
        }
        if files.is_empty() {
            return Err(Error::RuleFileLoad {
                path: PathBuf::from(pattern),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no file matches"),
            });
        }
        files.sort();

        for path in files {
            self.parse_file(&path)?;
        }
        Ok(())
    }

    /// Get the parsed directives.
    pub fn into_directives(self) -> Vec<Directive> {
        self.directives
    }

    /// Get a reference to the parsed directives.
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    fn include(&mut self, pattern: &str, base: &Path) -> Result<()> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(Error::invalid_directive(
                "Include",
                format!("nesting deeper than {} levels", MAX_INCLUDE_DEPTH),
            ));
        }
        let resolved = resolve(base, pattern);
        let resolved = resolved.to_string_lossy();

        self.depth += 1;
        let result = if resolved.contains(['*', '?', '[']) {
            self.parse_glob(&resolved)
        } else {
            self.parse_file(Path::new(resolved.as_ref()))
        };
        self.depth -= 1;
        result
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn argument<'t>(tokens: &'t [Token], index: usize, directive: &str) -> Result<&'t str> {
    tokens
        .get(index)
        .map(|t| t.text.as_str())
        .ok_or_else(|| Error::invalid_directive(directive, "missing argument"))
}

/// Exactly one argument.
fn single<'t>(args: &'t [Token], directive: &str) -> Result<&'t str> {
    match args {
        [one] => Ok(one.text.as_str()),
        [] => Err(Error::invalid_directive(directive, "missing argument")),
        _ => Err(Error::invalid_directive(directive, "too many arguments")),
    }
}

fn on_off(args: &[Token], directive: &str) -> Result<bool> {
    let value = single(args, directive)?;
    if value.eq_ignore_ascii_case("on") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("off") {
        Ok(false)
    } else {
        Err(Error::invalid_directive(
            directive,
            format!("invalid value '{}' (expected On/Off)", value),
        ))
    }
}

fn number<T: std::str::FromStr>(args: &[Token], directive: &str) -> Result<T> {
    let value = single(args, directive)?;
    value
        .parse()
        .map_err(|_| Error::invalid_directive(directive, format!("invalid number '{}'", value)))
}

fn limit_action(args: &[Token], directive: &str) -> Result<BodyLimitAction> {
    let value = single(args, directive)?;
    BodyLimitAction::from_name(value)
        .ok_or_else(|| Error::invalid_directive(directive, format!("invalid limit action '{}'", value)))
}

/// Parse one directive. `args` excludes the directive name. Returns `None`
/// for directives that only need validating.
fn parse_directive(name: &str, args: &[Token], base: &Path) -> Result<Option<DirectiveKind>> {
    use ConfigDirective as C;

    let kind = match name.to_ascii_lowercase().as_str() {
        "secrule" => DirectiveKind::Rule(parse_secrule(args, base)?),
        "secaction" => DirectiveKind::Action(match args {
            [] => Vec::new(),
            [actions] => parse_actions(&actions.text)?,
            _ => return Err(Error::invalid_directive("SecAction", "too many arguments")),
        }),
        "secmarker" => DirectiveKind::Marker(single(args, "SecMarker")?.to_string()),
        "secdefaultaction" => {
            let actions = parse_actions(single(args, "SecDefaultAction")?)?;
            if !actions
                .iter()
                .any(|a| matches!(a, Action::Metadata(MetadataAction::Phase(_))))
            {
                return Err(Error::invalid_directive("SecDefaultAction", "a phase is required"));
            }
            DirectiveKind::DefaultAction(actions)
        }
        "secruleremovebyid" => {
            let joined: Vec<&str> = args.iter().map(|t| t.text.as_str()).collect();
            if joined.is_empty() {
                return Err(Error::invalid_directive("SecRuleRemoveById", "missing argument"));
            }
            DirectiveKind::RemoveById(parse_id_ranges(&joined.join(" "))?)
        }
        "secruleremovebymsg" => DirectiveKind::RemoveByMsg(single(args, "SecRuleRemoveByMsg")?.to_string()),
        "secruleremovebytag" => DirectiveKind::RemoveByTag(single(args, "SecRuleRemoveByTag")?.to_string()),
        "secruleupdateactionbyid" => {
            let [id, actions] = args else {
                return Err(Error::invalid_directive(
                    "SecRuleUpdateActionById",
                    "expected a rule id and an action list",
                ));
            };
            let id = id.text.parse().map_err(|_| {
                Error::invalid_directive("SecRuleUpdateActionById", format!("invalid rule id '{}'", id.text))
            })?;
            DirectiveKind::UpdateActionById {
                id,
                actions: parse_actions(&actions.text)?,
            }
        }
        "secruleupdatetargetbyid" => {
            let (first, targets) = update_target_args(args, "SecRuleUpdateTargetById")?;
            DirectiveKind::UpdateTargetById {
                ids: parse_id_ranges(first)?,
                targets,
            }
        }
        "secruleupdatetargetbytag" => {
            let (tag, targets) = update_target_args(args, "SecRuleUpdateTargetByTag")?;
            DirectiveKind::UpdateTargetByTag {
                tag: tag.to_string(),
                targets,
            }
        }
        "secruleupdatetargetbymsg" => {
            let (msg, targets) = update_target_args(args, "SecRuleUpdateTargetByMsg")?;
            DirectiveKind::UpdateTargetByMsg {
                msg: msg.to_string(),
                targets,
            }
        }

        "secruleengine" => {
            let value = single(args, "SecRuleEngine")?;
            DirectiveKind::Config(C::RuleEngine(EngineMode::from_name(value).ok_or_else(|| {
                Error::invalid_directive("SecRuleEngine", format!("invalid mode '{}'", value))
            })?))
        }
        "secrequestbodyaccess" => DirectiveKind::Config(C::RequestBodyAccess(on_off(args, "SecRequestBodyAccess")?)),
        "secrequestbodylimit" => DirectiveKind::Config(C::RequestBodyLimit(number(args, "SecRequestBodyLimit")?)),
        "secrequestbodynofileslimit" => {
            DirectiveKind::Config(C::RequestBodyNoFilesLimit(number(args, "SecRequestBodyNoFilesLimit")?))
        }
        "secrequestbodyinmemorylimit" => {
            DirectiveKind::Config(C::RequestBodyInMemoryLimit(number(args, "SecRequestBodyInMemoryLimit")?))
        }
        "secrequestbodylimitaction" => {
            DirectiveKind::Config(C::RequestBodyLimitAction(limit_action(args, "SecRequestBodyLimitAction")?))
        }
        "secresponsebodyaccess" => DirectiveKind::Config(C::ResponseBodyAccess(on_off(args, "SecResponseBodyAccess")?)),
        "secresponsebodylimit" => DirectiveKind::Config(C::ResponseBodyLimit(number(args, "SecResponseBodyLimit")?)),
        "secresponsebodylimitaction" => {
            DirectiveKind::Config(C::ResponseBodyLimitAction(limit_action(args, "SecResponseBodyLimitAction")?))
        }
        "secresponsebodymimetype" => {
            let types: Vec<String> = args
                .iter()
                .flat_map(|t| t.text.split_whitespace())
                .map(|s| s.to_ascii_lowercase())
                .collect();
            if types.is_empty() {
                return Err(Error::invalid_directive("SecResponseBodyMimeType", "missing argument"));
            }
            DirectiveKind::Config(C::ResponseBodyMimeType(types))
        }
        "secresponsebodymimetypesclear" => DirectiveKind::Config(C::ResponseBodyMimeTypesClear),

        "secauditengine" => {
            let value = single(args, "SecAuditEngine")?;
            DirectiveKind::Config(C::AuditEngine(AuditEngineMode::from_name(value).ok_or_else(|| {
                Error::invalid_directive("SecAuditEngine", format!("invalid mode '{}'", value))
            })?))
        }
        "secauditlog" => DirectiveKind::Config(C::AuditLog(resolve(base, single(args, "SecAuditLog")?))),
        "secauditlogparts" => DirectiveKind::Config(C::AuditLogParts(AuditLogParts::parse(single(
            args,
            "SecAuditLogParts",
        )?)?)),
        "secauditlogrelevantstatus" => {
            let pattern = single(args, "SecAuditLogRelevantStatus")?;
            let regex = regex::Regex::new(pattern).map_err(|e| Error::RegexCompile {
                pattern: pattern.to_string(),
                source: e,
            })?;
            DirectiveKind::Config(C::AuditLogRelevantStatus(regex))
        }
        "secauditlogformat" => {
            let value = single(args, "SecAuditLogFormat")?;
            DirectiveKind::Config(C::AuditLogFormat(AuditLogFormat::from_name(value).ok_or_else(|| {
                Error::invalid_directive("SecAuditLogFormat", format!("invalid format '{}'", value))
            })?))
        }
        "secauditlogtype" => {
            let value = single(args, "SecAuditLogType")?;
            if !value.eq_ignore_ascii_case("serial") {
                return Err(Error::invalid_directive(
                    "SecAuditLogType",
                    format!("unsupported log type '{}' (only Serial)", value),
                ));
            }
            return Ok(None);
        }

        "secdebuglog" => DirectiveKind::Config(C::DebugLog(resolve(base, single(args, "SecDebugLog")?))),
        "secdebugloglevel" => {
            let level: u8 = number(args, "SecDebugLogLevel")?;
            if level > 9 {
                return Err(Error::invalid_directive("SecDebugLogLevel", "level must be 0-9"));
            }
            DirectiveKind::Config(C::DebugLogLevel(level))
        }
        "sectmpdir" => DirectiveKind::Config(C::TmpDir(resolve(base, single(args, "SecTmpDir")?))),
        "secuploaddir" => DirectiveKind::Config(C::UploadDir(resolve(base, single(args, "SecUploadDir")?))),
        "secdatadir" => DirectiveKind::Config(C::DataDir(resolve(base, single(args, "SecDataDir")?))),
        "secgeolookupdb" => DirectiveKind::Config(C::GeoLookupDb(resolve(base, single(args, "SecGeoLookupDb")?))),
        "secsensorid" => DirectiveKind::Config(C::SensorId(single(args, "SecSensorId")?.to_string())),
        "seccomponentsignature" => {
            DirectiveKind::Config(C::ComponentSignature(single(args, "SecComponentSignature")?.to_string()))
        }
        "secwebappid" => DirectiveKind::Config(C::WebAppId(single(args, "SecWebAppId")?.to_string())),
        "secargumentseparator" => {
            let value = single(args, "SecArgumentSeparator")?;
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => DirectiveKind::Config(C::ArgumentSeparator(c)),
                _ => {
                    return Err(Error::invalid_directive(
                        "SecArgumentSeparator",
                        "expected a single character",
                    ))
                }
            }
        }
        "secpcrematchlimit" => DirectiveKind::Config(C::PcreMatchLimit(number(args, "SecPcreMatchLimit")?)),
        "secpcrematchlimitrecursion" => {
            DirectiveKind::Config(C::PcreMatchLimitRecursion(number(args, "SecPcreMatchLimitRecursion")?))
        }
        "seccollectiontimeout" => DirectiveKind::Config(C::CollectionTimeout(number(args, "SecCollectionTimeout")?)),

        _ => {
            return Err(Error::UnknownDirective {
                name: name.to_string(),
            })
        }
    };
    Ok(Some(kind))
}

fn parse_secrule(args: &[Token], base: &Path) -> Result<SecRule> {
    let (variables, operator, actions) = match args {
        [v, o] => (v, o, None),
        [v, o, a] => (v, o, Some(a)),
        _ => {
            return Err(Error::invalid_directive(
                "SecRule",
                "expected VARIABLES OPERATOR [ACTIONS]",
            ))
        }
    };

    let variables = parse_variables(&variables.text)?;
    let operator = parse_operator(&operator.text)?;
    let compiled = compile_operator(&operator, base)?;
    let actions = match actions {
        Some(a) => parse_actions(&a.text)?,
        None => Vec::new(),
    };

    Ok(SecRule {
        variables,
        operator,
        compiled,
        actions,
    })
}

fn update_target_args<'t>(args: &'t [Token], directive: &str) -> Result<(&'t str, VariableList)> {
    match args {
        [first, targets] => Ok((first.text.as_str(), parse_variable_list(&targets.text)?)),
        [_, _, _] => Err(Error::invalid_directive(directive, "target replacement is not supported")),
        _ => Err(Error::invalid_directive(directive, "expected a selector and a target list")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableName;
    use std::io::Write;

    fn parse(input: &str) -> Result<Vec<Directive>> {
        let mut parser = Parser::new();
        parser.parse(input)?;
        Ok(parser.into_directives())
    }

    #[test]
    fn test_parse_simple_rule() {
        let directives =
            parse(r#"SecRule REQUEST_URI "@contains /admin" "id:1,deny,status:403""#).unwrap();

        assert_eq!(directives.len(), 1);
        match &directives[0].kind {
            DirectiveKind::Rule(rule) => {
                assert_eq!(rule.variables.len(), 1);
                assert_eq!(rule.variables[0].name, VariableName::RequestUri);
                assert_eq!(rule.operator.name, OperatorName::Contains);
                assert_eq!(rule.actions.len(), 3);
            }
            other => panic!("expected SecRule, got {other:?}"),
        }
        assert_eq!(directives[0].location.line, 1);
        assert!(!directives[0].included);
    }

    #[test]
    fn test_parse_secruleengine() {
        let directives = parse("SecRuleEngine DetectionOnly").unwrap();
        assert!(matches!(
            directives[0].kind,
            DirectiveKind::Config(ConfigDirective::RuleEngine(EngineMode::DetectionOnly))
        ));
        assert!(parse("SecRuleEngine Maybe").is_err());
    }

    #[test]
    fn test_continuation_and_comments() {
        let directives = parse(
            "# leading comment\n\
             SecRule ARGS \"@rx evil\" \\\n    \"id:10,\\\n    deny\"\n\
             \n\
             SecMarker END",
        )
        .unwrap();
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].location.line, 2);
        assert!(matches!(&directives[1].kind, DirectiveKind::Marker(m) if m == "END"));
    }

    #[test]
    fn test_unknown_directive_is_error() {
        let err = parse("SecRuleEngine On\nSecFrobnicate On").unwrap_err();
        match err {
            Error::Parse { location, message, .. } => {
                assert_eq!(location, "line 2");
                assert!(message.contains("SecFrobnicate"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unknown_operator_and_action() {
        assert!(parse(r#"SecRule ARGS "@frobnicate x" "id:1""#).is_err());
        assert!(parse(r#"SecRule ARGS "@rx x" "id:1,frobnicate""#).is_err());
        assert!(parse(r#"SecRule ARGS "@rx (" "id:1""#).is_err());
    }

    #[test]
    fn test_default_action_requires_phase() {
        assert!(parse(r#"SecDefaultAction "phase:2,log,deny""#).is_ok());
        assert!(parse(r#"SecDefaultAction "log,deny""#).is_err());
    }

    #[test]
    fn test_config_directives() {
        let directives = parse(
            "SecRequestBodyAccess On\n\
             SecRequestBodyLimit 1000\n\
             SecResponseBodyMimeType text/plain application/json\n\
             SecAuditLogParts ABK\n\
             SecAuditLogType Serial\n\
             SecArgumentSeparator ;\n\
             SecWebAppId shop",
        )
        .unwrap();
        // SecAuditLogType produces nothing.
        assert_eq!(directives.len(), 6);
        assert!(matches!(
            directives[0].kind,
            DirectiveKind::Config(ConfigDirective::RequestBodyAccess(true))
        ));
        assert!(matches!(
            directives[1].kind,
            DirectiveKind::Config(ConfigDirective::RequestBodyLimit(1000))
        ));
        match &directives[2].kind {
            DirectiveKind::Config(ConfigDirective::ResponseBodyMimeType(types)) => {
                assert_eq!(types, &["text/plain", "application/json"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            directives[4].kind,
            DirectiveKind::Config(ConfigDirective::ArgumentSeparator(';'))
        ));

        assert!(parse("SecAuditLogType Concurrent").is_err());
        assert!(parse("SecRequestBodyLimit lots").is_err());
        assert!(parse("SecArgumentSeparator ab").is_err());
        assert!(parse("SecAuditLogRelevantStatus \"^(?:5|4(?!04))\"").is_err());
    }

    #[test]
    fn test_remove_and_update_directives() {
        let directives = parse(
            "SecRuleRemoveById 1 5-7 9\n\
             SecRuleRemoveByTag attack-sqli\n\
             SecRuleUpdateActionById 10 \"deny,status:404\"\n\
             SecRuleUpdateTargetById 10 \"!ARGS:password\"",
        )
        .unwrap();
        match &directives[0].kind {
            DirectiveKind::RemoveById(ranges) => {
                assert_eq!(ranges.len(), 3);
                assert!(ranges[1].contains(6));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &directives[3].kind {
            DirectiveKind::UpdateTargetById { targets, .. } => {
                assert_eq!(targets.exclusions.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_include_relative_and_glob() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("rules");
        std::fs::create_dir(&sub).unwrap();
        let mut a = std::fs::File::create(sub.join("a.conf")).unwrap();
        writeln!(a, r#"SecRule ARGS "@rx a" "id:1""#).unwrap();
        let mut b = std::fs::File::create(sub.join("b.conf")).unwrap();
        writeln!(b, r#"SecRule ARGS "@rx b" "id:2""#).unwrap();
        let main = dir.path().join("main.conf");
        std::fs::write(&main, "Include rules/*.conf\nSecMarker DONE\n").unwrap();

        let mut parser = Parser::new();
        parser.parse_file(&main).unwrap();
        let directives = parser.into_directives();
        assert_eq!(directives.len(), 3);
        assert!(directives[0].included);
        assert!(directives[1].included);
        assert!(!directives[2].included);
        assert!(directives[1]
            .location
            .file
            .as_ref()
            .unwrap()
            .ends_with("b.conf"));
    }

    #[test]
    fn test_include_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = format!("Include {}", dir.path().join("missing.conf").display());
        assert!(parse(&missing).is_err());
        let no_match = format!("Include {}", dir.path().join("*.none").display());
        assert!(parse(&no_match).is_err());

        let looped = dir.path().join("loop.conf");
        std::fs::write(&looped, "Include loop.conf\n").unwrap();
        let mut parser = Parser::new();
        assert!(parser.parse_file(&looped).is_err());
    }

    #[test]
    fn test_error_location_in_included_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.conf"), "\n\nSecBogus 1\n").unwrap();
        let main = dir.path().join("main.conf");
        std::fs::write(&main, "Include bad.conf\n").unwrap();

        let mut parser = Parser::new();
        match parser.parse_file(&main).unwrap_err() {
            Error::Parse { location, .. } => assert!(location.ends_with("bad.conf:3")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
